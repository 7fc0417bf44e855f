//! File-parsing collaborators: everything that turns bytes on disk into `RawRow`s.
//!
//! - **Format detection**: `.json` files are read as an array of objects,
//!   everything else (including `-` for stdin) as delimited text.
//! - **Delimiter resolution**: `.tsv` selects tab, anything else comma, unless
//!   overridden.
//! - **Encoding**: CSV input is decoded with `encoding_rs`, defaulting to UTF-8.
//! - **Cell typing**: CSV cells are typed dynamically; plain numbers become
//!   numbers, `true`/`false` become booleans, empty cells become empty values
//!   and everything else stays text. Currency and percent strings are left as
//!   text for the numeric normalizer.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::data::{RawRow, Value};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(InputFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls") => {
                Err(anyhow!(
                    "Spreadsheet input {path:?} is not supported; export it to CSV first"
                ))
            }
            _ => Ok(InputFormat::Csv),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_dash(path) {
        Ok(Box::new(std::io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        )))
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    let mut decoded = decode_record(&headers, encoding)?;
    if let Some(first) = decoded.first_mut() {
        // Spreadsheet exports often prefix a byte-order mark.
        *first = first.trim_start_matches('\u{feff}').to_string();
    }
    Ok(decoded)
}

/// Numbers at or beyond 2^53 stay text so long identifiers keep every digit.
const MAX_EXACT_NUMBER: f64 = 9_007_199_254_740_992.0;

/// Types one CSV cell the way a dynamically-typing CSV parser would.
pub fn parse_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Empty;
    }
    let trimmed = raw.trim();
    match trimmed {
        "true" | "TRUE" | "True" => return Value::Bool(true),
        "false" | "FALSE" | "False" => return Value::Bool(false),
        _ => {}
    }
    if is_plain_number(trimmed)
        && let Ok(number) = trimmed.parse::<f64>()
        && number.abs() < MAX_EXACT_NUMBER
    {
        return Value::Number(number);
    }
    Value::Text(raw.to_string())
}

/// `-?(digits[.digits] | .digits)([eE][+-]?digits)?`
fn is_plain_number(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };
    let mut parts = mantissa.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    let mantissa_ok = all_digits(int_part)
        && frac_part.is_none_or(all_digits)
        && (!int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty()));
    let exponent_ok = exponent.is_none_or(|exp| {
        let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        !digits.is_empty() && all_digits(digits)
    });
    mantissa_ok && exponent_ok
}

pub fn read_csv_rows(path: &Path, options: &LoadOptions) -> Result<Vec<RawRow>> {
    let delimiter = resolve_input_delimiter(path, options.delimiter);
    let encoding = resolve_encoding(options.encoding.as_deref())?;
    let mut reader = open_csv_reader(open_input(path)?, delimiter);
    let headers = reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;
    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        let fields = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", idx + 2))?;
        if fields.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let value = fields.get(col).map(|f| parse_cell(f)).unwrap_or_default();
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    debug!("Read {} row(s) across {} column(s)", rows.len(), headers.len());
    Ok(rows)
}

pub fn read_json_rows(path: &Path) -> Result<Vec<RawRow>> {
    let reader = open_input(path)?;
    serde_json::from_reader(reader)
        .with_context(|| format!("Parsing {path:?} as a JSON array of flat objects"))
}

/// Loads raw rows from CSV/TSV or JSON, chosen by extension.
pub fn load_rows(path: &Path, options: &LoadOptions) -> Result<Vec<RawRow>> {
    let rows = match InputFormat::detect(path)? {
        InputFormat::Csv => read_csv_rows(path, options)?,
        InputFormat::Json => read_json_rows(path)?,
    };
    info!("Loaded {} row(s) from {path:?}", rows.len());
    Ok(rows)
}

/// Dataset name shown in reports: the file stem, or `stdin`.
pub fn dataset_name(path: &Path) -> String {
    if is_dash(path) {
        return "stdin".to_string();
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

/// Writes records as CSV using the first record's keys as the header.
pub fn write_records(path: Option<&Path>, delimiter: u8, records: &[RawRow]) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter)?;
    let Some(first) = records.first() else {
        writer.flush().context("Flushing CSV output")?;
        return Ok(());
    };
    let headers: Vec<&str> = first.keys().collect();
    writer
        .write_record(&headers)
        .context("Writing CSV header")?;
    for record in records {
        writer
            .write_record(headers.iter().map(|h| record.value(h).as_display()))
            .context("Writing CSV row")?;
    }
    writer.flush().context("Flushing CSV output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cell_types_plain_numbers_only() {
        assert_eq!(parse_cell("200"), Value::Number(200.0));
        assert_eq!(parse_cell("-0.45"), Value::Number(-0.45));
        assert_eq!(parse_cell(".5"), Value::Number(0.5));
        assert_eq!(parse_cell("1e3"), Value::Number(1000.0));
        assert_eq!(parse_cell("₺85.00"), Value::text("₺85.00"));
        assert_eq!(parse_cell("35%"), Value::text("35%"));
        assert_eq!(parse_cell("inf"), Value::text("inf"));
        assert_eq!(parse_cell("1.2.3"), Value::text("1.2.3"));
        assert_eq!(parse_cell("2023-01-05"), Value::text("2023-01-05"));
        assert_eq!(parse_cell(""), Value::Empty);
        assert_eq!(parse_cell("TRUE"), Value::Bool(true));
    }

    #[test]
    fn parse_cell_keeps_long_identifiers_as_text() {
        assert_eq!(
            parse_cell("1234567890123456789"),
            Value::text("1234567890123456789")
        );
        assert_eq!(
            parse_cell("9007199254740992"),
            Value::text("9007199254740992")
        );
        assert_eq!(
            parse_cell("9007199254740991"),
            Value::Number(9_007_199_254_740_991.0)
        );
        assert_eq!(parse_cell("-1e300"), Value::text("-1e300"));
    }

    #[test]
    fn xlsx_is_rejected_with_guidance() {
        let err = InputFormat::detect(Path::new("book.xlsx")).unwrap_err();
        assert!(err.to_string().contains("export it to CSV"));
        assert_eq!(
            InputFormat::detect(Path::new("rows.JSON")).unwrap(),
            InputFormat::Json
        );
    }

    #[test]
    fn dataset_name_uses_file_stem() {
        assert_eq!(dataset_name(Path::new("data/urban_sales.csv")), "urban_sales");
        assert_eq!(dataset_name(Path::new("-")), "stdin");
    }
}

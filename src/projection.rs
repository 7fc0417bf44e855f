//! Raw row to canonical row projection.
//!
//! A [`Projector`] is built once per (mapping, calculated fields) pair and
//! applied to every raw row. Projection is pure: the same inputs always give
//! the same [`CanonicalRow`], unless the opt-in random transaction-id fallback
//! is selected.

use chrono::Datelike;
use log::warn;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::{
    data::{RawRow, Value, resolve_date},
    expr::{CalculatedField, Expression},
    numeric::normalize_numeric,
    schema::SchemaMapping,
};

pub const MONTH_ORDER: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub const WEEKDAY_ORDER: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub const INVALID_LABEL: &str = "invalid";
pub const DEFAULT_CITY: &str = "Other";
pub const DEFAULT_BRANCH: &str = "General";
pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const UNKNOWN_PRODUCT: &str = "UNK_PROD";

static EMPTY: Value = Value::Empty;

const PRODUCT_ID_COLUMNS: [&str; 3] = ["PRODUCT ID", "Product", "UrunID"];

/// Month names, abbreviations, numbers and Turkish names keyed to a 1-based month.
const MONTH_LOOKUP: &[(&str, u32)] = &[
    ("jan", 1),
    ("january", 1),
    ("01", 1),
    ("1", 1),
    ("ocak", 1),
    ("feb", 2),
    ("february", 2),
    ("02", 2),
    ("2", 2),
    ("şubat", 2),
    ("subat", 2),
    ("mar", 3),
    ("march", 3),
    ("03", 3),
    ("3", 3),
    ("mart", 3),
    ("apr", 4),
    ("april", 4),
    ("04", 4),
    ("4", 4),
    ("nisan", 4),
    ("may", 5),
    ("05", 5),
    ("5", 5),
    ("mayıs", 5),
    ("mayis", 5),
    ("jun", 6),
    ("june", 6),
    ("06", 6),
    ("6", 6),
    ("haziran", 6),
    ("jul", 7),
    ("july", 7),
    ("07", 7),
    ("7", 7),
    ("temmuz", 7),
    ("aug", 8),
    ("august", 8),
    ("08", 8),
    ("8", 8),
    ("ağustos", 8),
    ("agustos", 8),
    ("sep", 9),
    ("september", 9),
    ("09", 9),
    ("9", 9),
    ("eylül", 9),
    ("eylul", 9),
    ("oct", 10),
    ("october", 10),
    ("10", 10),
    ("ekim", 10),
    ("nov", 11),
    ("november", 11),
    ("11", 11),
    ("kasım", 11),
    ("kasim", 11),
    ("dec", 12),
    ("december", 12),
    ("12", 12),
    ("aralık", 12),
    ("aralik", 12),
];

pub fn month_from_label(label: &str) -> Option<u32> {
    let key = label.trim().to_lowercase();
    MONTH_LOOKUP
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, index)| *index)
}

pub fn month_label(index: Option<u32>) -> &'static str {
    index
        .and_then(|i| MONTH_ORDER.get((i as usize).checked_sub(1)?))
        .copied()
        .unwrap_or(INVALID_LABEL)
}

pub fn weekday_label(index: Option<u32>) -> &'static str {
    index
        .and_then(|i| WEEKDAY_ORDER.get((i as usize).checked_sub(1)?))
        .copied()
        .unwrap_or(INVALID_LABEL)
}

/// How `TX_ID_final` is filled when the mapped transaction column is absent or empty.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TxIdFallback {
    /// `TX_ROW_<ordinal>`, stable across re-projection.
    #[default]
    RowOrdinal,
    /// A fresh random id per projection.
    Random,
}

impl TxIdFallback {
    fn make(&self, ordinal: usize) -> String {
        match self {
            TxIdFallback::RowOrdinal => format!("TX_ROW_{ordinal}"),
            TxIdFallback::Random => format!("TX_{}", Uuid::new_v4().simple()),
        }
    }
}

/// A raw row plus the derived `_final` fields and calculated-field values.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub raw: RawRow,
    pub calculated: Vec<(String, f64)>,
    pub revenue: f64,
    pub profit: f64,
    pub qty_sold: f64,
    pub unit_price: f64,
    pub margin_rate: f64,
    pub product_id: String,
    pub tx_id: String,
    pub year: Option<i32>,
    pub month_index: Option<u32>,
    pub weekday_index: Option<u32>,
    pub city: String,
    pub branch: String,
    pub category: String,
}

impl CanonicalRow {
    pub fn month_label(&self) -> &'static str {
        month_label(self.month_index)
    }

    pub fn weekday_label(&self) -> &'static str {
        weekday_label(self.weekday_index)
    }

    pub fn calculated_value(&self, name: &str) -> Option<f64> {
        self.calculated
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }

    /// Resolves a derived key, calculated field, or raw column by name.
    pub fn value(&self, name: &str) -> Value {
        let optional_number = |n: Option<f64>| n.map(Value::Number).unwrap_or_default();
        match name {
            "REVENUE_final" => Value::Number(self.revenue),
            "PROFIT_final" => Value::Number(self.profit),
            "QTY_SOLD_final" => Value::Number(self.qty_sold),
            "UNIT_PRICE_final" => Value::Number(self.unit_price),
            "MARGIN_RATE_final" => Value::Number(self.margin_rate),
            "PRODUCT_ID_final" => Value::text(&self.product_id),
            "TX_ID_final" => Value::text(&self.tx_id),
            "YEAR_final" => optional_number(self.year.map(f64::from)),
            "MONTH_index" => optional_number(self.month_index.map(f64::from)),
            "MONTH_final" => Value::text(self.month_label()),
            "WEEKDAY_index" => optional_number(self.weekday_index.map(f64::from)),
            "WEEKDAY_final" => Value::text(self.weekday_label()),
            "CITY_final" => Value::text(&self.city),
            "BRANCH_final" => Value::text(&self.branch),
            "CATEGORY_final" => Value::text(&self.category),
            other => match self.calculated_value(other) {
                Some(number) => Value::Number(number),
                None => self.raw.value(other).clone(),
            },
        }
    }

    /// Flattens the row: raw keys first, calculated fields, then the derived keys.
    pub fn to_record(&self) -> RawRow {
        let mut record = self.raw.clone();
        for (name, value) in &self.calculated {
            record.insert(name.clone(), *value);
        }
        for key in DERIVED_KEYS {
            record.insert(key, self.value(key));
        }
        record
    }
}

pub const DERIVED_KEYS: [&str; 15] = [
    "REVENUE_final",
    "PROFIT_final",
    "QTY_SOLD_final",
    "UNIT_PRICE_final",
    "MARGIN_RATE_final",
    "PRODUCT_ID_final",
    "TX_ID_final",
    "YEAR_final",
    "MONTH_index",
    "MONTH_final",
    "WEEKDAY_index",
    "WEEKDAY_final",
    "CITY_final",
    "BRANCH_final",
    "CATEGORY_final",
];

impl Serialize for CanonicalRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_record().serialize(serializer)
    }
}

#[derive(Debug, Clone)]
struct CompiledField {
    name: String,
    expression: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct Projector {
    mapping: SchemaMapping,
    fields: Vec<CompiledField>,
    tx_fallback: TxIdFallback,
}

impl Projector {
    pub fn new(mapping: SchemaMapping) -> Self {
        Self {
            mapping,
            fields: Vec::new(),
            tx_fallback: TxIdFallback::default(),
        }
    }

    pub fn with_calculated_fields(mut self, fields: &[CalculatedField]) -> Self {
        self.fields = fields
            .iter()
            .map(|field| {
                let expression = field.compile();
                if expression.is_none() {
                    warn!(
                        "Calculated field '{}' has an invalid expression '{}'; it will evaluate to 0",
                        field.name, field.expression
                    );
                }
                CompiledField {
                    name: field.name.clone(),
                    expression,
                }
            })
            .collect();
        self
    }

    pub fn with_tx_fallback(mut self, fallback: TxIdFallback) -> Self {
        self.tx_fallback = fallback;
        self
    }

    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    fn mapped<'r>(&self, row: &'r RawRow, column: Option<&String>) -> &'r Value {
        match column {
            Some(name) => row.value(name),
            None => &EMPTY,
        }
    }

    fn mapped_text(&self, row: &RawRow, column: Option<&String>, default: &str) -> String {
        let value = self.mapped(row, column);
        if value.is_missing() {
            default.to_string()
        } else {
            value.as_display()
        }
    }

    /// Projects one row; `ordinal` is its 1-based position, used by the stable tx-id fallback.
    pub fn project(&self, row: &RawRow, ordinal: usize) -> CanonicalRow {
        let map = &self.mapping;
        let calculated = self
            .fields
            .iter()
            .map(|field| {
                let value = field
                    .expression
                    .as_ref()
                    .map(|expr| expr.eval_or_zero(row))
                    .unwrap_or(0.0);
                (field.name.clone(), value)
            })
            .collect();

        let price = normalize_numeric(self.mapped(row, map.price.as_ref()));
        let qty = normalize_numeric(self.mapped(row, map.qty.as_ref()));
        let margin = normalize_numeric(self.mapped(row, map.margin.as_ref()));
        let margin_rate = if margin > 1.0 { margin / 100.0 } else { margin };
        // Profit falls back to price * qty * margin even when revenue is mapped.
        let computed_revenue = price * qty;
        let revenue = match &map.revenue {
            Some(column) => normalize_numeric(row.value(column)),
            None => computed_revenue,
        };
        let profit = match &map.profit {
            Some(column) => normalize_numeric(row.value(column)),
            None => computed_revenue * margin_rate,
        };

        let product_id = PRODUCT_ID_COLUMNS
            .iter()
            .map(|column| row.value(column))
            .find(|value| !value.is_missing())
            .map(Value::as_display)
            .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());
        let tx_value = self.mapped(row, map.tx_id.as_ref());
        let tx_id = if tx_value.is_missing() {
            self.tx_fallback.make(ordinal)
        } else {
            tx_value.as_display()
        };

        let (year, month_index, weekday_index) =
            match map.date.as_ref().and_then(|column| resolve_date(row.value(column))) {
                Some(date) => (
                    Some(date.year()),
                    Some(date.month()),
                    Some(date.weekday().number_from_monday()),
                ),
                None => {
                    let year = leading_integer(self.mapped(row, map.year.as_ref()));
                    let month_value = self.mapped(row, map.month.as_ref());
                    let month = if month_value.is_missing() {
                        None
                    } else {
                        month_from_label(&month_value.as_display())
                    };
                    (year, month, None)
                }
            };

        CanonicalRow {
            raw: row.clone(),
            calculated,
            revenue,
            profit,
            qty_sold: qty,
            unit_price: price,
            margin_rate,
            product_id,
            tx_id,
            year,
            month_index,
            weekday_index,
            city: self.mapped_text(row, map.city.as_ref(), DEFAULT_CITY),
            branch: self.mapped_text(row, map.branch.as_ref(), DEFAULT_BRANCH),
            category: self.mapped_text(row, map.category.as_ref(), DEFAULT_CATEGORY),
        }
    }

    pub fn project_all(&self, rows: &[RawRow]) -> Vec<CanonicalRow> {
        rows.iter()
            .enumerate()
            .map(|(idx, row)| self.project(row, idx + 1))
            .collect()
    }
}

/// Convenience wrapper: projects every row with the default fallback policy.
pub fn project_rows(
    rows: &[RawRow],
    mapping: &SchemaMapping,
    fields: &[CalculatedField],
) -> Vec<CanonicalRow> {
    Projector::new(mapping.clone())
        .with_calculated_fields(fields)
        .project_all(rows)
}

/// Integer prefix of a year cell: numbers truncate, text reads leading digits.
fn leading_integer(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) if n.is_finite() => Some(n.trunc() as i32),
        Value::Text(s) => {
            let trimmed = s.trim_start();
            let (sign, digits) = match trimmed.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i32>().ok().map(|n| n * sign)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_lookup_accepts_english_numeric_and_turkish() {
        assert_eq!(month_from_label("Ocak"), Some(1));
        assert_eq!(month_from_label(" 09 "), Some(9));
        assert_eq!(month_from_label("AĞUSTOS"), Some(8));
        assert_eq!(month_from_label("December"), Some(12));
        assert_eq!(month_from_label("13"), None);
    }

    #[test]
    fn labels_fall_back_to_invalid() {
        assert_eq!(month_label(Some(3)), "March");
        assert_eq!(month_label(None), INVALID_LABEL);
        assert_eq!(month_label(Some(0)), INVALID_LABEL);
        assert_eq!(weekday_label(Some(7)), "Sunday");
        assert_eq!(weekday_label(Some(8)), INVALID_LABEL);
    }

    #[test]
    fn leading_integer_reads_prefixes() {
        assert_eq!(leading_integer(&Value::text("2023 FY")), Some(2023));
        assert_eq!(leading_integer(&Value::Number(2024.9)), Some(2024));
        assert_eq!(leading_integer(&Value::text("FY2023")), None);
        assert_eq!(leading_integer(&Value::Empty), None);
    }

    #[test]
    fn tx_fallback_is_stable_by_default() {
        let projector = Projector::new(SchemaMapping::default());
        let row = RawRow::new();
        assert_eq!(projector.project(&row, 4).tx_id, "TX_ROW_4");
        assert_eq!(projector.project(&row, 4), projector.project(&row, 4));
    }
}

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};

/// Numbers at or above this value are read as spreadsheet serial dates.
pub const SERIAL_DATE_THRESHOLD: f64 = 10_000.0;

/// A single scalar cell as produced by the file-parsing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

static EMPTY_VALUE: Value = Value::Empty;

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Null or the empty string. Whitespace-only text is not missing.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Key used for distinct counting; numbers and text never collide.
    pub(crate) fn distinct_key(&self) -> String {
        match self {
            Value::Empty => "e:".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Number(n) => format!("n:{}", format_number(*n)),
            Value::Text(s) => format!("t:{s}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// An open, insertion-ordered mapping from column name to scalar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: Vec<(String, Value)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Looks up a column, treating absent columns as [`Value::Empty`].
    pub fn value(&self, column: &str) -> &Value {
        self.get(column).unwrap_or(&EMPTY_VALUE)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Replaces an existing column in place or appends a new one.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K, V> FromIterator<(K, V)> for RawRow
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (key, value) in iter {
            row.insert(key, value);
        }
        row
    }
}

impl Serialize for RawRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawRow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawRowVisitor;

        impl<'de> Visitor<'de> for RawRowVisitor {
            type Value = RawRow;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of column names to scalar values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<RawRow, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut row = RawRow::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    row.insert(key, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RawRowVisitor)
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y.%m.%d"];
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
    ];
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed.date());
        }
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

/// Days since 1899-12-30 (UTC); fractional days are truncated.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

/// Resolves a cell to a calendar date: large numbers are serials, text is parsed.
pub fn resolve_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) if *n >= SERIAL_DATE_THRESHOLD => serial_to_date(*n),
        Value::Text(s) => parse_naive_date(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_row_preserves_insertion_order() {
        let row: RawRow = [("b", Value::from(1.0)), ("a", Value::from("x"))]
            .into_iter()
            .collect();
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(row.value("missing"), &Value::Empty);
    }

    #[test]
    fn raw_row_round_trips_through_json() {
        let json = r#"{"DATE":"2023-01-05","QTY":200,"NOTE":null,"FLAG":true}"#;
        let row: RawRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.value("QTY"), &Value::Number(200.0));
        assert_eq!(row.value("NOTE"), &Value::Empty);
        assert_eq!(row.value("FLAG"), &Value::Bool(true));
        let encoded = serde_json::to_string(&row).unwrap();
        let decoded: RawRow = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, row);
        assert_eq!(decoded.keys().collect::<Vec<_>>(), vec!["DATE", "QTY", "NOTE", "FLAG"]);
    }

    #[test]
    fn display_formats_integral_numbers_without_fraction() {
        assert_eq!(Value::Number(200.0).as_display(), "200");
        assert_eq!(Value::Number(0.35).as_display(), "0.35");
    }

    #[test]
    fn serial_dates_use_the_1899_epoch() {
        let date = serial_to_date(44931.0).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 1, 5).unwrap());
        assert_eq!(serial_to_date(44931.75), Some(date));
        assert_eq!(resolve_date(&Value::Number(9999.0)), None);
    }

    #[test]
    fn parse_naive_date_supports_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
        assert_eq!(parse_naive_date("2023-03-20"), Some(expected));
        assert_eq!(parse_naive_date("03/20/2023"), Some(expected));
        assert_eq!(parse_naive_date("20.03.2023"), Some(expected));
        assert_eq!(parse_naive_date("2023-03-20T10:15:00Z"), Some(expected));
        assert_eq!(parse_naive_date("Coffee"), None);
    }
}

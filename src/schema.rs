//! Column profiling and heuristic schema mapping.
//!
//! [`profile_dataset`] derives a [`ColumnProfile`] per column (type, missing
//! rate, cardinality, samples). [`infer_mapping`] then guesses which raw column
//! plays each [`SemanticRole`] by scanning the profiles in column order and
//! taking the first whose lowercased name contains one of the role's keywords
//! (English and Turkish synonyms), optionally restricted to a column type.
//!
//! The mapping is a best-effort guess. False positives and misses are
//! expected; the mapping is meant to be corrected by the user and persisted as
//! dashboard configuration.

use std::{collections::HashSet, fmt};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::{RawRow, SERIAL_DATE_THRESHOLD, Value, parse_naive_date};

const SAMPLE_VALUE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    String,
    Date,
    Boolean,
    Unknown,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::String => "string",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub missing_rate: f64,
    pub unique_count: usize,
    pub sample_values: Vec<Value>,
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    seen: usize,
    possible_boolean: bool,
    possible_date: bool,
    possible_numeric: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            seen: 0,
            possible_boolean: true,
            possible_date: true,
            possible_numeric: true,
        }
    }

    fn update(&mut self, value: &Value) {
        if value.is_missing() {
            return;
        }
        self.seen += 1;
        match value {
            Value::Bool(_) => {
                self.possible_date = false;
                self.possible_numeric = false;
            }
            Value::Number(n) => {
                self.possible_boolean = false;
                // Small bare integers are far more likely IDs or counts than dates.
                if *n < SERIAL_DATE_THRESHOLD {
                    self.possible_date = false;
                }
            }
            Value::Text(s) => {
                if self.possible_boolean
                    && !matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "false")
                {
                    self.possible_boolean = false;
                }
                if self.possible_date && parse_naive_date(s).is_none() {
                    self.possible_date = false;
                }
                if self.possible_numeric && !looks_numeric(s) {
                    self.possible_numeric = false;
                }
            }
            Value::Empty => {}
        }
    }

    fn decide(&self) -> ColumnType {
        if self.seen == 0 {
            ColumnType::Unknown
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_numeric {
            ColumnType::Numeric
        } else {
            ColumnType::String
        }
    }
}

/// Numeric after dropping everything but digits, `.` and `-`; needs at least one digit.
fn looks_numeric(value: &str) -> bool {
    let stripped: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    stripped.chars().any(|c| c.is_ascii_digit()) && stripped.parse::<f64>().is_ok()
}

pub fn detect_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut candidate = TypeCandidate::new();
    for value in values {
        candidate.update(value);
    }
    candidate.decide()
}

/// Profiles every column named by the first row's keys.
pub fn profile_dataset(rows: &[RawRow]) -> Vec<ColumnProfile> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    first
        .keys()
        .map(|name| {
            let values: Vec<&Value> = rows.iter().map(|row| row.value(name)).collect();
            let missing = values.iter().filter(|v| v.is_missing()).count();
            let unique = values
                .iter()
                .map(|v| v.distinct_key())
                .collect::<HashSet<_>>()
                .len();
            ColumnProfile {
                name: name.to_string(),
                column_type: detect_type(values.iter().copied()),
                missing_rate: missing as f64 / rows.len() as f64,
                unique_count: unique,
                sample_values: values
                    .iter()
                    .take(SAMPLE_VALUE_COUNT)
                    .map(|v| (*v).clone())
                    .collect(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticRole {
    TxId,
    Date,
    Year,
    Month,
    Weekday,
    City,
    Branch,
    Category,
    Price,
    Qty,
    Margin,
    Revenue,
    Profit,
    Cost,
}

impl SemanticRole {
    pub const ALL: [SemanticRole; 14] = [
        SemanticRole::TxId,
        SemanticRole::Date,
        SemanticRole::Year,
        SemanticRole::Month,
        SemanticRole::Weekday,
        SemanticRole::City,
        SemanticRole::Branch,
        SemanticRole::Category,
        SemanticRole::Price,
        SemanticRole::Qty,
        SemanticRole::Margin,
        SemanticRole::Revenue,
        SemanticRole::Profit,
        SemanticRole::Cost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticRole::TxId => "txId",
            SemanticRole::Date => "date",
            SemanticRole::Year => "year",
            SemanticRole::Month => "month",
            SemanticRole::Weekday => "weekday",
            SemanticRole::City => "city",
            SemanticRole::Branch => "branch",
            SemanticRole::Category => "category",
            SemanticRole::Price => "price",
            SemanticRole::Qty => "qty",
            SemanticRole::Margin => "margin",
            SemanticRole::Revenue => "revenue",
            SemanticRole::Profit => "profit",
            SemanticRole::Cost => "cost",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        SemanticRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(trimmed))
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            SemanticRole::TxId => &[
                "id",
                "transaction",
                "order",
                "işlem",
                "islem",
                "fiş",
                "fis",
                "invoice",
            ],
            SemanticRole::Date => &["date", "tarih", "zaman", "time", "created"],
            SemanticRole::Year => &["year", "yıl", "yil"],
            SemanticRole::Month => &["month", "ay"],
            SemanticRole::Weekday => &["weekday", "gün", "gun"],
            SemanticRole::City => &["city", "şehir", "sehir", "il", "region", "bölge"],
            SemanticRole::Branch => &[
                "branch", "şube", "sube", "mağaza", "magaza", "store", "district",
            ],
            SemanticRole::Category => &["category", "kategori", "tip", "type", "segment", "grup"],
            SemanticRole::Price => &["price", "fiyat", "birim", "rate", "unitprice"],
            SemanticRole::Qty => &["qty", "quantity", "adet", "miktar", "units", "count"],
            SemanticRole::Margin => &["margin", "marj", "oran", "rate", "kar%", "kâr%"],
            SemanticRole::Revenue => &[
                "revenue", "sales", "ciro", "tutar", "amount", "gelir", "toplam",
            ],
            SemanticRole::Profit => &["profit", "kar", "kâr", "kazanç", "net"],
            SemanticRole::Cost => &["cost", "maliyet", "gider"],
        }
    }

    pub fn required_type(&self) -> Option<ColumnType> {
        match self {
            SemanticRole::Date => Some(ColumnType::Date),
            SemanticRole::Price
            | SemanticRole::Qty
            | SemanticRole::Margin
            | SemanticRole::Revenue
            | SemanticRole::Profit
            | SemanticRole::Cost => Some(ColumnType::Numeric),
            _ => None,
        }
    }
}

impl fmt::Display for SemanticRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw column chosen for each semantic role, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaMapping {
    pub tx_id: Option<String>,
    pub date: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub weekday: Option<String>,
    pub city: Option<String>,
    pub branch: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
    pub qty: Option<String>,
    pub margin: Option<String>,
    pub revenue: Option<String>,
    pub profit: Option<String>,
    pub cost: Option<String>,
}

impl SchemaMapping {
    pub fn get(&self, role: SemanticRole) -> Option<&str> {
        self.slot(role).as_deref()
    }

    pub fn set(&mut self, role: SemanticRole, column: Option<String>) {
        *self.slot_mut(role) = column;
    }

    pub fn clear(&mut self, role: SemanticRole) {
        self.set(role, None);
    }

    pub fn is_mapped(&self, role: SemanticRole) -> bool {
        self.get(role).is_some()
    }

    fn slot(&self, role: SemanticRole) -> &Option<String> {
        match role {
            SemanticRole::TxId => &self.tx_id,
            SemanticRole::Date => &self.date,
            SemanticRole::Year => &self.year,
            SemanticRole::Month => &self.month,
            SemanticRole::Weekday => &self.weekday,
            SemanticRole::City => &self.city,
            SemanticRole::Branch => &self.branch,
            SemanticRole::Category => &self.category,
            SemanticRole::Price => &self.price,
            SemanticRole::Qty => &self.qty,
            SemanticRole::Margin => &self.margin,
            SemanticRole::Revenue => &self.revenue,
            SemanticRole::Profit => &self.profit,
            SemanticRole::Cost => &self.cost,
        }
    }

    fn slot_mut(&mut self, role: SemanticRole) -> &mut Option<String> {
        match role {
            SemanticRole::TxId => &mut self.tx_id,
            SemanticRole::Date => &mut self.date,
            SemanticRole::Year => &mut self.year,
            SemanticRole::Month => &mut self.month,
            SemanticRole::Weekday => &mut self.weekday,
            SemanticRole::City => &mut self.city,
            SemanticRole::Branch => &mut self.branch,
            SemanticRole::Category => &mut self.category,
            SemanticRole::Price => &mut self.price,
            SemanticRole::Qty => &mut self.qty,
            SemanticRole::Margin => &mut self.margin,
            SemanticRole::Revenue => &mut self.revenue,
            SemanticRole::Profit => &mut self.profit,
            SemanticRole::Cost => &mut self.cost,
        }
    }

    /// Overlays every role that `overrides` maps onto this mapping.
    pub fn merge(&mut self, overrides: &SchemaMapping) {
        for role in SemanticRole::ALL {
            if let Some(column) = overrides.get(role) {
                self.set(role, Some(column.to_string()));
            }
        }
    }

    pub fn mode(&self) -> DatasetMode {
        let has_revenue = self.is_mapped(SemanticRole::Revenue)
            || (self.is_mapped(SemanticRole::Price) && self.is_mapped(SemanticRole::Qty));
        if self.is_mapped(SemanticRole::Date)
            && self.is_mapped(SemanticRole::Category)
            && has_revenue
        {
            DatasetMode::UrbanSales
        } else {
            DatasetMode::GenericBi
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetMode {
    UrbanSales,
    GenericBi,
}

impl DatasetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetMode::UrbanSales => "URBAN_SALES",
            DatasetMode::GenericBi => "GENERIC_BI",
        }
    }
}

impl fmt::Display for DatasetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn find_column(profiles: &[ColumnProfile], role: SemanticRole) -> Option<String> {
    let keywords = role.keywords();
    let required = role.required_type();
    profiles
        .iter()
        .find(|profile| {
            let lowered = profile.name.to_lowercase();
            keywords.iter().any(|k| lowered.contains(k))
                && required.is_none_or(|ty| profile.column_type == ty)
        })
        .map(|profile| profile.name.clone())
}

pub fn infer_mapping(profiles: &[ColumnProfile]) -> SchemaMapping {
    let mut mapping = SchemaMapping::default();
    for role in SemanticRole::ALL {
        let column = find_column(profiles, role);
        if let Some(name) = &column {
            debug!("Mapped role '{role}' to column '{name}'");
        }
        mapping.set(role, column);
    }
    mapping
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub row_count: usize,
    pub col_count: usize,
    pub missing_values: f64,
}

/// A loaded dataset with its profiles, inferred mapping, and mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub name: String,
    pub rows: Vec<RawRow>,
    pub columns: Vec<String>,
    pub profiles: Vec<ColumnProfile>,
    pub mapping: SchemaMapping,
    pub mode: DatasetMode,
    pub summary: DatasetSummary,
}

impl Dataset {
    pub fn from_rows(name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        let profiles = profile_dataset(&rows);
        let mapping = infer_mapping(&profiles);
        let mode = mapping.mode();
        let columns = rows
            .first()
            .map(|row| row.keys().map(str::to_string).collect())
            .unwrap_or_default();
        let missing_values = profiles
            .iter()
            .map(|p| p.missing_rate * rows.len() as f64)
            .sum();
        let summary = DatasetSummary {
            row_count: rows.len(),
            col_count: profiles.len(),
            missing_values,
        };
        Self {
            name: name.into(),
            rows,
            columns,
            profiles,
            mapping,
            mode,
            summary,
        }
    }

    /// Replaces the inferred mapping (e.g. with a user-edited one) and re-derives the mode.
    pub fn with_mapping(mut self, mapping: SchemaMapping) -> Self {
        self.mode = mapping.mode();
        self.mapping = mapping;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_are_not_dates() {
        let values = [Value::Number(12.0), Value::Number(2023.0)];
        assert_eq!(detect_type(values.iter()), ColumnType::Numeric);
        let serials = [Value::Number(44931.0), Value::Number(44990.0)];
        assert_eq!(detect_type(serials.iter()), ColumnType::Date);
    }

    #[test]
    fn currency_text_is_numeric_but_words_are_not() {
        let values = [Value::text("₺85.00"), Value::text("45")];
        assert_eq!(detect_type(values.iter()), ColumnType::Numeric);
        let words = [Value::text("Coffee"), Value::text("Tea")];
        assert_eq!(detect_type(words.iter()), ColumnType::String);
    }

    #[test]
    fn empty_only_columns_are_unknown() {
        let values = [Value::Empty, Value::text("")];
        assert_eq!(detect_type(values.iter()), ColumnType::Unknown);
    }

    #[test]
    fn booleans_are_detected() {
        let values = [Value::Bool(true), Value::text("false"), Value::Empty];
        assert_eq!(detect_type(values.iter()), ColumnType::Boolean);
    }

    #[test]
    fn mode_requires_date_category_and_revenue_source() {
        let mut mapping = SchemaMapping {
            date: Some("DATE".into()),
            category: Some("CAT".into()),
            price: Some("PRICE".into()),
            ..SchemaMapping::default()
        };
        assert_eq!(mapping.mode(), DatasetMode::GenericBi);
        mapping.qty = Some("QTY".into());
        assert_eq!(mapping.mode(), DatasetMode::UrbanSales);
        mapping.price = None;
        mapping.revenue = Some("SALES".into());
        assert_eq!(mapping.mode(), DatasetMode::UrbanSales);
    }
}

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::projection::{CanonicalRow, MONTH_ORDER, month_from_label};

pub const ALL_SENTINEL: &str = "ALL";

/// Either every value, or an explicit non-empty allow-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T: Ord> {
    All,
    Only(BTreeSet<T>),
}

impl<T: Ord> Default for Selection<T> {
    fn default() -> Self {
        Selection::All
    }
}

impl<T: Ord> Selection<T> {
    pub fn only<I: IntoIterator<Item = T>>(values: I) -> Self {
        let set: BTreeSet<T> = values.into_iter().collect();
        if set.is_empty() {
            Selection::All
        } else {
            Selection::Only(set)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn allows(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(set) => set.contains(value),
        }
    }

    /// Adds or removes `value`; removing the last value reverts to [`Selection::All`].
    pub fn toggle(&mut self, value: T) {
        match self {
            Selection::All => {
                *self = Selection::Only(BTreeSet::from([value]));
            }
            Selection::Only(set) => {
                if !set.remove(&value) {
                    set.insert(value);
                }
                if set.is_empty() {
                    *self = Selection::All;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Selection::All;
    }

    pub fn values(&self) -> Option<&BTreeSet<T>> {
        match self {
            Selection::All => None,
            Selection::Only(set) => Some(set),
        }
    }
}

impl<T: Ord + Serialize> Serialize for Selection<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Selection::All => serializer.serialize_str(ALL_SENTINEL),
            Selection::Only(set) => set.serialize(serializer),
        }
    }
}

impl<'de, T> Deserialize<'de> for Selection<T>
where
    T: Ord + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Sentinel(String),
            Values(Vec<T>),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Sentinel(s) if s == ALL_SENTINEL => Ok(Selection::All),
            Repr::Sentinel(s) => Err(D::Error::custom(format!(
                "expected \"{ALL_SENTINEL}\" or a list of values, found '{s}'"
            ))),
            Repr::Values(values) => Ok(Selection::only(values)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDimension {
    Years,
    Months,
    Cities,
    Branches,
    Categories,
}

impl FilterDimension {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "year" | "years" => Some(FilterDimension::Years),
            "month" | "months" => Some(FilterDimension::Months),
            "city" | "cities" => Some(FilterDimension::Cities),
            "branch" | "branches" => Some(FilterDimension::Branches),
            "category" | "categories" => Some(FilterDimension::Categories),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub years: Selection<i32>,
    pub months: Selection<u32>,
    pub cities: Selection<String>,
    pub branches: Selection<String>,
    pub categories: Selection<String>,
    /// Extra dimensions keyed by raw or calculated column, matched on display text.
    pub generic_filters: BTreeMap<String, Selection<String>>,
}

impl FilterState {
    pub fn is_unfiltered(&self) -> bool {
        self.years.is_all()
            && self.months.is_all()
            && self.cities.is_all()
            && self.branches.is_all()
            && self.categories.is_all()
            && self.generic_filters.values().all(Selection::is_all)
    }

    pub fn clear(&mut self, dimension: FilterDimension) {
        match dimension {
            FilterDimension::Years => self.years.clear(),
            FilterDimension::Months => self.months.clear(),
            FilterDimension::Cities => self.cities.clear(),
            FilterDimension::Branches => self.branches.clear(),
            FilterDimension::Categories => self.categories.clear(),
        }
    }

    pub fn reset(&mut self) {
        *self = FilterState::default();
    }

    /// Toggles a textual value on a built-in dimension, parsing years and months.
    pub fn toggle(&mut self, dimension: FilterDimension, value: &str) -> Result<()> {
        match dimension {
            FilterDimension::Years => self.years.toggle(parse_year(value)?),
            FilterDimension::Months => self.months.toggle(parse_month(value)?),
            FilterDimension::Cities => self.cities.toggle(value.to_string()),
            FilterDimension::Branches => self.branches.toggle(value.to_string()),
            FilterDimension::Categories => self.categories.toggle(value.to_string()),
        }
        Ok(())
    }

    pub fn toggle_generic(&mut self, column: &str, value: &str) {
        let selection = self.generic_filters.entry(column.to_string()).or_default();
        selection.toggle(value.to_string());
        if selection.is_all() {
            self.generic_filters.remove(column);
        }
    }

    pub fn matches(&self, row: &CanonicalRow) -> bool {
        let year = match &self.years {
            Selection::All => true,
            Selection::Only(set) => row.year.is_some_and(|y| set.contains(&y)),
        };
        let month = match &self.months {
            Selection::All => true,
            Selection::Only(set) => row.month_index.is_some_and(|m| set.contains(&m)),
        };
        year && month
            && self.cities.allows(&row.city)
            && self.branches.allows(&row.branch)
            && self.categories.allows(&row.category)
            && self
                .generic_filters
                .iter()
                .all(|(column, selection)| match selection {
                    Selection::All => true,
                    Selection::Only(set) => set.contains(&row.value(column).as_display()),
                })
    }
}

fn parse_year(value: &str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .with_context(|| format!("Invalid year '{value}'"))
}

fn parse_month(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    if let Some(index) = month_from_label(trimmed) {
        return Ok(index);
    }
    MONTH_ORDER
        .iter()
        .position(|name| name.eq_ignore_ascii_case(trimmed))
        .map(|idx| idx as u32 + 1)
        .ok_or_else(|| anyhow!("Invalid month '{value}'"))
}

pub fn apply_filters(rows: &[CanonicalRow], filters: &FilterState) -> Vec<CanonicalRow> {
    if filters.is_unfiltered() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|row| filters.matches(row))
        .cloned()
        .collect()
}

/// Parses `dimension=value[,value...]` arguments into a filter state.
///
/// `year`, `month`, `city`, `branch` and `category` (singular or plural) address
/// the built-in dimensions; any other name becomes a generic column filter.
pub fn parse_filter_args(args: &[String]) -> Result<FilterState> {
    let mut state = FilterState::default();
    for arg in args {
        let trimmed = arg.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("Empty filter expression"));
        }
        let (name, values) = trimmed
            .split_once('=')
            .ok_or_else(|| anyhow!("Failed to parse filter expression '{trimmed}'"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("Filter '{trimmed}' is missing a column name"));
        }
        let values: Vec<&str> = values
            .split(',')
            .map(|v| unquote(v.trim()))
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return Err(anyhow!("Filter '{trimmed}' has no values"));
        }
        match FilterDimension::parse(name) {
            Some(FilterDimension::Years) => {
                state.years = Selection::only(
                    values.iter().map(|v| parse_year(v)).collect::<Result<Vec<_>>>()?,
                );
            }
            Some(FilterDimension::Months) => {
                state.months = Selection::only(
                    values.iter().map(|v| parse_month(v)).collect::<Result<Vec<_>>>()?,
                );
            }
            Some(FilterDimension::Cities) => state.cities = owned_selection(&values),
            Some(FilterDimension::Branches) => state.branches = owned_selection(&values),
            Some(FilterDimension::Categories) => state.categories = owned_selection(&values),
            None => {
                state
                    .generic_filters
                    .insert(name.to_string(), owned_selection(&values));
            }
        }
    }
    Ok(state)
}

fn owned_selection(values: &[&str]) -> Selection<String> {
    Selection::only(values.iter().map(|v| v.to_string()))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub months: Vec<MonthOption>,
    pub cities: Vec<String>,
    pub branches: Vec<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthOption {
    pub id: u32,
    pub name: &'static str,
}

/// Selectable values per dimension; branches are limited to the selected cities.
pub fn filter_options(rows: &[CanonicalRow], filters: &FilterState) -> FilterOptions {
    let years: BTreeSet<i32> = rows.iter().filter_map(|r| r.year).collect();
    let cities: BTreeSet<&str> = rows.iter().map(|r| r.city.as_str()).collect();
    let categories: BTreeSet<&str> = rows.iter().map(|r| r.category.as_str()).collect();
    let branches: BTreeSet<&str> = rows
        .iter()
        .filter(|r| filters.cities.allows(&r.city))
        .map(|r| r.branch.as_str())
        .collect();
    FilterOptions {
        years: years.into_iter().rev().collect(),
        months: MONTH_ORDER
            .iter()
            .enumerate()
            .map(|(idx, name)| MonthOption {
                id: idx as u32 + 1,
                name: *name,
            })
            .collect(),
        cities: cities.into_iter().map(str::to_string).collect(),
        branches: branches.into_iter().map(str::to_string).collect(),
        categories: categories.into_iter().map(str::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_reverts_to_all_when_emptied() {
        let mut selection: Selection<String> = Selection::All;
        selection.toggle("Izmir".into());
        assert_eq!(selection, Selection::only(["Izmir".to_string()]));
        selection.toggle("Ankara".into());
        selection.toggle("Izmir".into());
        assert_eq!(selection, Selection::only(["Ankara".to_string()]));
        selection.toggle("Ankara".into());
        assert!(selection.is_all());
    }

    #[test]
    fn selection_serializes_as_sentinel_or_list() {
        let state = FilterState {
            years: Selection::only([2023]),
            ..FilterState::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["years"], serde_json::json!([2023]));
        assert_eq!(json["cities"], serde_json::json!("ALL"));
        let back: FilterState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
        let empty: Selection<i32> = serde_json::from_str("[]").unwrap();
        assert!(empty.is_all());
        assert!(serde_json::from_str::<Selection<i32>>("\"SOME\"").is_err());
    }

    #[test]
    fn parse_filter_args_handles_builtins_and_generic_columns() {
        let args = vec![
            "year=2023,2024".to_string(),
            "month=Jan, mart".to_string(),
            "city='Izmir'".to_string(),
            "Channel=Online".to_string(),
        ];
        let state = parse_filter_args(&args).unwrap();
        assert_eq!(state.years, Selection::only([2023, 2024]));
        assert_eq!(state.months, Selection::only([1, 3]));
        assert_eq!(state.cities, Selection::only(["Izmir".to_string()]));
        assert_eq!(
            state.generic_filters.get("Channel"),
            Some(&Selection::only(["Online".to_string()]))
        );
        assert!(parse_filter_args(&["year=abc".to_string()]).is_err());
        assert!(parse_filter_args(&["city".to_string()]).is_err());
    }
}

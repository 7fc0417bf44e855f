use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{numeric::normalize_numeric, projection::CanonicalRow};

pub const TOP_CATEGORY_COUNT: usize = 7;
pub const OTHER_LABEL: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupDimension {
    Branch,
    City,
    Category,
    Month,
    Weekday,
    /// Any raw or calculated column, grouped by display text.
    Column(String),
}

impl GroupDimension {
    /// Parses a query-plan dimension; unknown names fall back to category.
    /// `column:<name>` groups by any raw or calculated column.
    pub fn parse_lenient(name: &str) -> Self {
        let trimmed = name.trim();
        if let Some(column) = trimmed.strip_prefix("column:") {
            return GroupDimension::Column(column.trim().to_string());
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "branch" => GroupDimension::Branch,
            "city" => GroupDimension::City,
            "month" => GroupDimension::Month,
            "weekday" => GroupDimension::Weekday,
            _ => GroupDimension::Category,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            GroupDimension::Branch => "BRANCH_final",
            GroupDimension::City => "CITY_final",
            GroupDimension::Category => "CATEGORY_final",
            GroupDimension::Month => "MONTH_final",
            GroupDimension::Weekday => "WEEKDAY_final",
            GroupDimension::Column(name) => name,
        }
    }

    fn label(&self, row: &CanonicalRow) -> String {
        match self {
            GroupDimension::Branch => row.branch.clone(),
            GroupDimension::City => row.city.clone(),
            GroupDimension::Category => row.category.clone(),
            GroupDimension::Month => row.month_label().to_string(),
            GroupDimension::Weekday => row.weekday_label().to_string(),
            GroupDimension::Column(name) => row.value(name).as_display(),
        }
    }

    /// Sort index for calendar dimensions; `None` means "not indexed".
    fn index(&self, row: &CanonicalRow) -> Option<Option<u32>> {
        match self {
            GroupDimension::Month => Some(row.month_index),
            GroupDimension::Weekday => Some(row.weekday_index),
            _ => None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, GroupDimension::Month | GroupDimension::Weekday)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Revenue,
    Profit,
    Units,
    Transactions,
    /// Sum of any raw or calculated column, normalized like a mapped measure.
    Column(String),
}

impl Metric {
    /// Parses a query-plan metric; unknown names fall back to revenue.
    /// `column:<name>` sums any raw or calculated column.
    pub fn parse_lenient(name: &str) -> Self {
        let trimmed = name.trim();
        if let Some(column) = trimmed.strip_prefix("column:") {
            return Metric::Column(column.trim().to_string());
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "profit" => Metric::Profit,
            "units" => Metric::Units,
            "transactions" => Metric::Transactions,
            _ => Metric::Revenue,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Metric::Revenue => "REVENUE_final",
            Metric::Profit => "PROFIT_final",
            Metric::Units => "QTY_SOLD_final",
            Metric::Transactions => "TX_ID_final",
            Metric::Column(name) => name,
        }
    }

    fn amount(&self, row: &CanonicalRow) -> f64 {
        match self {
            Metric::Revenue => row.revenue,
            Metric::Profit => row.profit,
            Metric::Units => row.qty_sold,
            Metric::Transactions => 0.0,
            Metric::Column(name) => normalize_numeric(&row.value(name)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Revenue => "revenue",
            Metric::Profit => "profit",
            Metric::Units => "units",
            Metric::Transactions => "transactions",
            Metric::Column(name) => name,
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatePoint {
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

enum Accumulator<'a> {
    Sum(f64),
    Distinct(HashSet<&'a str>),
}

struct Group<'a> {
    label: String,
    index: Option<u32>,
    acc: Accumulator<'a>,
}

/// Groups rows by `dimension` and reduces `metric`.
///
/// Month and weekday groups sort ascending by calendar index and drop rows
/// without one; every other dimension sorts descending by value, keeping
/// first-seen order among ties.
pub fn group_aggregate(
    rows: &[CanonicalRow],
    dimension: &GroupDimension,
    metric: Metric,
) -> Vec<AggregatePoint> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();
    for row in rows {
        let index = match dimension.index(row) {
            Some(None) => continue,
            Some(Some(idx)) => Some(idx),
            None => None,
        };
        let label = dimension.label(row);
        let slot = *positions.entry(label.clone()).or_insert_with(|| {
            groups.push(Group {
                label,
                index,
                acc: match metric {
                    Metric::Transactions => Accumulator::Distinct(HashSet::new()),
                    _ => Accumulator::Sum(0.0),
                },
            });
            groups.len() - 1
        });
        match &mut groups[slot].acc {
            Accumulator::Sum(total) => *total += metric.amount(row),
            Accumulator::Distinct(ids) => {
                ids.insert(row.tx_id.as_str());
            }
        }
    }

    let mut points: Vec<AggregatePoint> = groups
        .into_iter()
        .map(|group| AggregatePoint {
            label: group.label,
            value: match group.acc {
                Accumulator::Sum(total) => total,
                Accumulator::Distinct(ids) => ids.len() as f64,
            },
            index: group.index,
        })
        .collect();
    if dimension.is_indexed() {
        points.sort_by_key(|p| p.index);
    } else {
        points.sort_by(|a, b| b.value.total_cmp(&a.value));
    }
    points
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiTotals {
    pub revenue: f64,
    pub profit: f64,
    pub units: f64,
    pub transactions: usize,
}

pub fn kpi_totals(rows: &[CanonicalRow]) -> KpiTotals {
    let transactions = rows
        .iter()
        .map(|r| r.tx_id.as_str())
        .collect::<HashSet<_>>()
        .len();
    KpiTotals {
        revenue: rows.iter().map(|r| r.revenue).sum(),
        profit: rows.iter().map(|r| r.profit).sum(),
        units: rows.iter().map(|r| r.qty_sold).sum(),
        transactions,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryShare {
    pub label: String,
    /// Distinct transaction count.
    pub value: usize,
    pub revenue: f64,
    pub profit: f64,
    /// Percentage of all distinct transactions.
    pub share: f64,
}

struct CategoryStats<'a> {
    label: String,
    tx_ids: HashSet<&'a str>,
    revenue: f64,
    profit: f64,
}

fn share_of(count: usize, total: usize) -> f64 {
    if total > 0 {
        count as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Per-category transaction counts with everything past the top seven folded into "Other".
///
/// The "Other" bucket counts the union of the folded categories' transaction
/// ids, so a transaction spanning several of them is counted once.
pub fn category_breakdown(rows: &[CanonicalRow]) -> Vec<CategoryShare> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut stats: Vec<CategoryStats<'_>> = Vec::new();
    let mut global: HashSet<&str> = HashSet::new();
    for row in rows {
        if row.tx_id.is_empty() {
            continue;
        }
        let slot = *positions.entry(row.category.as_str()).or_insert_with(|| {
            stats.push(CategoryStats {
                label: row.category.clone(),
                tx_ids: HashSet::new(),
                revenue: 0.0,
                profit: 0.0,
            });
            stats.len() - 1
        });
        let entry = &mut stats[slot];
        entry.tx_ids.insert(row.tx_id.as_str());
        entry.revenue += row.revenue;
        entry.profit += row.profit;
        global.insert(row.tx_id.as_str());
    }

    let total = global.len();
    stats.sort_by(|a, b| {
        b.tx_ids
            .len()
            .cmp(&a.tx_ids.len())
            .then_with(|| turkish_cmp(&a.label, &b.label))
    });

    let to_share = |s: &CategoryStats<'_>| CategoryShare {
        label: s.label.clone(),
        value: s.tx_ids.len(),
        revenue: s.revenue,
        profit: s.profit,
        share: share_of(s.tx_ids.len(), total),
    };
    if stats.len() <= TOP_CATEGORY_COUNT {
        return stats.iter().map(to_share).collect();
    }

    let (top, rest) = stats.split_at(TOP_CATEGORY_COUNT);
    let mut result: Vec<CategoryShare> = top.iter().map(to_share).collect();
    let mut other_ids: HashSet<&str> = HashSet::new();
    let mut other_revenue = 0.0;
    let mut other_profit = 0.0;
    for s in rest {
        other_ids.extend(s.tx_ids.iter().copied());
        other_revenue += s.revenue;
        other_profit += s.profit;
    }
    result.push(CategoryShare {
        label: OTHER_LABEL.to_string(),
        value: other_ids.len(),
        revenue: other_revenue,
        profit: other_profit,
        share: share_of(other_ids.len(), total),
    });
    result
}

const TURKISH_ALPHABET: &str = "abcçdefgğhıijklmnoöpqrsştuüvwxyz";

fn collation_key(c: char) -> (u32, u8) {
    let lower = match c {
        'I' => 'ı',
        'İ' => 'i',
        _ => c.to_lowercase().next().unwrap_or(c),
    };
    let case = u8::from(lower != c);
    let primary = match TURKISH_ALPHABET.chars().position(|letter| letter == lower) {
        Some(pos) => 0x1_0000 + pos as u32,
        None if lower.is_alphabetic() => 0x2_0000 + lower as u32,
        None => lower as u32,
    };
    (primary, case)
}

/// Orders labels by Turkish alphabet (ç after c, ı before i, ...), then lowercase first.
pub fn turkish_cmp(a: &str, b: &str) -> Ordering {
    let primary = |s: &str| s.chars().map(|c| collation_key(c).0).collect::<Vec<_>>();
    let tertiary = |s: &str| s.chars().map(|c| collation_key(c).1).collect::<Vec<_>>();
    primary(a)
        .cmp(&primary(b))
        .then_with(|| tertiary(a).cmp(&tertiary(b)))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turkish_collation_orders_dotless_and_cedilla_letters() {
        let mut labels = vec!["Zeytin", "Çay", "Irmak", "İçecek", "Cips", "Şeker", "Su"];
        labels.sort_by(|a, b| turkish_cmp(a, b));
        assert_eq!(
            labels,
            vec!["Cips", "Çay", "Irmak", "İçecek", "Su", "Şeker", "Zeytin"]
        );
    }

    #[test]
    fn lenient_parsers_fall_back() {
        assert_eq!(GroupDimension::parse_lenient("store"), GroupDimension::Category);
        assert_eq!(GroupDimension::parse_lenient("Month"), GroupDimension::Month);
        assert_eq!(
            GroupDimension::parse_lenient("column: Channel"),
            GroupDimension::Column("Channel".into())
        );
        assert_eq!(Metric::parse_lenient("margin"), Metric::Revenue);
        assert_eq!(Metric::parse_lenient("units"), Metric::Units);
        assert_eq!(
            Metric::parse_lenient("column:Net"),
            Metric::Column("Net".into())
        );
    }
}

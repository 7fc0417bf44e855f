//! Chart-oriented analytics: price/quantity bubbles, the moving-average
//! profit forecast, and the revenue Pareto curve.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    aggregate::category_breakdown,
    projection::{CanonicalRow, MONTH_ORDER},
};

pub const MIN_BUBBLE_PRODUCTS: usize = 3;
pub const MIN_PRICE_SPREAD: f64 = 0.01;
pub const FORECAST_HORIZON: usize = 6;
pub const FORECAST_WINDOW: usize = 6;
pub const MIN_FORECAST_MONTHS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubblePoint {
    pub label: String,
    pub category: String,
    /// Weighted average unit price.
    pub x: f64,
    /// Total quantity.
    pub y: f64,
    /// Total profit, floored at zero.
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelValue {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BubbleChart {
    Correlation { data: Vec<BubblePoint> },
    /// Too few products or no price spread; carries category transaction counts instead.
    Fallback { data: Vec<LabelValue> },
}

impl BubbleChart {
    pub fn is_fallback(&self) -> bool {
        matches!(self, BubbleChart::Fallback { .. })
    }
}

struct ProductTotals<'a> {
    label: &'a str,
    category: &'a str,
    revenue: f64,
    qty: f64,
    profit: f64,
}

pub fn price_quantity_bubbles(rows: &[CanonicalRow]) -> BubbleChart {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut products: Vec<ProductTotals<'_>> = Vec::new();
    for row in rows {
        let slot = *positions.entry(row.product_id.as_str()).or_insert_with(|| {
            products.push(ProductTotals {
                label: &row.product_id,
                category: &row.category,
                revenue: 0.0,
                qty: 0.0,
                profit: 0.0,
            });
            products.len() - 1
        });
        let totals = &mut products[slot];
        totals.revenue += row.revenue;
        totals.qty += row.qty_sold;
        totals.profit += row.profit;
    }

    let data: Vec<BubblePoint> = products
        .iter()
        .map(|p| BubblePoint {
            label: p.label.to_string(),
            category: p.category.to_string(),
            x: if p.qty > 0.0 { p.revenue / p.qty } else { 0.0 },
            y: p.qty,
            z: p.profit.max(0.0),
        })
        .collect();

    let (min_price, max_price) = data.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), point| (lo.min(point.x), hi.max(point.x)),
    );
    if data.len() < MIN_BUBBLE_PRODUCTS || max_price - min_price < MIN_PRICE_SPREAD {
        let fallback = category_breakdown(rows)
            .into_iter()
            .map(|entry| LabelValue {
                label: entry.label,
                value: entry.value as f64,
            })
            .collect();
        return BubbleChart::Fallback { data: fallback };
    }
    BubbleChart::Correlation { data }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub label: String,
    pub actual: Option<f64>,
    pub forecast: Option<f64>,
}

fn short_month(index: usize) -> String {
    MONTH_ORDER[index].chars().take(3).collect()
}

/// Monthly profit for the latest year, extended six months by a trailing moving average.
///
/// Months without rows are `None`. With fewer than six populated months the
/// actuals are returned alone; otherwise gaps count as zero, each projected
/// value is the mean of the previous six (including earlier projections), and
/// December is repeated as the first forecast value so the two lines meet.
pub fn forecast(rows: &[CanonicalRow]) -> Vec<ForecastPoint> {
    let dated: Vec<(i32, u32, f64)> = rows
        .iter()
        .filter_map(|r| Some((r.year?, r.month_index?, r.profit)))
        .collect();
    let Some(latest) = dated.iter().map(|(year, _, _)| *year).max() else {
        return Vec::new();
    };

    let mut actuals: [Option<f64>; 12] = [None; 12];
    for (year, month, profit) in &dated {
        if *year != latest || !(1..=12).contains(month) {
            continue;
        }
        let slot = &mut actuals[*month as usize - 1];
        *slot = Some(slot.unwrap_or(0.0) + profit);
    }

    let populated = actuals.iter().filter(|v| v.is_some()).count();
    if populated < MIN_FORECAST_MONTHS {
        return actuals
            .iter()
            .enumerate()
            .map(|(idx, actual)| ForecastPoint {
                label: short_month(idx),
                actual: *actual,
                forecast: None,
            })
            .collect();
    }

    let mut series: Vec<f64> = actuals.iter().map(|v| v.unwrap_or(0.0)).collect();
    for _ in 0..FORECAST_HORIZON {
        let window = &series[series.len() - FORECAST_WINDOW..];
        let next = window.iter().sum::<f64>() / FORECAST_WINDOW as f64;
        series.push(next);
    }

    let historical = actuals.iter().enumerate().map(|(idx, actual)| ForecastPoint {
        label: short_month(idx),
        actual: *actual,
        forecast: if idx == 11 { *actual } else { None },
    });
    let projected = series[12..].iter().enumerate().map(|(idx, value)| ForecastPoint {
        label: format!("{}+", short_month(idx)),
        actual: None,
        forecast: Some(*value),
    });
    historical.chain(projected).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParetoPoint {
    pub label: String,
    pub value: f64,
    pub cumulative_percent: f64,
}

/// Category revenue sorted descending with a running share of the total.
pub fn pareto(rows: &[CanonicalRow]) -> Vec<ParetoPoint> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for row in rows {
        let slot = *positions.entry(row.category.as_str()).or_insert_with(|| {
            totals.push((row.category.as_str(), 0.0));
            totals.len() - 1
        });
        totals[slot].1 += row.revenue;
    }
    totals.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total: f64 = totals.iter().map(|(_, value)| value).sum();
    let mut running = 0.0;
    totals
        .into_iter()
        .map(|(label, value)| {
            running += value;
            ParetoPoint {
                label: label.to_string(),
                value,
                cumulative_percent: if total != 0.0 {
                    running / total * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_month_labels() {
        assert_eq!(short_month(0), "Jan");
        assert_eq!(short_month(11), "Dec");
    }

    #[test]
    fn empty_input_yields_empty_series() {
        assert!(forecast(&[]).is_empty());
        assert!(pareto(&[]).is_empty());
        assert!(price_quantity_bubbles(&[]).is_fallback());
    }
}

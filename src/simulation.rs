use std::fmt;

use serde::{Deserialize, Serialize};

use crate::projection::CanonicalRow;

/// Upper bound of a simulated margin rate.
pub const MAX_SCENARIO_MARGIN: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    #[default]
    All,
    Category(String),
}

impl Scope {
    /// `ALL` (any case) selects every row; anything else names a category.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Scope::All
        } else {
            Scope::Category(trimmed.to_string())
        }
    }

    pub fn contains(&self, row: &CanonicalRow) -> bool {
        match self {
            Scope::All => true,
            Scope::Category(category) => row.category == *category,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("ALL"),
            Scope::Category(category) => f.write_str(category),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub revenue: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub base: Totals,
    pub scenario: Totals,
}

impl SimulationResult {
    pub fn revenue_change_pct(&self) -> Option<f64> {
        percent_change(self.base.revenue, self.scenario.revenue)
    }

    pub fn profit_change_pct(&self) -> Option<f64> {
        percent_change(self.base.profit, self.scenario.profit)
    }
}

/// Shifted margin rate clamped to `[0, 0.95]`.
pub fn scenario_margin(margin_rate: f64, margin_delta_pct: f64) -> f64 {
    (margin_rate + margin_delta_pct / 100.0).clamp(0.0, MAX_SCENARIO_MARGIN)
}

/// Relative change in percent; `None` when the base is zero.
pub fn percent_change(base: f64, scenario: f64) -> Option<f64> {
    if base == 0.0 {
        None
    } else {
        Some((scenario - base) / base * 100.0)
    }
}

/// Recomputes totals under a price shift and an additive margin shift.
///
/// In-scope rows have revenue scaled by `1 + price_change_pct / 100` and
/// profit recomputed from the clamped scenario margin. An identity scenario
/// (both shifts zero) leaves rows untouched so the scenario equals the base.
pub fn simulate(
    rows: &[CanonicalRow],
    scope: &Scope,
    price_change_pct: f64,
    margin_delta_pct: f64,
) -> SimulationResult {
    let identity = price_change_pct == 0.0 && margin_delta_pct == 0.0;
    let price_factor = 1.0 + price_change_pct / 100.0;
    let mut base = Totals::default();
    let mut scenario = Totals::default();
    for row in rows {
        base.revenue += row.revenue;
        base.profit += row.profit;
        if identity || !scope.contains(row) {
            scenario.revenue += row.revenue;
            scenario.profit += row.profit;
        } else {
            let revenue = row.revenue * price_factor;
            scenario.revenue += revenue;
            scenario.profit += revenue * scenario_margin(row.margin_rate, margin_delta_pct);
        }
    }
    SimulationResult { base, scenario }
}

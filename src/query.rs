//! Execution of structured query plans.
//!
//! A plan is produced outside this crate (typically by a language model asked
//! to translate a question) and arrives as JSON. Plans are interpreted
//! leniently: unknown dimensions group by category, unknown metrics sum
//! revenue, and missing `topN` means no truncation.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{AggregatePoint, GroupDimension, Metric, group_aggregate},
    data::format_number,
    projection::CanonicalRow,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PlanFilters {
    /// Year must match exactly; city and category are case-insensitive substrings.
    pub fn matches(&self, row: &CanonicalRow) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| match needle {
            Some(needle) if !needle.is_empty() => {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => true,
        };
        self.year.is_none_or(|year| row.year == Some(year))
            && contains(&row.city, &self.city)
            && contains(&row.category, &self.category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub group_by: String,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default, alias = "titleTR")]
    pub title_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<PlanFilters>,
}

impl QueryPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Parsing query plan JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Reading query plan from {path:?}"))?;
        Self::from_json(&text).with_context(|| format!("Parsing query plan {path:?}"))
    }

    pub fn dimension(&self) -> GroupDimension {
        GroupDimension::parse_lenient(&self.group_by)
    }

    pub fn metric_kind(&self) -> Metric {
        Metric::parse_lenient(&self.metric)
    }

    /// The plan's title, or one derived from metric and dimension.
    pub fn title(&self) -> String {
        if self.title_text.trim().is_empty() {
            format!(
                "{} by {}",
                self.metric_kind().to_string().to_uppercase(),
                self.dimension().key().trim_end_matches("_final").to_lowercase()
            )
        } else {
            self.title_text.clone()
        }
    }
}

/// Filters, groups, sorts and truncates `rows` as the plan describes.
pub fn execute_query_plan(rows: &[CanonicalRow], plan: &QueryPlan) -> Vec<AggregatePoint> {
    let selected: Vec<CanonicalRow>;
    let scoped = match &plan.filters {
        Some(filters) => {
            selected = rows.iter().filter(|r| filters.matches(r)).cloned().collect();
            &selected[..]
        }
        None => rows,
    };
    let mut points = group_aggregate(scoped, &plan.dimension(), plan.metric_kind());
    if let Some(limit) = plan.top_n.filter(|n| *n > 0) {
        points.truncate(limit);
    }
    points
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub title: String,
    pub answer: String,
    pub data: Vec<AggregatePoint>,
    pub plan: QueryPlan,
}

/// Executes the plan and phrases a one-line answer around the leading group.
pub fn answer_query(rows: &[CanonicalRow], plan: &QueryPlan) -> QueryAnswer {
    let data = execute_query_plan(rows, plan);
    let dimension = plan.dimension();
    let dimension_name = dimension.key().trim_end_matches("_final").to_lowercase();
    let answer = match data.first() {
        Some(top) if plan.intent.eq_ignore_ascii_case("topN") => format!(
            "The leading {dimension_name} by {} is {} ({}).",
            plan.metric_kind(),
            top.label,
            format_number((top.value * 100.0).round() / 100.0)
        ),
        Some(_) => format!("Analysed {} {dimension_name} group(s).", data.len()),
        None => "No rows matched the query.".to_string(),
    };
    QueryAnswer {
        title: plan.title(),
        answer,
        data,
        plan: plan.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_accepts_legacy_title_alias() {
        let plan = QueryPlan::from_json(
            r#"{"intent":"topN","groupBy":"branch","metric":"profit","chart":"bar","titleTR":"Şube Kârı","topN":3}"#,
        )
        .unwrap();
        assert_eq!(plan.title_text, "Şube Kârı");
        assert_eq!(plan.top_n, Some(3));
        assert_eq!(plan.dimension(), GroupDimension::Branch);
        assert_eq!(plan.metric_kind(), Metric::Profit);
    }

    #[test]
    fn missing_title_is_derived() {
        let plan = QueryPlan::from_json(r#"{"groupBy":"weekday","metric":"units"}"#).unwrap();
        assert_eq!(plan.title(), "UNITS by weekday");
    }
}

//! Rendering of scheduled e-mail reports. Delivery is left to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    aggregate::KpiTotals,
    data::format_number,
    schema::{Dataset, DatasetMode, DatasetSummary},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    #[default]
    Manager,
    Detail,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Manager => "manager",
            ReportType::Detail => "detail",
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            ReportType::Manager => "Executive summary",
            ReportType::Detail => "Detailed",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numbers embedded in a report body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub dataset_name: String,
    pub mode: DatasetMode,
    pub summary: DatasetSummary,
    pub kpis: KpiTotals,
}

impl ReportSummary {
    pub fn new(dataset: &Dataset, kpis: KpiTotals) -> Self {
        Self {
            dataset_name: dataset.name.clone(),
            mode: dataset.mode,
            summary: dataset.summary,
            kpis,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} rows, {} columns, {} missing values; revenue {}, profit {}, units {}, {} transactions",
            self.summary.row_count,
            self.summary.col_count,
            format_number(self.summary.missing_values),
            format_amount(self.kpis.revenue),
            format_amount(self.kpis.profit),
            format_amount(self.kpis.units),
            self.kpis.transactions
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub fn report_subject(dataset_name: &str, report_type: ReportType) -> String {
    format!(
        "InsightStream report: {dataset_name} ({})",
        report_type.as_str().to_uppercase()
    )
}

pub fn render_email(
    to: &str,
    report_type: ReportType,
    frequency: Frequency,
    summary: &ReportSummary,
) -> EmailMessage {
    let name = escape_html(&summary.dataset_name);
    let html = format!(
        concat!(
            "<div style=\"font-family: sans-serif; padding: 20px;\">",
            "<h2>InsightStream report</h2>",
            "<p>Your scheduled <strong>{heading}</strong> report for <strong>{name}</strong> is ready.</p>",
            "<table>",
            "<tr><td>Mode</td><td>{mode}</td></tr>",
            "<tr><td>Rows</td><td>{rows}</td></tr>",
            "<tr><td>Columns</td><td>{cols}</td></tr>",
            "<tr><td>Missing values</td><td>{missing}</td></tr>",
            "<tr><td>Revenue</td><td>{revenue}</td></tr>",
            "<tr><td>Profit</td><td>{profit}</td></tr>",
            "<tr><td>Units</td><td>{units}</td></tr>",
            "<tr><td>Transactions</td><td>{transactions}</td></tr>",
            "</table>",
            "<p>This report is sent {frequency}.</p>",
            "</div>"
        ),
        heading = report_type.heading(),
        name = name,
        mode = summary.mode,
        rows = summary.summary.row_count,
        cols = summary.summary.col_count,
        missing = format_number(summary.summary.missing_values),
        revenue = format_amount(summary.kpis.revenue),
        profit = format_amount(summary.kpis.profit),
        units = format_amount(summary.kpis.units),
        transactions = summary.kpis.transactions,
        frequency = frequency,
    );
    EmailMessage {
        to: to.to_string(),
        subject: report_subject(&summary.dataset_name, report_type),
        html,
    }
}

/// Two-decimal amount without trailing zeros.
pub fn format_amount(value: f64) -> String {
    format_number((value * 100.0).round() / 100.0)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_upper_cases_report_type() {
        assert_eq!(
            report_subject("Q1 Sales", ReportType::Detail),
            "InsightStream report: Q1 Sales (DETAIL)"
        );
    }

    #[test]
    fn dataset_names_are_escaped_in_html() {
        let summary = ReportSummary {
            dataset_name: "<b>sales</b>".into(),
            mode: DatasetMode::GenericBi,
            summary: DatasetSummary {
                row_count: 2,
                col_count: 3,
                missing_values: 0.0,
            },
            kpis: KpiTotals::default(),
        };
        let message = render_email(
            "ops@example.com",
            ReportType::Manager,
            Frequency::Daily,
            &summary,
        );
        assert!(message.html.contains("&lt;b&gt;sales&lt;/b&gt;"));
        assert!(message.html.contains("sent daily"));
        assert_eq!(message.to, "ops@example.com");
    }

    #[test]
    fn amounts_round_to_cents() {
        assert_eq!(format_amount(1234.5678), "1234.57");
        assert_eq!(format_amount(10.0), "10");
    }
}

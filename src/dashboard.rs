use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{
    aggregate::{
        AggregatePoint, CategoryShare, GroupDimension, KpiTotals, Metric, category_breakdown,
        group_aggregate, kpi_totals,
    },
    analytics::{BubbleChart, ForecastPoint, ParetoPoint, forecast, pareto, price_quantity_bubbles},
    cli::DashboardArgs,
    data::format_number,
    filter::{FilterOptions, FilterState, apply_filters, filter_options, parse_filter_args},
    projection::CanonicalRow,
    report::format_amount,
    repository::{HistoryRepository, NewRecord, RecordKind},
    schema::DatasetMode,
    session::Session,
    table::{Align, Table},
};

pub const TOP_BRANCHES: usize = 10;

/// Every dashboard series computed over one filtered row set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardBundle {
    pub mode: DatasetMode,
    pub row_count: usize,
    pub kpis: KpiTotals,
    pub monthly_profit: Vec<AggregatePoint>,
    pub weekday_profit: Vec<AggregatePoint>,
    pub branch_revenue: Vec<AggregatePoint>,
    pub category_breakdown: Vec<CategoryShare>,
    pub bubble: BubbleChart,
    pub forecast: Vec<ForecastPoint>,
    pub pareto: Vec<ParetoPoint>,
    pub options: FilterOptions,
}

/// Applies `filters` and computes the bundle. Filter options are drawn from
/// the unfiltered rows so deselected values stay selectable.
pub fn build_dashboard(
    rows: &[CanonicalRow],
    filters: &FilterState,
    mode: DatasetMode,
) -> DashboardBundle {
    let filtered = apply_filters(rows, filters);
    let mut branch_revenue = group_aggregate(&filtered, &GroupDimension::Branch, Metric::Revenue);
    branch_revenue.truncate(TOP_BRANCHES);
    DashboardBundle {
        mode,
        row_count: filtered.len(),
        kpis: kpi_totals(&filtered),
        monthly_profit: group_aggregate(&filtered, &GroupDimension::Month, Metric::Profit),
        weekday_profit: group_aggregate(&filtered, &GroupDimension::Weekday, Metric::Profit),
        branch_revenue,
        category_breakdown: category_breakdown(&filtered),
        bubble: price_quantity_bubbles(&filtered),
        forecast: forecast(&filtered),
        pareto: pareto(&filtered),
        options: filter_options(rows, filters),
    }
}

pub fn execute(args: &DashboardArgs) -> Result<()> {
    let session = Session::open(&args.input)?;
    let mut filters = session.config.filters.clone();
    if !args.filters.is_empty() {
        filters = parse_filter_args(&args.filters).context("Parsing --filter arguments")?;
    }
    let bundle = build_dashboard(&session.rows, &filters, session.dataset.mode);
    info!(
        "Dashboard over {} of {} row(s)",
        bundle.row_count,
        session.rows.len()
    );

    if args.snapshot {
        let storage = session.require_storage("--snapshot")?;
        let record = HistoryRepository::new(storage).save(
            &session.dataset_id,
            NewRecord {
                kind: RecordKind::DashboardSnapshot,
                title_text: format!("Dashboard snapshot: {}", session.dataset.name),
                filter_state_snapshot: filters.clone(),
                payload: serde_json::to_value(&bundle).context("Serializing dashboard snapshot")?,
            },
        )?;
        info!("Saved dashboard snapshot {}", record.id);
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&bundle).context("Serializing dashboard to JSON")?
        );
    } else {
        render_bundle(&session.dataset.name, &bundle);
    }
    Ok(())
}

fn points_table(title: &str, dimension: &str, metric: &str, points: &[AggregatePoint]) -> Table {
    let mut table = Table::new([dimension, metric])
        .titled(title)
        .align(1, Align::Right);
    for point in points {
        table.push([point.label.clone(), format_amount(point.value)]);
    }
    table
}

fn optional_amount(value: Option<f64>) -> String {
    value.map(format_amount).unwrap_or_else(|| "-".to_string())
}

fn render_bundle(name: &str, bundle: &DashboardBundle) {
    let mut kpis = Table::new(["kpi", "value"])
        .titled(format!("{name} ({}, {} row(s))", bundle.mode, bundle.row_count))
        .align(1, Align::Right);
    kpis.push(["revenue".to_string(), format_amount(bundle.kpis.revenue)]);
    kpis.push(["profit".to_string(), format_amount(bundle.kpis.profit)]);
    kpis.push(["units".to_string(), format_amount(bundle.kpis.units)]);
    kpis.push([
        "transactions".to_string(),
        bundle.kpis.transactions.to_string(),
    ]);
    kpis.print();
    println!();

    points_table("Monthly profit", "month", "profit", &bundle.monthly_profit).print();
    println!();
    points_table("Weekday profit", "weekday", "profit", &bundle.weekday_profit).print();
    println!();
    points_table("Top branches", "branch", "revenue", &bundle.branch_revenue).print();
    println!();

    let mut categories = Table::new(["category", "transactions", "share %", "revenue"])
        .titled("Category breakdown")
        .align(1, Align::Right)
        .align(2, Align::Right)
        .align(3, Align::Right);
    for share in &bundle.category_breakdown {
        categories.push([
            share.label.clone(),
            share.value.to_string(),
            format_amount(share.share),
            format_amount(share.revenue),
        ]);
    }
    categories.print();
    println!();

    match &bundle.bubble {
        BubbleChart::Correlation { data } => {
            let mut bubbles = Table::new(["product", "category", "avg price", "quantity", "profit"])
                .titled("Price vs quantity")
                .align(2, Align::Right)
                .align(3, Align::Right)
                .align(4, Align::Right);
            for point in data {
                bubbles.push([
                    point.label.clone(),
                    point.category.clone(),
                    format_amount(point.x),
                    format_amount(point.y),
                    format_amount(point.z),
                ]);
            }
            bubbles.print();
        }
        BubbleChart::Fallback { data } => {
            let mut fallback = Table::new(["category", "transactions"])
                .titled("Transactions by category (not enough price variation for a correlation)")
                .align(1, Align::Right);
            for entry in data {
                fallback.push([entry.label.clone(), format_number(entry.value)]);
            }
            fallback.print();
        }
    }
    println!();

    let mut trend = Table::new(["month", "actual", "forecast"])
        .titled("Profit forecast")
        .align(1, Align::Right)
        .align(2, Align::Right);
    for point in &bundle.forecast {
        trend.push([
            point.label.clone(),
            optional_amount(point.actual),
            optional_amount(point.forecast),
        ]);
    }
    trend.print();
    println!();

    let mut pareto = Table::new(["product", "revenue", "cumulative %"])
        .titled("Pareto")
        .align(1, Align::Right)
        .align(2, Align::Right);
    for point in &bundle.pareto {
        pareto.push([
            point.label.clone(),
            format_amount(point.value),
            format_number((point.cumulative_percent * 10.0).round() / 10.0),
        ]);
    }
    pareto.print();
    println!();

    let options = &bundle.options;
    println!("Filter options");
    println!("  years: {}", options.years.iter().join(", "));
    println!("  cities: {}", options.cities.iter().join(", "));
    println!("  branches: {}", options.branches.iter().join(", "));
    println!("  categories: {}", options.categories.iter().join(", "));
}

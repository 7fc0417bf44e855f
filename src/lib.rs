pub mod aggregate;
pub mod analytics;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod expr;
pub mod filter;
pub mod io_utils;
pub mod numeric;
pub mod projection;
pub mod query;
pub mod report;
pub mod repository;
pub mod schema;
pub mod schema_cmd;
pub mod session;
pub mod simulation;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use serde_json::json;

use crate::{
    aggregate::kpi_totals,
    cli::{Cli, Commands},
    data::format_number,
    filter::{FilterState, apply_filters, parse_filter_args},
    query::{QueryPlan, answer_query},
    report::{ReportSummary, format_amount, render_email},
    repository::{
        ChartType, HistoryRepository, NewRecord, NewSchedule, PinnedChartRepository,
        RecentDatasets, RecordKind, ScheduleRepository,
    },
    session::Session,
    simulation::{Scope, simulate},
    table::{Align, Table},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("insightstream", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Profile(args) => schema_cmd::execute(&args),
        Commands::Dashboard(args) => dashboard::execute(&args),
        Commands::Query(args) => handle_query(&args),
        Commands::Simulate(args) => handle_simulate(&args),
        Commands::Report(args) => handle_report(&args),
        Commands::Project(args) => handle_project(&args),
        Commands::History(args) => handle_history(&args),
    }
}

/// `--filter` arguments replace the config's filters when present.
fn resolve_filters(session: &Session, args: &[String]) -> Result<FilterState> {
    if args.is_empty() {
        Ok(session.config.filters.clone())
    } else {
        parse_filter_args(args).context("Parsing --filter arguments")
    }
}

fn handle_query(args: &cli::QueryArgs) -> Result<()> {
    let session = Session::open(&args.input)?;
    let mut plan = match &args.plan {
        Some(path) => QueryPlan::load(path)?,
        None => QueryPlan {
            intent: "topN".to_string(),
            group_by: "category".to_string(),
            metric: "revenue".to_string(),
            chart: "bar".to_string(),
            title_text: String::new(),
            top_n: None,
            filters: None,
        },
    };
    if let Some(group_by) = &args.group_by {
        plan.group_by = group_by.clone();
    }
    if let Some(metric) = &args.metric {
        plan.metric = metric.clone();
    }
    if let Some(top_n) = args.top_n {
        plan.top_n = Some(top_n);
    }
    if let Some(intent) = &args.intent {
        plan.intent = intent.clone();
    }
    debug!("Executing query plan {plan:?}");

    let rows = apply_filters(&session.rows, &session.config.filters);
    let answer = answer_query(&rows, &plan);
    info!("Query '{}' produced {} group(s)", answer.title, answer.data.len());

    if let Some(storage) = session.storage() {
        HistoryRepository::new(storage).save(
            &session.dataset_id,
            NewRecord {
                kind: RecordKind::Chat,
                title_text: answer.title.clone(),
                filter_state_snapshot: session.config.filters.clone(),
                payload: serde_json::to_value(&answer).context("Serializing query answer")?,
            },
        )?;
    }
    if args.pin {
        let storage = session.require_storage("--pin")?;
        let chart = PinnedChartRepository::new(storage).pin(
            &session.dataset_id,
            &answer.title,
            ChartType::parse_lenient(&plan.chart),
            serde_json::to_value(&answer.data).context("Serializing chart data")?,
            serde_json::to_value(&plan).context("Serializing query plan")?,
        )?;
        info!("Pinned chart {}", chart.id);
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&answer).context("Serializing query answer to JSON")?
        );
        return Ok(());
    }
    let metric = plan.metric_kind().to_string();
    let mut table = Table::new(["label", metric.as_str()])
        .titled(&answer.title)
        .align(1, Align::Right);
    for point in &answer.data {
        table.push([point.label.clone(), format_amount(point.value)]);
    }
    table.print();
    println!("{}", answer.answer);
    Ok(())
}

fn handle_simulate(args: &cli::SimulateArgs) -> Result<()> {
    let session = Session::open(&args.input)?;
    let filters = resolve_filters(&session, &args.filters)?;
    let rows = apply_filters(&session.rows, &filters);
    let scope = Scope::parse(&args.scope);
    let result = simulate(&rows, &scope, args.price_change, args.margin_change);
    info!(
        "Simulated scope {scope} with price {:+}% and margin {:+} pt over {} row(s)",
        args.price_change,
        args.margin_change,
        rows.len()
    );
    if result.revenue_change_pct().is_none() {
        warn!("Base revenue is zero; percentage changes are undefined");
    }

    let payload = json!({
        "scope": scope,
        "priceChangePct": args.price_change,
        "marginChangePct": args.margin_change,
        "base": result.base,
        "scenario": result.scenario,
        "revenueChangePct": result.revenue_change_pct(),
        "profitChangePct": result.profit_change_pct(),
    });
    if let Some(storage) = session.storage() {
        HistoryRepository::new(storage).save(
            &session.dataset_id,
            NewRecord {
                kind: RecordKind::Simulation,
                title_text: format!(
                    "Simulation {scope}: price {:+}%, margin {:+} pt",
                    args.price_change, args.margin_change
                ),
                filter_state_snapshot: filters,
                payload: payload.clone(),
            },
        )?;
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("Serializing simulation to JSON")?
        );
        return Ok(());
    }
    let change = |value: Option<f64>| {
        value
            .map(|pct| format!("{}%", format_number((pct * 100.0).round() / 100.0)))
            .unwrap_or_else(|| "-".to_string())
    };
    let mut table = Table::new(["measure", "base", "scenario", "change"])
        .titled(format!("Simulation ({scope})"))
        .align(1, Align::Right)
        .align(2, Align::Right)
        .align(3, Align::Right);
    table.push([
        "revenue".to_string(),
        format_amount(result.base.revenue),
        format_amount(result.scenario.revenue),
        change(result.revenue_change_pct()),
    ]);
    table.push([
        "profit".to_string(),
        format_amount(result.base.profit),
        format_amount(result.scenario.profit),
        change(result.profit_change_pct()),
    ]);
    table.print();
    Ok(())
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let session = Session::open(&args.input)?;
    let rows = apply_filters(&session.rows, &session.config.filters);
    let summary = ReportSummary::new(&session.dataset, kpi_totals(&rows));
    let report_type = args.report_type.into();
    let frequency = args.frequency.into();

    let schedule = if args.schedule {
        let storage = session.require_storage("--schedule")?;
        let created = ScheduleRepository::new(storage).create(
            &session.dataset_id,
            NewSchedule {
                dataset_name: session.dataset.name.clone(),
                email: args.email.clone(),
                report_type,
                frequency,
                day: args.day.clone(),
                time: args.time.clone(),
            },
        )?;
        info!(
            "Scheduled {} {} report {} for {}",
            created.frequency, created.report_type, created.id, created.email
        );
        Some((storage, created))
    } else {
        None
    };

    let message = render_email(args.email.trim(), report_type, frequency, &summary);
    let delivered = match (&args.output, args.json) {
        (_, true) => serde_json::to_string_pretty(&message)
            .context("Serializing report message to JSON")
            .map(|text| println!("{text}")),
        (Some(path), false) => std::fs::write(path, &message.html)
            .with_context(|| format!("Writing report body to {path:?}")),
        (None, false) => {
            println!("{}", message.html);
            Ok(())
        }
    };

    if let Some((storage, created)) = schedule {
        let outcome = delivered.as_ref().map(|_| ()).map_err(|err| format!("{err:#}"));
        ScheduleRepository::new(storage).record_run(&session.dataset_id, &created.id, outcome)?;
    }
    delivered?;
    info!("Rendered report '{}' for {}", message.subject, message.to);
    Ok(())
}

fn handle_project(args: &cli::ProjectArgs) -> Result<()> {
    let session = Session::open(&args.input)?;
    let filters = resolve_filters(&session, &args.filters)?;
    let rows = apply_filters(&session.rows, &filters);
    let delimiter = args
        .output_delimiter
        .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
    let records: Vec<data::RawRow> = rows.iter().map(|row| row.to_record()).collect();
    io_utils::write_records(args.output.as_deref(), delimiter, &records)
        .context("Writing canonical rows")?;
    info!(
        "Exported {} canonical row(s) to {}",
        records.len(),
        args.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".into())
    );
    Ok(())
}

fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn handle_history(args: &cli::HistoryArgs) -> Result<()> {
    let session = Session::open(&args.input)?;
    let storage = session.require_storage("history")?;
    let records = HistoryRepository::new(storage).list_filtered(
        &session.dataset_id,
        args.kind.map(RecordKind::from),
        args.search.as_deref(),
    )?;
    let schedules = ScheduleRepository::new(storage).list(&session.dataset_id)?;
    let pinned = PinnedChartRepository::new(storage).list(&session.dataset_id)?;
    let recent = RecentDatasets::new(storage).list()?;

    if args.json {
        let document = json!({
            "datasetId": session.dataset_id,
            "history": records,
            "schedules": schedules,
            "pinnedCharts": pinned,
            "recentDatasets": recent,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&document).context("Serializing history to JSON")?
        );
        return Ok(());
    }

    let mut history = Table::new(["created", "type", "title", "pinned"])
        .titled(format!("History for {} ({})", session.dataset.name, session.dataset_id));
    for record in &records {
        history.push([
            format_timestamp(record.created_at),
            serde_json::to_value(record.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            record.title_text.clone(),
            if record.pinned { "yes" } else { "" }.to_string(),
        ]);
    }
    history.print();
    println!();

    let mut scheduled = Table::new([
        "id",
        "email",
        "type",
        "frequency",
        "time",
        "enabled",
        "last status",
    ])
    .titled("Scheduled reports");
    for schedule in &schedules {
        scheduled.push([
            schedule.id.to_string(),
            schedule.email.clone(),
            schedule.report_type.to_string(),
            schedule.frequency.to_string(),
            match &schedule.day {
                Some(day) => format!("{day} {}", schedule.time),
                None => schedule.time.clone(),
            },
            schedule.is_enabled.to_string(),
            schedule
                .last_status
                .map(|status| format!("{status:?}").to_uppercase())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    scheduled.print();
    println!();

    let mut charts = Table::new(["id", "title", "created"]).titled("Pinned charts");
    for chart in &pinned {
        charts.push([
            chart.id.to_string(),
            chart.title.clone(),
            format_timestamp(chart.created_at),
        ]);
    }
    charts.print();
    println!();

    let mut recents = Table::new(["dataset", "id", "opened"]).titled("Recent datasets");
    for entry in &recent {
        recents.push([
            entry.name.clone(),
            entry.id.to_string(),
            format_timestamp(entry.timestamp),
        ]);
    }
    recents.print();
    Ok(())
}

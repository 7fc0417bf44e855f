use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{
    cli::ProfileArgs,
    config::DashboardConfig,
    data::format_number,
    repository::TemplateRepository,
    schema::{ColumnProfile, DatasetMode, DatasetSummary, SchemaMapping, SemanticRole},
    session::Session,
    table::{Align, Table},
};

const SAMPLE_PREVIEW: usize = 3;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileReport<'a> {
    dataset_name: &'a str,
    dataset_id: &'a str,
    mode: DatasetMode,
    summary: &'a DatasetSummary,
    profiles: &'a [ColumnProfile],
    mapping: &'a SchemaMapping,
}

pub fn execute(args: &ProfileArgs) -> Result<()> {
    let session = Session::open(&args.input)?;
    let dataset = &session.dataset;

    if let Some(path) = &args.mapping {
        let config = DashboardConfig {
            mapping: Some(dataset.mapping.clone()),
            ..session.config.clone()
        };
        config
            .save(path)
            .with_context(|| format!("Writing mapping config to {path:?}"))?;
        info!(
            "Mapping for {} column(s) written to {path:?}",
            dataset.columns.len()
        );
    }

    if let Some(name) = &args.save_template {
        let storage = session.require_storage("--save-template")?;
        let template = TemplateRepository::new(storage).save(
            name,
            dataset.mapping.clone(),
            session.config.filters.clone(),
            session.fields.clone(),
        )?;
        info!("Saved template '{}' as {}", template.name, template.id);
    }

    if args.json {
        let report = ProfileReport {
            dataset_name: &dataset.name,
            dataset_id: session.dataset_id.as_str(),
            mode: dataset.mode,
            summary: &dataset.summary,
            profiles: &dataset.profiles,
            mapping: &dataset.mapping,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Serializing profile to JSON")?
        );
        return Ok(());
    }

    let mut columns = Table::new(["column", "type", "missing %", "unique", "samples"])
        .titled(format!(
            "{} ({} row(s), {} column(s), {} missing value(s))",
            dataset.name,
            dataset.summary.row_count,
            dataset.summary.col_count,
            format_number(dataset.summary.missing_values)
        ))
        .align(2, Align::Right)
        .align(3, Align::Right);
    for profile in &dataset.profiles {
        columns.push([
            profile.name.clone(),
            profile.column_type.to_string(),
            format_number((profile.missing_rate * 1000.0).round() / 10.0),
            profile.unique_count.to_string(),
            profile
                .sample_values
                .iter()
                .take(SAMPLE_PREVIEW)
                .map(|v| v.as_display())
                .join(" | "),
        ]);
    }
    columns.print();
    println!();

    let mut roles =
        Table::new(["role", "column"]).titled(format!("Mapping (mode {})", dataset.mode));
    for role in SemanticRole::ALL {
        roles.push([
            role.to_string(),
            dataset.mapping.get(role).unwrap_or("-").to_string(),
        ]);
    }
    roles.print();
    Ok(())
}

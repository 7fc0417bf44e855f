use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    projection::TxIdFallback,
    report::{Frequency, ReportType},
    repository::RecordKind,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Profile sales datasets and compute dashboard analytics",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Profile columns, infer the semantic mapping and detect the dataset mode
    Profile(ProfileArgs),
    /// Compute KPIs and every dashboard series for the filtered rows
    Dashboard(DashboardArgs),
    /// Execute a structured query plan (group, metric, topN, filters)
    Query(QueryArgs),
    /// Run a what-if price and margin simulation
    Simulate(SimulateArgs),
    /// Render the e-mail body of a scheduled report
    Report(ReportArgs),
    /// Export canonical rows (raw columns plus derived fields) as CSV
    Project(ProjectArgs),
    /// List saved analysis history for a dataset
    History(HistoryArgs),
}

/// Options shared by every command that reads a dataset.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input file (.csv, .tsv or .json); `-` reads CSV from stdin
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Dashboard configuration YAML (mapping overrides, calculated fields, filters)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Additional calculated fields using `name=expression`, e.g. `Net=[Revenue]-[Cost]`
    #[arg(long = "calc", action = clap::ArgAction::Append)]
    pub calc: Vec<String>,
    /// How to fill missing transaction ids (overrides the config)
    #[arg(long = "tx-fallback", value_enum)]
    pub tx_fallback: Option<TxFallbackArg>,
    /// Directory used to persist history, schedules and recent datasets
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// Apply a saved template (mapping, filters, calculated fields) by id (requires --store)
    #[arg(long)]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum TxFallbackArg {
    RowOrdinal,
    Random,
}

impl From<TxFallbackArg> for TxIdFallback {
    fn from(value: TxFallbackArg) -> Self {
        match value {
            TxFallbackArg::RowOrdinal => TxIdFallback::RowOrdinal,
            TxFallbackArg::Random => TxIdFallback::Random,
        }
    }
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Write the resolved mapping as a dashboard config YAML skeleton
    #[arg(short, long)]
    pub mapping: Option<PathBuf>,
    /// Save the resolved mapping, config filters and calculated fields as a named template (requires --store)
    #[arg(long = "save-template")]
    pub save_template: Option<String>,
    /// Emit JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Filters such as `year=2023`, `city=Izmir,Ankara` or `Channel=Online`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Save a dashboard snapshot to the history store
    #[arg(long)]
    pub snapshot: bool,
    /// Emit JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Query plan JSON file; individual flags below override its fields
    #[arg(long)]
    pub plan: Option<PathBuf>,
    /// Dimension: branch, city, category, month, weekday or `column:<name>`
    #[arg(long = "group-by")]
    pub group_by: Option<String>,
    /// Metric: revenue, profit, units, transactions or `column:<name>` (any numeric or calculated column)
    #[arg(long)]
    pub metric: Option<String>,
    /// Keep only the first N groups after sorting
    #[arg(long = "top-n")]
    pub top_n: Option<usize>,
    /// Plan intent (topN, trend or distribution)
    #[arg(long)]
    pub intent: Option<String>,
    /// Pin the resulting chart to the dataset (requires --store)
    #[arg(long)]
    pub pin: bool,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Filters applied before simulating (same syntax as dashboard)
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Category to apply the scenario to, or ALL
    #[arg(long, default_value = "ALL")]
    pub scope: String,
    /// Price change in percent
    #[arg(long = "price-change", default_value_t = 0.0, allow_hyphen_values = true)]
    pub price_change: f64,
    /// Additive margin change in percentage points
    #[arg(long = "margin-change", default_value_t = 0.0, allow_hyphen_values = true)]
    pub margin_change: f64,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Recipient address
    #[arg(long)]
    pub email: String,
    /// Report flavour
    #[arg(long = "type", value_enum, default_value_t = ReportTypeArg::Manager)]
    pub report_type: ReportTypeArg,
    /// Delivery frequency
    #[arg(long, value_enum, default_value_t = FrequencyArg::Weekly)]
    pub frequency: FrequencyArg,
    /// Weekday for weekly reports
    #[arg(long)]
    pub day: Option<String>,
    /// Delivery time as HH:MM
    #[arg(long, default_value = "09:00")]
    pub time: String,
    /// Also register the schedule in the store (requires --store)
    #[arg(long)]
    pub schedule: bool,
    /// Write the HTML body here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Emit the whole message as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ReportTypeArg {
    Manager,
    Detail,
}

impl From<ReportTypeArg> for ReportType {
    fn from(value: ReportTypeArg) -> Self {
        match value {
            ReportTypeArg::Manager => ReportType::Manager,
            ReportTypeArg::Detail => ReportType::Detail,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FrequencyArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<FrequencyArg> for Frequency {
    fn from(value: FrequencyArg) -> Self {
        match value {
            FrequencyArg::Daily => Frequency::Daily,
            FrequencyArg::Weekly => Frequency::Weekly,
            FrequencyArg::Monthly => Frequency::Monthly,
        }
    }
}

#[derive(Debug, Args)]
pub struct ProjectArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Filters applied before export (same syntax as dashboard)
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Output CSV file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Delimiter to use for output
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Only list history records of this type
    #[arg(long, value_enum)]
    pub kind: Option<RecordKindArg>,
    /// Case-insensitive text matched against record titles
    #[arg(long)]
    pub search: Option<String>,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum RecordKindArg {
    Chat,
    Simulation,
    Insight,
    Recommendation,
    DashboardSnapshot,
}

impl From<RecordKindArg> for RecordKind {
    fn from(value: RecordKindArg) -> Self {
        match value {
            RecordKindArg::Chat => RecordKind::Chat,
            RecordKindArg::Simulation => RecordKind::Simulation,
            RecordKindArg::Insight => RecordKind::Insight,
            RecordKindArg::Recommendation => RecordKind::Recommendation,
            RecordKindArg::DashboardSnapshot => RecordKind::DashboardSnapshot,
        }
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

//! Typed persistence for everything that outlives a single analysis run.
//!
//! Each repository stores one JSON document per key in a [`Storage`]
//! backend. Keys are built from typed identifiers ([`DatasetId`],
//! [`RecordId`]); the analytics modules never touch storage.

use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use chrono::{NaiveTime, Utc};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    data::RawRow,
    expr::CalculatedField,
    filter::FilterState,
    report::{Frequency, ReportType},
    schema::{DatasetMode, SchemaMapping},
};

pub const MAX_RECENT_DATASETS: usize = 5;
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage I/O failed for key '{key}'")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("stored document '{key}' is not valid JSON")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid e-mail address '{0}'")]
    InvalidEmail(String),
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("record '{0}' not found")]
    NotFound(String),
    #[error("e-mail pattern failed to compile")]
    Pattern(#[source] regex::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// A string key-value store.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> RepoResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> RepoResult<()>;
    fn remove(&self, key: &str) -> RepoResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| RepositoryError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> RepoResult<()> {
        let mut entries = self.entries.lock().map_err(|_| RepositoryError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> RepoResult<()> {
        let mut entries = self.entries.lock().map_err(|_| RepositoryError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> RepoResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RepositoryError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> RepoResult<()> {
        let io_err = |source| RepositoryError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;
        fs::write(self.path_for(key), value).map_err(io_err)
    }

    fn remove(&self, key: &str) -> RepoResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RepositoryError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> RepoResult<Option<T>> {
    match storage.get(key)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| RepositoryError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

fn save_json<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) -> RepoResult<()> {
    let text = serde_json::to_string(value).map_err(|source| RepositoryError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    debug!("Persisting {} byte(s) under '{key}'", text.len());
    storage.put(key, &text)
}

fn load_list<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> RepoResult<Vec<T>> {
    Ok(load_json(storage, key)?.unwrap_or_default())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Content-derived id: `ds_` plus the first 16 hex digits of the rows' SHA-256.
    pub fn fingerprint(rows: &[RawRow]) -> Self {
        let mut hasher = Sha256::new();
        for row in rows {
            for (name, value) in row.iter() {
                hasher.update(name.as_bytes());
                hasher.update([0x1f]);
                hasher.update(value.distinct_key().as_bytes());
                hasher.update([0x1e]);
            }
            hasher.update([0x0a]);
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        Self(format!("ds_{hex}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Chat,
    Simulation,
    Insight,
    Recommendation,
    DashboardSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub dataset_id: DatasetId,
    #[serde(alias = "titleTR")]
    pub title_text: String,
    pub created_at: i64,
    #[serde(default)]
    pub filter_state_snapshot: FilterState,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub kind: RecordKind,
    pub title_text: String,
    pub filter_state_snapshot: FilterState,
    pub payload: serde_json::Value,
}

/// Per-dataset analysis history, newest first.
pub struct HistoryRepository<'a> {
    storage: &'a dyn Storage,
}

impl<'a> HistoryRepository<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    fn key(dataset: &DatasetId) -> String {
        format!("history_{dataset}")
    }

    pub fn list(&self, dataset: &DatasetId) -> RepoResult<Vec<AnalysisRecord>> {
        load_list(self.storage, &Self::key(dataset))
    }

    /// Lists records of one kind whose title contains `term`, ignoring case.
    /// A missing kind or a blank term matches everything.
    pub fn list_filtered(
        &self,
        dataset: &DatasetId,
        kind: Option<RecordKind>,
        term: Option<&str>,
    ) -> RepoResult<Vec<AnalysisRecord>> {
        let needle = term
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());
        let mut records = self.list(dataset)?;
        records.retain(|record| {
            kind.is_none_or(|k| record.kind == k)
                && needle
                    .as_deref()
                    .is_none_or(|n| record.title_text.to_lowercase().contains(n))
        });
        Ok(records)
    }

    pub fn save(&self, dataset: &DatasetId, record: NewRecord) -> RepoResult<AnalysisRecord> {
        let saved = AnalysisRecord {
            id: RecordId::generate("rec"),
            kind: record.kind,
            dataset_id: dataset.clone(),
            title_text: record.title_text,
            created_at: now_millis(),
            filter_state_snapshot: record.filter_state_snapshot,
            payload: record.payload,
            pinned: false,
        };
        let mut records = self.list(dataset)?;
        records.insert(0, saved.clone());
        save_json(self.storage, &Self::key(dataset), &records)?;
        Ok(saved)
    }

    /// Flips the pinned flag and returns its new value.
    pub fn toggle_pin(&self, dataset: &DatasetId, id: &RecordId) -> RepoResult<bool> {
        let mut records = self.list(dataset)?;
        let record = records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.pinned = !record.pinned;
        let pinned = record.pinned;
        save_json(self.storage, &Self::key(dataset), &records)?;
        Ok(pinned)
    }

    pub fn delete(&self, dataset: &DatasetId, id: &RecordId) -> RepoResult<bool> {
        let mut records = self.list(dataset)?;
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        save_json(self.storage, &Self::key(dataset), &records)?;
        Ok(true)
    }

    pub fn clear(&self, dataset: &DatasetId) -> RepoResult<()> {
        self.storage.remove(&Self::key(dataset))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReport {
    pub id: RecordId,
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    pub email: String,
    pub report_type: ReportType,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    pub time: String,
    pub is_enabled: bool,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub dataset_name: String,
    pub email: String,
    pub report_type: ReportType,
    pub frequency: Frequency,
    /// Weekday name; only kept for weekly schedules.
    pub day: Option<String>,
    pub time: String,
}

static EMAIL_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

pub fn is_valid_email(email: &str) -> RepoResult<bool> {
    let regex = EMAIL_REGEX
        .get_or_init(|| Regex::new(EMAIL_PATTERN))
        .as_ref()
        .map_err(|err| RepositoryError::Pattern(err.clone()))?;
    Ok(regex.is_match(email))
}

pub struct ScheduleRepository<'a> {
    storage: &'a dyn Storage,
}

impl<'a> ScheduleRepository<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    fn key(dataset: &DatasetId) -> String {
        format!("schedules_{dataset}")
    }

    pub fn list(&self, dataset: &DatasetId) -> RepoResult<Vec<ScheduledReport>> {
        load_list(self.storage, &Self::key(dataset))
    }

    pub fn create(
        &self,
        dataset: &DatasetId,
        schedule: NewSchedule,
    ) -> RepoResult<ScheduledReport> {
        let email = schedule.email.trim().to_string();
        if !is_valid_email(&email)? {
            return Err(RepositoryError::InvalidEmail(schedule.email));
        }
        if NaiveTime::parse_from_str(schedule.time.trim(), "%H:%M").is_err() {
            return Err(RepositoryError::InvalidTime(schedule.time));
        }
        let day = match schedule.frequency {
            Frequency::Weekly => schedule.day,
            _ => None,
        };
        let report = ScheduledReport {
            id: RecordId::generate("sch"),
            dataset_id: dataset.clone(),
            dataset_name: schedule.dataset_name,
            email,
            report_type: schedule.report_type,
            frequency: schedule.frequency,
            day,
            time: schedule.time.trim().to_string(),
            is_enabled: true,
            created_at: now_millis(),
            last_run_at: None,
            last_status: None,
            error_message: None,
        };
        let mut reports = self.list(dataset)?;
        reports.push(report.clone());
        save_json(self.storage, &Self::key(dataset), &reports)?;
        Ok(report)
    }

    fn update<F>(&self, dataset: &DatasetId, id: &RecordId, apply: F) -> RepoResult<ScheduledReport>
    where
        F: FnOnce(&mut ScheduledReport),
    {
        let mut reports = self.list(dataset)?;
        let report = reports
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        apply(report);
        let updated = report.clone();
        save_json(self.storage, &Self::key(dataset), &reports)?;
        Ok(updated)
    }

    pub fn toggle_enabled(
        &self,
        dataset: &DatasetId,
        id: &RecordId,
    ) -> RepoResult<ScheduledReport> {
        self.update(dataset, id, |report| report.is_enabled = !report.is_enabled)
    }

    /// Stores the outcome of a delivery attempt; `Err` carries the failure message.
    pub fn record_run(
        &self,
        dataset: &DatasetId,
        id: &RecordId,
        outcome: Result<(), String>,
    ) -> RepoResult<ScheduledReport> {
        self.update(dataset, id, |report| {
            report.last_run_at = Some(now_millis());
            match outcome {
                Ok(()) => {
                    report.last_status = Some(RunStatus::Success);
                    report.error_message = None;
                }
                Err(message) => {
                    report.last_status = Some(RunStatus::Failed);
                    report.error_message = Some(message);
                }
            }
        })
    }

    pub fn delete(&self, dataset: &DatasetId, id: &RecordId) -> RepoResult<bool> {
        let mut reports = self.list(dataset)?;
        let before = reports.len();
        reports.retain(|r| &r.id != id);
        if reports.len() == before {
            return Ok(false);
        }
        save_json(self.storage, &Self::key(dataset), &reports)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTemplate {
    pub id: RecordId,
    pub name: String,
    pub mapping: SchemaMapping,
    pub mode: DatasetMode,
    pub filters: FilterState,
    pub is_locked: bool,
    pub created_at: i64,
    #[serde(default)]
    pub calculated_fields: Vec<CalculatedField>,
}

/// Templates are global rather than per dataset.
pub struct TemplateRepository<'a> {
    storage: &'a dyn Storage,
}

impl<'a> TemplateRepository<'a> {
    const KEY: &'static str = "templates";

    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    pub fn list(&self) -> RepoResult<Vec<DashboardTemplate>> {
        load_list(self.storage, Self::KEY)
    }

    pub fn save(
        &self,
        name: &str,
        mapping: SchemaMapping,
        filters: FilterState,
        calculated_fields: Vec<CalculatedField>,
    ) -> RepoResult<DashboardTemplate> {
        let template = DashboardTemplate {
            id: RecordId::generate("tmpl"),
            name: name.to_string(),
            mode: mapping.mode(),
            mapping,
            filters,
            is_locked: true,
            created_at: now_millis(),
            calculated_fields,
        };
        let mut templates = self.list()?;
        templates.push(template.clone());
        save_json(self.storage, Self::KEY, &templates)?;
        Ok(template)
    }

    pub fn get(&self, id: &RecordId) -> RepoResult<Option<DashboardTemplate>> {
        Ok(self.list()?.into_iter().find(|t| &t.id == id))
    }

    pub fn delete(&self, id: &RecordId) -> RepoResult<bool> {
        let mut templates = self.list()?;
        let before = templates.len();
        templates.retain(|t| &t.id != id);
        if templates.len() == before {
            return Ok(false);
        }
        save_json(self.storage, Self::KEY, &templates)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Area,
    Composed,
}

impl ChartType {
    /// Parses a query-plan chart name; unknown names become bar charts.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "line" => ChartType::Line,
            "pie" => ChartType::Pie,
            "scatter" => ChartType::Scatter,
            "area" => ChartType::Area,
            "composed" => ChartType::Composed,
            _ => ChartType::Bar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedChart {
    pub id: RecordId,
    pub title: String,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: serde_json::Value,
    #[serde(default)]
    pub plan: serde_json::Value,
    pub created_at: i64,
}

pub struct PinnedChartRepository<'a> {
    storage: &'a dyn Storage,
}

impl<'a> PinnedChartRepository<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    fn key(dataset: &DatasetId) -> String {
        format!("pinned_{dataset}")
    }

    pub fn list(&self, dataset: &DatasetId) -> RepoResult<Vec<PinnedChart>> {
        load_list(self.storage, &Self::key(dataset))
    }

    pub fn pin(
        &self,
        dataset: &DatasetId,
        title: &str,
        chart_type: ChartType,
        data: serde_json::Value,
        plan: serde_json::Value,
    ) -> RepoResult<PinnedChart> {
        let chart = PinnedChart {
            id: RecordId::generate("pin"),
            title: title.to_string(),
            chart_type,
            data,
            plan,
            created_at: now_millis(),
        };
        let mut charts = self.list(dataset)?;
        charts.push(chart.clone());
        save_json(self.storage, &Self::key(dataset), &charts)?;
        Ok(chart)
    }

    pub fn remove(&self, dataset: &DatasetId, id: &RecordId) -> RepoResult<bool> {
        let mut charts = self.list(dataset)?;
        let before = charts.len();
        charts.retain(|c| &c.id != id);
        if charts.len() == before {
            return Ok(false);
        }
        save_json(self.storage, &Self::key(dataset), &charts)?;
        Ok(true)
    }

    pub fn clear(&self, dataset: &DatasetId) -> RepoResult<()> {
        self.storage.remove(&Self::key(dataset))
    }
}

pub struct CalculatedFieldRepository<'a> {
    storage: &'a dyn Storage,
}

impl<'a> CalculatedFieldRepository<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    fn key(dataset: &DatasetId) -> String {
        format!("calc_fields_{dataset}")
    }

    pub fn list(&self, dataset: &DatasetId) -> RepoResult<Vec<CalculatedField>> {
        load_list(self.storage, &Self::key(dataset))
    }

    pub fn add(&self, dataset: &DatasetId, field: CalculatedField) -> RepoResult<()> {
        let mut fields = self.list(dataset)?;
        fields.push(field);
        save_json(self.storage, &Self::key(dataset), &fields)
    }

    pub fn remove(&self, dataset: &DatasetId, id: &str) -> RepoResult<bool> {
        let mut fields = self.list(dataset)?;
        let before = fields.len();
        fields.retain(|f| f.id != id);
        if fields.len() == before {
            return Ok(false);
        }
        save_json(self.storage, &Self::key(dataset), &fields)?;
        Ok(true)
    }
}

/// Raw rows of uploaded datasets, keyed by dataset id.
pub struct DatasetStore<'a> {
    storage: &'a dyn Storage,
}

impl<'a> DatasetStore<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    fn key(dataset: &DatasetId) -> String {
        format!("dataset_{dataset}")
    }

    pub fn save(&self, dataset: &DatasetId, rows: &[RawRow]) -> RepoResult<()> {
        save_json(self.storage, &Self::key(dataset), rows)
    }

    pub fn load(&self, dataset: &DatasetId) -> RepoResult<Option<Vec<RawRow>>> {
        load_json(self.storage, &Self::key(dataset))
    }

    pub fn delete(&self, dataset: &DatasetId) -> RepoResult<()> {
        self.storage.remove(&Self::key(dataset))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentDataset {
    pub id: DatasetId,
    pub name: String,
    pub timestamp: i64,
}

/// The most recently opened datasets, newest first, at most five.
pub struct RecentDatasets<'a> {
    storage: &'a dyn Storage,
}

impl<'a> RecentDatasets<'a> {
    const KEY: &'static str = "recent_datasets";

    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    pub fn list(&self) -> RepoResult<Vec<RecentDataset>> {
        load_list(self.storage, Self::KEY)
    }

    /// Moves (or inserts) the dataset to the front and drops the overflow.
    pub fn touch(&self, id: &DatasetId, name: &str) -> RepoResult<Vec<RecentDataset>> {
        let mut entries = self.list()?;
        entries.retain(|entry| &entry.id != id);
        entries.insert(
            0,
            RecentDataset {
                id: id.clone(),
                name: name.to_string(),
                timestamp: now_millis(),
            },
        );
        entries.truncate(MAX_RECENT_DATASETS);
        save_json(self.storage, Self::KEY, &entries)?;
        Ok(entries)
    }

    pub fn clear(&self) -> RepoResult<()> {
        self.storage.remove(Self::KEY)
    }
}

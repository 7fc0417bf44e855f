#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use insightstream::{
    config::DashboardConfig,
    data::{RawRow, Value},
    io_utils::{LoadOptions, load_rows},
    projection::CanonicalRow,
    schema::Dataset,
};
use tempfile::{TempDir, tempdir};

pub const URBAN_SALES_CSV: &str = "urban_sales.csv";
pub const URBAN_SALES_JSON: &str = "urban_sales.json";
pub const URBAN_SALES_CONFIG: &str = "urban_sales.yml";
pub const GENERIC_BI_CSV: &str = "generic_bi.csv";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn fixture_rows(name: &str) -> Vec<RawRow> {
    load_rows(&fixture_path(name), &LoadOptions::default()).expect("load fixture rows")
}

pub fn fixture_dataset(name: &str) -> Dataset {
    Dataset::from_rows(name, fixture_rows(name))
}

/// The urban sales sample projected with its fixture config (profit derived from margin).
pub fn urban_sales_rows() -> Vec<CanonicalRow> {
    let dataset = fixture_dataset(URBAN_SALES_JSON);
    let config = DashboardConfig::load(&fixture_path(URBAN_SALES_CONFIG)).expect("load config");
    let mapping = config.resolve_mapping(&dataset.mapping);
    config.projector(mapping, &[]).project_all(&dataset.rows)
}

/// Builds a raw row of text cells.
pub fn text_row(cells: &[(&str, &str)]) -> RawRow {
    cells
        .iter()
        .map(|(column, value)| (column.to_string(), Value::text(*value)))
        .collect()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

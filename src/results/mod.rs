//! Metric records and their tabular persistence
//!
//! Every method reports the same leading columns (`method`, `protein`,
//! `ligand`, `affinity`) followed by its own extra columns. Tables are
//! written as CSV, one per method plus a combined table holding the outer
//! union of all columns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ids::ProteinId;
use crate::io::{self, IoError};

pub const METRICS_DIR: &str = "metrics";
pub const COMBINED_TABLE: &str = "metrics_all.csv";

/// Leading columns shared by every metrics table
pub const BASE_COLUMNS: [&str; 4] = ["method", "protein", "ligand", "affinity"];

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Metrics table {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },

    #[error(transparent)]
    Io(#[from] IoError),
}

/// A single cell of a metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Missing,
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, MetricValue::Missing)
    }

    /// Parse a CSV cell: empty and `nan` are missing, numbers are numbers
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
            return MetricValue::Missing;
        }
        match cell.parse::<f64>() {
            Ok(value) if value.is_nan() => MetricValue::Missing,
            Ok(value) => MetricValue::Number(value),
            Err(_) => MetricValue::Text(cell.to_string()),
        }
    }

    /// Cell text for CSV output
    pub fn to_cell(&self) -> String {
        match self {
            MetricValue::Number(value) => format_number(*value),
            MetricValue::Text(text) => text.clone(),
            MetricValue::Missing => String::new(),
        }
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(value) if !value.is_nan() => MetricValue::Number(value),
            _ => MetricValue::Missing,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Some(value).into()
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Integral values keep one decimal so columns read back as floats
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// One row of a metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub method: String,
    pub protein: ProteinId,
    pub ligand: String,
    pub affinity: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, MetricValue>,
}

impl MetricRecord {
    pub fn new(method: &str, protein: &ProteinId, ligand: &str) -> Self {
        Self {
            method: method.to_string(),
            protein: protein.clone(),
            ligand: ligand.to_string(),
            affinity: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_affinity(mut self, affinity: Option<f64>) -> Self {
        self.affinity = affinity.filter(|a| !a.is_nan());
        self
    }

    /// Add a method-specific column
    pub fn with(mut self, column: &str, value: impl Into<MetricValue>) -> Self {
        self.extra.insert(column.to_string(), value.into());
        self
    }

    /// Value of any column, including the leading ones
    pub fn get(&self, column: &str) -> MetricValue {
        match column {
            "method" => MetricValue::Text(self.method.clone()),
            "protein" => MetricValue::Text(self.protein.to_string()),
            "ligand" => MetricValue::Text(self.ligand.clone()),
            "affinity" => self.affinity.into(),
            other => self.extra.get(other).cloned().unwrap_or(MetricValue::Missing),
        }
    }

    /// Numeric value of a column, if present
    pub fn number(&self, column: &str) -> Option<f64> {
        match column {
            "affinity" => self.affinity,
            other => self.extra.get(other).and_then(MetricValue::as_f64),
        }
    }
}

/// Records grouped by method name, in method-name order
pub type MetricsByMethod = BTreeMap<String, Vec<MetricRecord>>;

/// Column order for a set of records: leading columns, then extras in
/// order of first appearance
pub fn table_columns<'a, I>(records: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a MetricRecord>,
{
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for record in records {
        for column in record.extra.keys() {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }
    columns
}

/// Columns whose values are all numeric or missing (the leading text columns never are)
pub fn numeric_columns(records: &[MetricRecord]) -> Vec<String> {
    table_columns(records)
        .into_iter()
        .filter(|column| !matches!(column.as_str(), "method" | "protein" | "ligand"))
        .filter(|column| {
            records
                .iter()
                .all(|record| !matches!(record.get(column), MetricValue::Text(_)))
        })
        .collect()
}

/// Write a header and rows as CSV, creating the parent directory
pub fn write_csv<P, I>(path: P, header: &[String], rows: I) -> Result<(), ResultsError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Vec<String>>,
{
    let path = path.as_ref();
    io::ensure_parent(path)?;
    let csv_error = |source| ResultsError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_writer(File::create(path).map_err(IoError::from)?);
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        writer.write_record(&row).map_err(csv_error)?;
    }
    writer.flush().map_err(|e| ResultsError::Io(IoError::from(e)))?;
    Ok(())
}

/// Write records as a metrics table
pub fn write_metrics_table<P: AsRef<Path>>(path: P, records: &[MetricRecord]) -> Result<(), ResultsError> {
    let columns = table_columns(records);
    let rows = records
        .iter()
        .map(|record| columns.iter().map(|c| record.get(c).to_cell()).collect());
    write_csv(path, &columns, rows)
}

/// Read a metrics table. `method` fills in rows without a method column.
pub fn read_metrics_table<P: AsRef<Path>>(path: P, method: &str) -> Result<Vec<MetricRecord>, ResultsError> {
    let path = path.as_ref();
    let csv_error = |source| ResultsError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let index = |name: &str| headers.iter().position(|h| h == name);
    let protein_index = index("protein").ok_or_else(|| ResultsError::MissingColumn {
        path: path.to_path_buf(),
        column: "protein".to_string(),
    })?;
    let ligand_index = index("ligand").ok_or_else(|| ResultsError::MissingColumn {
        path: path.to_path_buf(),
        column: "ligand".to_string(),
    })?;
    let method_index = index("method");

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        let cell = |i: usize| row.get(i).unwrap_or_default();

        let mut record = MetricRecord::new(
            method_index.map(cell).filter(|m| !m.is_empty()).unwrap_or(method),
            &ProteinId::new(cell(protein_index)),
            cell(ligand_index).trim(),
        );
        for (i, header) in headers.iter().enumerate() {
            match header.as_str() {
                "method" | "protein" | "ligand" => {}
                "affinity" => record.affinity = MetricValue::parse(cell(i)).as_f64(),
                other => {
                    record.extra.insert(other.to_string(), MetricValue::parse(cell(i)));
                }
            }
        }
        records.push(record);
    }

    Ok(records)
}

/// Load every `metrics_<method>.csv` in a directory (the combined table excluded)
pub fn load_metrics<P: AsRef<Path>>(metrics_dir: P) -> Result<MetricsByMethod, ResultsError> {
    let mut all = MetricsByMethod::new();
    for path in io::list_files_with_extension(metrics_dir, "csv") {
        let name = io::stem_of(&path);
        let Some(method) = name.strip_prefix("metrics_") else {
            continue;
        };
        if path.ends_with(COMBINED_TABLE) {
            continue;
        }
        let records = read_metrics_table(&path, method)?;
        log::info!("Loaded {} results for {}", records.len(), method);
        all.insert(method.to_string(), records);
    }
    Ok(all)
}

fn remove_stale(path: &Path) -> Result<(), ResultsError> {
    if path.exists() {
        log::info!("Removing stale metrics table {}", path.display());
        fs::remove_file(path).map_err(IoError::from)?;
    }
    Ok(())
}

/// Persists per-method metrics under `<output>/metrics`
#[derive(Debug)]
pub struct ResultsCollector {
    metrics_dir: PathBuf,
    collected: MetricsByMethod,
}

impl ResultsCollector {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            metrics_dir: output_dir.as_ref().join(METRICS_DIR),
            collected: MetricsByMethod::new(),
        }
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    pub fn table_path(&self, method: &str) -> PathBuf {
        self.metrics_dir.join(format!("metrics_{}.csv", method))
    }

    /// Store and write one method's records. An empty set writes nothing and
    /// removes the method's table from an earlier run.
    pub fn collect(&mut self, method: &str, records: Vec<MetricRecord>) -> Result<Option<PathBuf>, ResultsError> {
        if records.is_empty() {
            log::warn!("No metrics collected for {}", method);
            self.discard(method)?;
            return Ok(None);
        }
        let path = self.table_path(method);
        write_metrics_table(&path, &records)?;
        log::info!("Collected {} metrics for {}", records.len(), method);
        self.collected.insert(method.to_string(), records);
        Ok(Some(path))
    }

    /// Forget a method and delete any table it left on disk
    pub fn discard(&mut self, method: &str) -> Result<(), ResultsError> {
        self.collected.remove(method);
        remove_stale(&self.table_path(method))
    }

    pub fn all(&self) -> &MetricsByMethod {
        &self.collected
    }

    /// Write the combined table of every collected method. With nothing
    /// collected, a combined table from an earlier run is removed.
    pub fn combine_all(&self) -> Result<Option<PathBuf>, ResultsError> {
        let path = self.metrics_dir.join(COMBINED_TABLE);
        if self.collected.is_empty() {
            remove_stale(&path)?;
            return Ok(None);
        }
        let combined: Vec<MetricRecord> = self.collected.values().flatten().cloned().collect();
        write_metrics_table(&path, &combined)?;
        Ok(Some(path))
    }
}

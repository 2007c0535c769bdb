//! Descriptive statistics and cross-method comparison
//!
//! [`compare_methods`] turns per-method record sets into a comparison table
//! with one row per method (or per method and protein/ligand), holding the
//! record count and mean/std/min/max/median of each selected metric.
//! Missing values are left out of every statistic.

pub mod filters;

pub use filters::ComparisonFilters;

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::results::{self, format_number, numeric_columns, MetricRecord, MetricsByMethod, ResultsError};

/// Statistics reported per metric, in column order
pub const STATISTICS: [&str; 5] = ["mean", "std", "min", "max", "median"];

pub const PER_PROTEIN_TABLE: &str = "per_protein_comparison.csv";
pub const PER_LIGAND_TABLE: &str = "per_ligand_comparison.csv";

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("No methods remaining after filtering")]
    NoMethods,

    #[error("Unknown aggregation '{0}' (expected method, protein, ligand or all)")]
    UnknownAggregation(String),

    #[error(transparent)]
    Results(#[from] ResultsError),
}

/// Descriptive statistics of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub mean: f64,
    /// Sample standard deviation; `None` below two values
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl Summary {
    /// Summarise the non-NaN values; `None` when there are none
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let std = (n > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        });
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        Some(Self {
            mean,
            std,
            min: sorted[0],
            max: sorted[n - 1],
            median,
        })
    }

    /// Value of a named statistic
    pub fn get(&self, statistic: &str) -> Option<f64> {
        match statistic {
            "mean" => Some(self.mean),
            "std" => self.std,
            "min" => Some(self.min),
            "max" => Some(self.max),
            "median" => Some(self.median),
            _ => None,
        }
    }
}

/// Summaries of every numeric column of a record set
pub fn calculate(records: &[MetricRecord]) -> BTreeMap<String, Option<Summary>> {
    numeric_columns(records)
        .into_iter()
        .map(|column| {
            let values: Vec<f64> = records.iter().filter_map(|r| r.number(&column)).collect();
            (column, Summary::from_values(&values))
        })
        .collect()
}

/// Grouping of the primary comparison table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateBy {
    #[default]
    Method,
    Protein,
    Ligand,
    All,
}

impl FromStr for AggregateBy {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "method" => Ok(AggregateBy::Method),
            "protein" => Ok(AggregateBy::Protein),
            "ligand" => Ok(AggregateBy::Ligand),
            "all" => Ok(AggregateBy::All),
            other => Err(StatsError::UnknownAggregation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Options for [`compare_methods`]
#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Metrics to compare; all numeric columns when `None`
    pub metrics: Option<Vec<String>>,
    pub exclude_metrics: Vec<String>,
    pub aggregate_by: AggregateBy,
    pub include_per_protein: bool,
    pub include_per_ligand: bool,
}

/// One row of a comparison table
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    /// Values of the key columns (method, then protein or ligand when grouped)
    pub keys: Vec<String>,
    pub count: usize,
    /// Statistic columns such as `mean_affinity`
    pub values: BTreeMap<String, Option<f64>>,
}

/// A comparison table with stable column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComparisonTable {
    pub key_columns: Vec<String>,
    pub metrics: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortKey {
    Number(f64),
    Text(String),
}

impl ComparisonTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Statistic column names, metric-major
    pub fn stat_columns(&self) -> Vec<String> {
        self.metrics
            .iter()
            .flat_map(|metric| STATISTICS.iter().map(move |stat| format!("{}_{}", stat, metric)))
            .collect()
    }

    /// All columns: keys, `count`, statistics
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.key_columns.clone();
        columns.push("count".to_string());
        columns.extend(self.stat_columns());
        columns
    }

    /// Row for a key column value (e.g. a method name)
    pub fn row(&self, key: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|row| row.keys.first().map(String::as_str) == Some(key))
    }

    /// Value of a statistic column in the row of `key`
    pub fn value(&self, key: &str, column: &str) -> Option<f64> {
        self.row(key).and_then(|row| row.values.get(column).copied().flatten())
    }

    fn sort_key(&self, row: &ComparisonRow, column: &str) -> Option<SortKey> {
        if column == "count" {
            return Some(SortKey::Number(row.count as f64));
        }
        if let Some(i) = self.key_columns.iter().position(|c| c == column) {
            return row.keys.get(i).cloned().map(SortKey::Text);
        }
        row.values.get(column).copied().flatten().map(SortKey::Number)
    }

    /// Sort rows by a column; missing values sort last either way.
    /// Unknown columns leave the table unchanged and return `false`.
    pub fn sort_by(&mut self, column: &str, order: SortOrder) -> bool {
        if !self.columns().iter().any(|c| c == column) {
            return false;
        }
        let mut keyed: Vec<(Option<SortKey>, ComparisonRow)> = self
            .rows
            .drain(..)
            .map(|row| (None, row))
            .collect();
        for (key, row) in keyed.iter_mut() {
            *key = self.sort_key(row, column);
        }
        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => {
                let ordering = a.partial_cmp(b).unwrap_or(Ordering::Equal);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        true
    }

    /// Keep the first `n` rows
    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }

    fn cells(&self, row: &ComparisonRow) -> Vec<String> {
        let mut cells = row.keys.clone();
        cells.push(row.count.to_string());
        for column in self.stat_columns() {
            cells.push(
                row.values
                    .get(&column)
                    .copied()
                    .flatten()
                    .map(format_number)
                    .unwrap_or_default(),
            );
        }
        cells
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), ResultsError> {
        let rows: Vec<Vec<String>> = self.rows.iter().map(|row| self.cells(row)).collect();
        results::write_csv(path, &self.columns(), rows)
    }

    /// Rows as JSON objects (missing statistics are `null`)
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for (column, key) in self.key_columns.iter().zip(&row.keys) {
                    object.insert(column.clone(), serde_json::Value::from(key.as_str()));
                }
                object.insert("count".to_string(), serde_json::Value::from(row.count));
                for column in self.stat_columns() {
                    let value = row.values.get(&column).copied().flatten();
                    object.insert(column, value.map_or(serde_json::Value::Null, serde_json::Value::from));
                }
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

/// Plain-text rendering for the terminal
impl fmt::Display for ComparisonTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self.columns();
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                self.cells(row)
                    .into_iter()
                    .map(|cell| match cell.parse::<f64>() {
                        Ok(value) if cell.contains('.') => format!("{:.3}", value),
                        _ if cell.is_empty() => "NaN".to_string(),
                        _ => cell,
                    })
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                rows.iter()
                    .map(|row| row[i].len())
                    .chain(std::iter::once(column.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:>width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("  ")
        };

        writeln!(f, "{}", line(&columns))?;
        for row in &rows {
            writeln!(f, "{}", line(row))?;
        }
        Ok(())
    }
}

/// Metrics to compare: requested ∩ numeric columns of the reference method,
/// minus exclusions, falling back to `affinity`
pub fn select_metrics(reference: &[MetricRecord], options: &CompareOptions) -> Vec<String> {
    let numeric = numeric_columns(reference);
    let mut selected: Vec<String> = match &options.metrics {
        Some(requested) if !requested.is_empty() => requested
            .iter()
            .filter(|metric| numeric.contains(metric))
            .cloned()
            .collect(),
        _ => numeric.clone(),
    };
    selected.retain(|metric| !options.exclude_metrics.contains(metric));

    if selected.is_empty() && numeric.iter().any(|m| m == "affinity") {
        selected.push("affinity".to_string());
    }
    selected
}

fn summarise(keys: Vec<String>, records: &[&MetricRecord], metrics: &[String]) -> ComparisonRow {
    let mut values = BTreeMap::new();
    for metric in metrics {
        let numbers: Vec<f64> = records.iter().filter_map(|r| r.number(metric)).collect();
        let summary = Summary::from_values(&numbers);
        for stat in STATISTICS {
            values.insert(
                format!("{}_{}", stat, metric),
                summary.and_then(|s| s.get(stat)),
            );
        }
    }
    ComparisonRow {
        keys,
        count: records.len(),
        values,
    }
}

/// Rows keyed by (method, group), groups in order of first appearance
fn grouped_table<F>(all: &MetricsByMethod, metrics: &[String], group: &str, key: F) -> ComparisonTable
where
    F: Fn(&MetricRecord) -> String,
{
    let mut rows = Vec::new();
    for (method, records) in all {
        let mut groups: Vec<(String, Vec<&MetricRecord>)> = Vec::new();
        for record in records {
            let value = key(record);
            match groups.iter_mut().find(|(g, _)| *g == value) {
                Some((_, members)) => members.push(record),
                None => groups.push((value, vec![record])),
            }
        }
        for (value, members) in groups {
            rows.push(summarise(vec![method.clone(), value], &members, metrics));
        }
    }
    ComparisonTable {
        key_columns: vec!["method".to_string(), group.to_string()],
        metrics: metrics.to_vec(),
        rows,
    }
}

/// Compare methods without writing side tables
pub fn compare_methods(all: &MetricsByMethod, options: &CompareOptions) -> ComparisonTable {
    StatisticsCalculator::default().compare(all, options).0
}

/// Comparison engine; with an output directory, requested per-protein and
/// per-ligand side tables are written to `<output>/reports`
#[derive(Debug, Clone, Default)]
pub struct StatisticsCalculator {
    output_dir: Option<PathBuf>,
}

/// Side tables produced alongside a comparison
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideTables {
    pub per_protein: Option<ComparisonTable>,
    pub per_ligand: Option<ComparisonTable>,
}

impl StatisticsCalculator {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: Some(output_dir.as_ref().to_path_buf()),
        }
    }

    /// Compare methods and persist requested side tables
    pub fn compare_methods(
        &self,
        all: &MetricsByMethod,
        options: &CompareOptions,
    ) -> Result<ComparisonTable, StatsError> {
        let (table, side) = self.compare(all, options);
        if let Some(dir) = &self.output_dir {
            let reports = dir.join("reports");
            if let Some(per_protein) = side.per_protein.filter(|t| !t.is_empty()) {
                per_protein.write_csv(reports.join(PER_PROTEIN_TABLE))?;
            }
            if let Some(per_ligand) = side.per_ligand.filter(|t| !t.is_empty()) {
                per_ligand.write_csv(reports.join(PER_LIGAND_TABLE))?;
            }
        }
        Ok(table)
    }

    /// Pure comparison: primary table plus requested side tables
    pub fn compare(&self, all: &MetricsByMethod, options: &CompareOptions) -> (ComparisonTable, SideTables) {
        // Methods without records take no part at all
        let present: MetricsByMethod = all
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(method, records)| (method.clone(), records.clone()))
            .collect();

        let Some(reference) = present.values().next() else {
            return (ComparisonTable::default(), SideTables::default());
        };
        let metrics = select_metrics(reference, options);
        if metrics.is_empty() {
            return (ComparisonTable::default(), SideTables::default());
        }

        let table = match options.aggregate_by {
            AggregateBy::Method => ComparisonTable {
                key_columns: vec!["method".to_string()],
                metrics: metrics.clone(),
                rows: present
                    .iter()
                    .map(|(method, records)| {
                        let members: Vec<&MetricRecord> = records.iter().collect();
                        summarise(vec![method.clone()], &members, &metrics)
                    })
                    .collect(),
            },
            AggregateBy::Protein => grouped_table(&present, &metrics, "protein", |r| r.protein.to_string()),
            AggregateBy::Ligand => grouped_table(&present, &metrics, "ligand", |r| r.ligand.clone()),
            AggregateBy::All => {
                let members: Vec<&MetricRecord> = present.values().flatten().collect();
                ComparisonTable {
                    key_columns: vec!["method".to_string()],
                    metrics: metrics.clone(),
                    rows: vec![summarise(vec!["all".to_string()], &members, &metrics)],
                }
            }
        };

        let side = SideTables {
            per_protein: options
                .include_per_protein
                .then(|| grouped_table(&present, &metrics, "protein", |r| r.protein.to_string())),
            per_ligand: options
                .include_per_ligand
                .then(|| grouped_table(&present, &metrics, "ligand", |r| r.ligand.clone())),
        };

        log::debug!("Compared {} methods over {:?}", present.len(), metrics);
        (table, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProteinId;
    use assert_approx_eq::assert_approx_eq;
    use tempfile::tempdir;

    fn record(method: &str, protein: &str, ligand: &str, affinity: Option<f64>) -> MetricRecord {
        MetricRecord::new(method, &ProteinId::new(protein), ligand).with_affinity(affinity)
    }

    fn sample() -> MetricsByMethod {
        let mut all = MetricsByMethod::new();
        all.insert(
            "qvina".to_string(),
            vec![
                record("qvina", "1ere", "a", Some(-5.0)),
                record("qvina", "1ere", "b", Some(-7.0)),
                record("qvina", "8zyq", "a", None),
            ],
        );
        all.insert(
            "vina".to_string(),
            vec![record("vina", "1ere", "a", Some(-8.0)).with("clash_score", 1.0)],
        );
        all.insert("boltz2".to_string(), Vec::new());
        all
    }

    #[test]
    fn test_summary() {
        let summary = Summary::from_values(&[-5.0, -7.0]).unwrap();
        assert_approx_eq!(summary.mean, -6.0);
        assert_approx_eq!(summary.std.unwrap(), 2f64.sqrt());
        assert_approx_eq!(summary.median, -6.0);
        assert_eq!(summary.min, -7.0);
        assert!(Summary::from_values(&[1.0]).unwrap().std.is_none());
        assert!(Summary::from_values(&[]).is_none());
        assert_eq!(Summary::from_values(&[3.0, 1.0, 2.0]).unwrap().median, 2.0);
    }

    #[test]
    fn test_compare_by_method_excludes_nulls_and_empty_methods() {
        let table = compare_methods(&sample(), &CompareOptions::default());
        assert_eq!(table.len(), 2);
        assert!(table.row("boltz2").is_none());

        let qvina = table.row("qvina").unwrap();
        assert_eq!(qvina.count, 3);
        assert_approx_eq!(table.value("qvina", "mean_affinity").unwrap(), -6.0);
        assert_approx_eq!(table.value("qvina", "median_affinity").unwrap(), -6.0);
        assert_eq!(table.value("qvina", "max_affinity"), Some(-5.0));
        assert_eq!(table.value("vina", "std_affinity"), None);
        // Metrics come from the reference (first) method only
        assert_eq!(table.metrics, vec!["affinity"]);
    }

    #[test]
    fn test_metric_selection() {
        let records = vec![record("m", "p", "l", Some(1.0)).with("rmsd", 2.0).with("note", "x".to_string())];
        let options = CompareOptions {
            metrics: Some(vec!["rmsd".to_string(), "missing".to_string(), "note".to_string()]),
            ..Default::default()
        };
        assert_eq!(select_metrics(&records, &options), vec!["rmsd"]);

        let options = CompareOptions {
            exclude_metrics: vec!["affinity".to_string(), "rmsd".to_string()],
            ..Default::default()
        };
        assert_eq!(select_metrics(&records, &options), vec!["affinity"]);
    }

    #[test]
    fn test_aggregations() {
        let all = sample();
        let by_protein = compare_methods(
            &all,
            &CompareOptions {
                aggregate_by: AggregateBy::Protein,
                ..Default::default()
            },
        );
        assert_eq!(by_protein.key_columns, vec!["method", "protein"]);
        assert_eq!(by_protein.len(), 3);
        assert_eq!(by_protein.rows[1].keys, vec!["qvina", "8zyq"]);
        assert_eq!(by_protein.rows[1].values["mean_affinity"], None);

        let pooled = compare_methods(
            &all,
            &CompareOptions {
                aggregate_by: AggregateBy::All,
                ..Default::default()
            },
        );
        assert_eq!(pooled.len(), 1);
        assert_eq!(pooled.rows[0].count, 4);
        assert_approx_eq!(pooled.value("all", "mean_affinity").unwrap(), -20.0 / 3.0);
        assert!("bogus".parse::<AggregateBy>().is_err());
    }

    #[test]
    fn test_side_tables_written() {
        let dir = tempdir().unwrap();
        let calculator = StatisticsCalculator::new(dir.path());
        let options = CompareOptions {
            include_per_protein: true,
            include_per_ligand: true,
            ..Default::default()
        };
        let table = calculator.compare_methods(&sample(), &options).unwrap();
        assert_eq!(table.key_columns, vec!["method"]);
        assert!(dir.path().join("reports").join(PER_PROTEIN_TABLE).is_file());
        assert!(dir.path().join("reports").join(PER_LIGAND_TABLE).is_file());
    }

    #[test]
    fn test_sort_and_truncate() {
        let mut table = compare_methods(&sample(), &CompareOptions::default());
        assert!(table.sort_by("mean_affinity", SortOrder::Asc));
        assert_eq!(table.rows[0].keys[0], "vina");
        assert!(table.sort_by("mean_affinity", SortOrder::Desc));
        assert_eq!(table.rows[0].keys[0], "qvina");
        assert!(!table.sort_by("nope", SortOrder::Asc));
        table.truncate(1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.to_json()[0]["method"], "qvina");
    }
}

//! Benchmark reports under `<output>/reports`

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::io;
use crate::results::MetricsByMethod;
use crate::stats::{self, CompareOptions, StatisticsCalculator, StatsError, Summary};

pub const REPORT_FILE: &str = "report.json";
pub const COMPARISON_FILE: &str = "method_comparison.csv";

/// Per-method section of `report.json`
#[derive(Debug, Clone, Serialize)]
pub struct MethodReport {
    pub count: usize,
    pub statistics: BTreeMap<String, Option<Summary>>,
}

/// Writes the JSON report and the default method comparison
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }

    /// Per-method counts and column statistics
    pub fn build(all: &MetricsByMethod) -> BTreeMap<String, MethodReport> {
        all.iter()
            .map(|(method, records)| {
                (
                    method.clone(),
                    MethodReport {
                        count: records.len(),
                        statistics: stats::calculate(records),
                    },
                )
            })
            .collect()
    }

    /// Write `report.json` and `method_comparison.csv`
    pub fn generate(&self, all: &MetricsByMethod) -> Result<PathBuf, StatsError> {
        let reports = self.reports_dir();
        let report_path = reports.join(REPORT_FILE);
        io::write_json(&report_path, &Self::build(all)).map_err(crate::results::ResultsError::from)?;

        let comparison =
            StatisticsCalculator::new(&self.output_dir).compare_methods(all, &CompareOptions::default())?;
        comparison.write_csv(reports.join(COMPARISON_FILE))?;

        log::info!("Report written to {}", report_path.display());
        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProteinId;
    use crate::results::MetricRecord;
    use tempfile::tempdir;

    #[test]
    fn test_generate_report() {
        let dir = tempdir().unwrap();
        let mut all = MetricsByMethod::new();
        all.insert(
            "qvina".to_string(),
            vec![
                MetricRecord::new("qvina", &ProteinId::new("1ere"), "a").with_affinity(Some(-5.0)),
                MetricRecord::new("qvina", &ProteinId::new("1ere"), "b").with_affinity(Some(-7.0)),
                MetricRecord::new("qvina", &ProteinId::new("1ere"), "c"),
            ],
        );

        let path = ReportGenerator::new(dir.path()).generate(&all).unwrap();
        let report: serde_json::Value = io::read_json(&path).unwrap();
        assert_eq!(report["qvina"]["count"], 3);
        assert_eq!(report["qvina"]["statistics"]["affinity"]["mean"], -6.0);
        assert!(dir.path().join("reports").join(COMPARISON_FILE).is_file());
    }
}

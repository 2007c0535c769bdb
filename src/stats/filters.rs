//! Post-filters applied to loaded metrics before comparison

use super::StatsError;
use crate::ids::canonical;
use crate::results::{numeric_columns, MetricRecord, MetricsByMethod};

/// Filters in application order: method selection, protein/ligand selection,
/// null rows, minimum count
#[derive(Debug, Clone, Default)]
pub struct ComparisonFilters {
    pub methods: Option<Vec<String>>,
    pub exclude_methods: Vec<String>,
    pub proteins: Option<Vec<String>>,
    pub ligands: Option<Vec<String>>,
    /// Drop records with a missing value in `null_metrics` (or in any numeric column)
    pub filter_null: bool,
    pub null_metrics: Option<Vec<String>>,
    pub min_count: Option<usize>,
}

fn contains_ignore_case(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

impl ComparisonFilters {
    /// Apply every filter. Removing all methods is an error.
    pub fn apply(&self, mut all: MetricsByMethod) -> Result<MetricsByMethod, StatsError> {
        if let Some(methods) = &self.methods {
            all.retain(|method, _| contains_ignore_case(methods, method));
        }
        all.retain(|method, _| !contains_ignore_case(&self.exclude_methods, method));
        if all.is_empty() {
            return Err(StatsError::NoMethods);
        }

        if let Some(proteins) = &self.proteins {
            let wanted: Vec<String> = proteins.iter().map(|p| canonical(p)).collect();
            for records in all.values_mut() {
                records.retain(|r| wanted.iter().any(|p| p == r.protein.as_str()));
            }
        }
        if let Some(ligands) = &self.ligands {
            for records in all.values_mut() {
                records.retain(|r| ligands.contains(&r.ligand));
            }
        }

        if self.filter_null {
            for (method, records) in all.iter_mut() {
                let columns: Vec<String> = match &self.null_metrics {
                    Some(metrics) => {
                        let numeric = numeric_columns(records);
                        metrics.iter().filter(|m| numeric.contains(m)).cloned().collect()
                    }
                    None => numeric_columns(records),
                };
                records.retain(|r| columns.iter().all(|c| r.number(c).is_some()));
                if records.is_empty() {
                    log::warn!("{} has no valid results after filtering", method);
                }
            }
            all.retain(|_, records: &mut Vec<MetricRecord>| !records.is_empty());
        }

        if let Some(min_count) = self.min_count {
            all.retain(|method, records| {
                let keep = records.len() >= min_count;
                if !keep {
                    log::warn!("{} has fewer than {} results, excluded", method, min_count);
                }
                keep
            });
        }

        if all.is_empty() {
            return Err(StatsError::NoMethods);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProteinId;

    fn records(method: &str, n: usize) -> Vec<MetricRecord> {
        (0..n)
            .map(|i| {
                MetricRecord::new(method, &ProteinId::new(if i % 2 == 0 { "1ERE" } else { "8zyq" }), &format!("l{}", i))
                    .with_affinity(if i == 0 { None } else { Some(-(i as f64)) })
            })
            .collect()
    }

    fn sample() -> MetricsByMethod {
        let mut all = MetricsByMethod::new();
        all.insert("small".to_string(), records("small", 1));
        all.insert("pair".to_string(), records("pair", 2));
        all.insert("five".to_string(), records("five", 5));
        all
    }

    #[test]
    fn test_min_count() {
        let filters = ComparisonFilters {
            min_count: Some(2),
            ..Default::default()
        };
        let kept = filters.apply(sample()).unwrap();
        assert_eq!(kept.keys().map(String::as_str).collect::<Vec<_>>(), vec!["five", "pair"]);
    }

    #[test]
    fn test_filter_null_drops_empty_methods() {
        let filters = ComparisonFilters {
            filter_null: true,
            ..Default::default()
        };
        let kept = filters.apply(sample()).unwrap();
        assert!(!kept.contains_key("small"));
        assert_eq!(kept["pair"].len(), 1);
        assert_eq!(kept["five"].len(), 4);
    }

    #[test]
    fn test_method_and_protein_filters() {
        let filters = ComparisonFilters {
            methods: Some(vec!["FIVE".to_string(), "pair".to_string()]),
            exclude_methods: vec!["pair".to_string()],
            proteins: Some(vec!["1ere".to_string()]),
            ..Default::default()
        };
        let kept = filters.apply(sample()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept["five"].len(), 3);

        let filters = ComparisonFilters {
            methods: Some(vec!["unknown".to_string()]),
            ..Default::default()
        };
        assert!(matches!(filters.apply(sample()), Err(StatsError::NoMethods)));
    }
}

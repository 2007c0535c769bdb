//! Boltz-2 affinity predictions

use serde::Deserialize;
use std::path::Path;

use crate::io::{self, IoError};

/// Fields read from `affinity_<ligand>.json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct BoltzAffinity {
    #[serde(rename = "affinity_pred_value")]
    pub affinity: Option<f64>,

    #[serde(rename = "affinity_probability_binary")]
    pub binding_probability: Option<f64>,
}

impl BoltzAffinity {
    pub fn is_empty(&self) -> bool {
        self.affinity.is_none() && self.binding_probability.is_none()
    }
}

/// Read a Boltz-2 affinity file; `None` when it carries neither value
pub fn read_boltz_affinity<P: AsRef<Path>>(path: P) -> Result<Option<BoltzAffinity>, IoError> {
    let affinity: BoltzAffinity = io::read_json(path)?;
    Ok(if affinity.is_empty() { None } else { Some(affinity) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_affinity_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("affinity_mol1.json");
        fs::write(
            &path,
            r#"{"affinity_pred_value": -1.25, "affinity_probability_binary": 0.8, "affinity_pred_value1": 0.1}"#,
        )
        .unwrap();
        let affinity = read_boltz_affinity(&path).unwrap().unwrap();
        assert_eq!(affinity.affinity, Some(-1.25));
        assert_eq!(affinity.binding_probability, Some(0.8));

        fs::write(&path, "{}").unwrap();
        assert!(read_boltz_affinity(&path).unwrap().is_none());
    }
}

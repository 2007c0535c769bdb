//! Provenance of prepared artifacts
//!
//! Box computation and structure preparation each have several strategies
//! that fall back to one another. Which one produced an artifact is recorded
//! in a sidecar JSON file next to the artifacts, keyed by artifact path, so
//! the artifacts themselves keep their plain formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::io::{self, IoError};

/// What kind of artifact an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    CleanedReceptor,
    Receptor,
    ReferenceLigand,
    LigandSdf,
    LigandPdbqt,
    Box,
}

/// One provenance record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub kind: ArtifactKind,

    /// Strategy or toolchain that produced the artifact (`meeko`, `obabel`, `labox`, ...)
    pub strategy: String,

    /// Input the artifact was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

/// Sidecar log of artifact provenance
#[derive(Debug, Clone)]
pub struct ProvenanceLog {
    path: PathBuf,
    entries: BTreeMap<String, ProvenanceEntry>,
}

impl ProvenanceLog {
    /// Start a log that will be written to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the strategy that produced `artifact`
    pub fn record(&mut self, artifact: &Path, kind: ArtifactKind, strategy: &str, source: Option<&Path>) {
        self.entries.insert(
            artifact.display().to_string(),
            ProvenanceEntry {
                kind,
                strategy: strategy.to_string(),
                source: source.map(|s| s.display().to_string()),
                recorded_at: Utc::now(),
            },
        );
    }

    /// Entry recorded in this session for an artifact
    pub fn get(&self, artifact: &Path) -> Option<&ProvenanceEntry> {
        self.entries.get(&artifact.display().to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a persisted log. An unreadable file is treated as empty.
    pub fn load_entries(path: &Path) -> BTreeMap<String, ProvenanceEntry> {
        if !path.exists() {
            return BTreeMap::new();
        }
        match io::read_json(path) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Ignoring unreadable provenance log {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    /// Merge this session's entries into the persisted log.
    ///
    /// Artifacts regenerated in this session replace their previous entry.
    pub fn save(&self) -> Result<(), IoError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let mut merged = Self::load_entries(&self.path);
        merged.extend(self.entries.clone());
        io::write_json(&self.path, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_merges_with_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut first = ProvenanceLog::new(&path);
        first.record(Path::new("a.pdbqt"), ArtifactKind::Receptor, "meeko", None);
        first.record(Path::new("b.pdbqt"), ArtifactKind::Receptor, "meeko", None);
        first.save().unwrap();

        let mut second = ProvenanceLog::new(&path);
        second.record(Path::new("b.pdbqt"), ArtifactKind::Receptor, "obabel", Some(Path::new("b.pdb")));
        second.save().unwrap();

        let entries = ProvenanceLog::load_entries(&path);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a.pdbqt"].strategy, "meeko");
        assert_eq!(entries["b.pdbqt"].strategy, "obabel");
        assert_eq!(entries["b.pdbqt"].source.as_deref(), Some("b.pdb"));
    }

    #[test]
    fn test_empty_log_writes_nothing() {
        let dir = tempdir().unwrap();
        let log = ProvenanceLog::new(dir.path().join("none.json"));
        log.save().unwrap();
        assert!(!log.path().exists());
    }
}

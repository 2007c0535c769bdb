//! Persistent log of per-pair docking failures
//!
//! Failures are collected in memory during a run and merged into
//! `<output>/docking_errors.json` on [`ErrorLogger::save`]. The file is keyed
//! by (protein, ligand): the first record written for a pair is kept across
//! runs and later records for the same pair are dropped.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::exec::ExecError;
use crate::io::{self, IoError};

pub const ERROR_LOG_FILE: &str = "docking_errors.json";

/// Lines kept from the end of a tool's log file
const SNIPPET_LINES: usize = 10;

/// Failure taxonomy for a single docking pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Timeout,
    ParseError,
    NoAtoms,
    SubprocessError,
    UnknownError,
}

impl ErrorType {
    /// Classify a failed tool invocation from its error and diagnostic output
    pub fn classify(error: &ExecError) -> Self {
        match error {
            ExecError::Timeout { .. } => ErrorType::Timeout,
            ExecError::Failed { .. } => {
                let message = error.message();
                if message.contains("Parse error") || message.contains("Unknown or inappropriate tag") {
                    ErrorType::ParseError
                } else if message.contains("No atoms") {
                    ErrorType::NoAtoms
                } else {
                    ErrorType::SubprocessError
                }
            }
            _ => ErrorType::UnknownError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Timeout => "timeout",
            ErrorType::ParseError => "parse_error",
            ErrorType::NoAtoms => "no_atoms",
            ErrorType::SubprocessError => "subprocess_error",
            ErrorType::UnknownError => "unknown_error",
        }
    }
}

/// One failed pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub protein: String,
    pub ligand: String,
    pub smiles: Option<String>,
    pub error_type: ErrorType,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_snippet: Option<String>,
    pub timestamp: DateTime<Local>,
}

/// Last lines of a log file; unreadable files yield `None`
fn log_snippet(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let lines: Vec<&str> = content.trim().lines().collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(SNIPPET_LINES);
    Some(lines[start..].join("\n"))
}

/// Collects failures for one output directory
#[derive(Debug)]
pub struct ErrorLogger {
    path: PathBuf,
    records: Vec<ErrorRecord>,
}

impl ErrorLogger {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            path: output_dir.as_ref().join(ERROR_LOG_FILE),
            records: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a failure, attaching the tail of `log_file` when it is readable
    pub fn log_error(
        &mut self,
        protein: &str,
        ligand: &str,
        smiles: Option<String>,
        error_type: ErrorType,
        error_message: &str,
        log_file: Option<&Path>,
    ) {
        log::warn!("Logged error for {}/{}: {}", protein, ligand, error_type.as_str());
        self.records.push(ErrorRecord {
            protein: protein.to_string(),
            ligand: ligand.to_string(),
            smiles,
            error_type,
            error_message: error_message.to_string(),
            log_snippet: log_file.and_then(log_snippet),
            timestamp: Local::now(),
        });
    }

    /// Records logged in this session
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge this session's records into the persisted log (first write wins).
    ///
    /// Persisted entries are carried over verbatim, so records written by
    /// other tools survive. An unreadable log is replaced.
    pub fn save(&self) -> Result<PathBuf, IoError> {
        let mut merged: Vec<serde_json::Value> = if self.path.exists() {
            io::read_json(&self.path).unwrap_or_else(|e| {
                log::warn!("Replacing unreadable error log {}: {}", self.path.display(), e);
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let key = |value: &serde_json::Value| {
            (
                value.get("protein").and_then(|v| v.as_str()).map(str::to_string),
                value.get("ligand").and_then(|v| v.as_str()).map(str::to_string),
            )
        };
        let mut seen: HashSet<_> = merged.iter().map(key).collect();

        for record in &self.records {
            let value = serde_json::to_value(record).map_err(|source| IoError::Json {
                path: self.path.clone(),
                source,
            })?;
            if seen.insert(key(&value)) {
                merged.push(value);
            }
        }

        io::write_json(&self.path, &merged)?;
        Ok(self.path.clone())
    }
}

/// Read a persisted error log
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<ErrorRecord>, IoError> {
    io::read_json(path)
}

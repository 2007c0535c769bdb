//! Ligand tables
//!
//! Ligand datasets are delimited text files with one molecule per row. The
//! separator and column names vary between sources, so the header line is
//! sniffed with [`detect_schema`] before the table is read.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::io;

/// Header names accepted for the SMILES column (compared case-insensitively)
pub const SMILES_HEADERS: [&str; 6] = [
    "smiles",
    "smile",
    "canonical_smiles",
    "canonical_smile",
    "canonicalsmiles",
    "canonicalsmile",
];

/// Header names accepted for the identifier column (compared case-insensitively)
pub const ID_HEADERS: [&str; 4] = ["ligand_id", "id", "ligand", "name"];

#[derive(Error, Debug)]
pub enum LigandError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Table could not be split into columns with any separator")]
    Unparseable,

    #[error("No SMILES column found. Available columns: {0:?}")]
    NoSmilesColumn(Vec<String>),

    #[error("No ligands in {0}")]
    Empty(PathBuf),
}

/// Layout of a ligand table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub separator: u8,
    pub smiles_column: String,
    pub id_column: Option<String>,
}

/// One ligand from a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LigandRecord {
    pub ligand_id: String,
    pub smiles: String,
}

/// Preferred separator from the counts on the header line
fn sniff_separator(header: &str) -> u8 {
    let commas = header.matches(',').count();
    let semicolons = header.matches(';').count();
    let tabs = header.matches('\t').count();

    if semicolons > 0 && semicolons >= commas {
        b';'
    } else if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

fn split_header(header: &str, separator: u8) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(false)
        .flexible(true)
        .from_reader(header.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(|field| field.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

fn find_column(columns: &[String], candidates: &[&str]) -> Option<String> {
    columns
        .iter()
        .find(|column| {
            let lower = column.to_lowercase();
            candidates.contains(&lower.as_str())
        })
        .cloned()
}

/// Detect separator and key columns from the start of a table.
///
/// The sniffed separator is tried first, then `;`, `,` and tab; the first one
/// that splits the header into more than one column wins.
pub fn detect_schema(sample: &str) -> Result<Schema, LigandError> {
    let header = sample
        .lines()
        .next()
        .map(|line| line.trim_start_matches('\u{feff}'))
        .unwrap_or_default();

    let preferred = sniff_separator(header);
    let mut candidates = vec![preferred];
    for separator in [b';', b',', b'\t'] {
        if !candidates.contains(&separator) {
            candidates.push(separator);
        }
    }

    let (separator, columns) = candidates
        .into_iter()
        .map(|separator| (separator, split_header(header, separator)))
        .find(|(_, columns)| columns.len() > 1)
        .ok_or(LigandError::Unparseable)?;

    let smiles_column = find_column(&columns, &SMILES_HEADERS)
        .ok_or_else(|| LigandError::NoSmilesColumn(columns.clone()))?;
    let id_column = find_column(&columns, &ID_HEADERS);

    Ok(Schema {
        separator,
        smiles_column,
        id_column,
    })
}

fn is_valid_smiles(smiles: &str) -> bool {
    !smiles.is_empty() && !smiles.eq_ignore_ascii_case("nan")
}

/// Parse a ligand table from text. Rows with a missing, empty or `nan` SMILES
/// are dropped; rows without an id column get `ligand_<row>`.
pub fn parse_ligand_table(text: &str, path: &Path) -> Result<Vec<LigandRecord>, LigandError> {
    let text = text.trim_start_matches('\u{feff}');
    let schema = detect_schema(text)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(schema.separator)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| LigandError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let smiles_index = headers
        .iter()
        .position(|h| *h == schema.smiles_column)
        .ok_or_else(|| LigandError::NoSmilesColumn(headers.clone()))?;
    let id_index = schema
        .id_column
        .as_ref()
        .and_then(|id| headers.iter().position(|h| h == id));

    let mut ligands = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Skipping malformed row {} in {}: {}", row, path.display(), e);
                continue;
            }
        };

        let smiles = record.get(smiles_index).unwrap_or_default().trim();
        if !is_valid_smiles(smiles) {
            continue;
        }

        let ligand_id = match id_index.and_then(|i| record.get(i)) {
            Some(id) => id.trim().to_string(),
            None => format!("ligand_{}", row),
        };

        ligands.push(LigandRecord {
            ligand_id,
            smiles: smiles.to_string(),
        });
    }

    Ok(ligands)
}

/// Load a ligand table from disk
pub fn load_ligand_table<P: AsRef<Path>>(path: P) -> Result<Vec<LigandRecord>, LigandError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LigandError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let ligands = parse_ligand_table(&text, path)?;
    if ligands.is_empty() {
        return Err(LigandError::Empty(path.to_path_buf()));
    }

    log::info!("Loaded {} ligands from {}", ligands.len(), path.display());
    Ok(ligands)
}

/// Best-effort SMILES lookup for a ligand id across every table in a directory.
///
/// Tries the id column, then a `ligand_<n>` row index, then a literal SMILES
/// match. Unreadable tables are skipped.
pub fn find_smiles<P: AsRef<Path>>(ligand_dir: P, ligand_id: &str) -> Option<String> {
    let index = ligand_id
        .strip_prefix("ligand_")
        .unwrap_or(ligand_id)
        .parse::<usize>()
        .ok();

    for table in io::list_files_with_extension(ligand_dir.as_ref(), "csv") {
        let ligands = match load_ligand_table(&table) {
            Ok(ligands) => ligands,
            Err(_) => continue,
        };

        if let Some(found) = ligands.iter().find(|l| l.ligand_id == ligand_id) {
            return Some(found.smiles.clone());
        }
        if let Some(found) = index.and_then(|i| ligands.get(i)) {
            return Some(found.smiles.clone());
        }
        if let Some(found) = ligands.iter().find(|l| l.smiles == ligand_id) {
            return Some(found.smiles.clone());
        }
    }

    None
}

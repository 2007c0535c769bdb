//! Input/output helpers for structure files and persisted JSON artifacts

use nalgebra::Vector3;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::atom::{AtomRecord, RecordKind};

/// Errors that can occur during file I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one `ATOM`/`HETATM` line using the fixed PDB columns
pub fn parse_atom_record(line: &str, line_number: usize) -> Result<AtomRecord, IoError> {
    let kind = RecordKind::from_line(line).ok_or_else(|| IoError::Parse {
        line: line_number,
        message: format!("Not a coordinate record: {}", line),
    })?;

    let column = |start: usize, end: usize| line.get(start..end.min(line.len())).unwrap_or("");
    let coordinate = |start: usize, end: usize, axis: &str| {
        column(start, end)
            .trim()
            .parse::<f64>()
            .map_err(|_| IoError::Parse {
                line: line_number,
                message: format!("Invalid {} coordinate: {}", axis, column(start, end)),
            })
    };

    // Coordinates are mandatory, everything else is best effort
    let x = coordinate(30, 38, "x")?;
    let y = coordinate(38, 46, "y")?;
    let z = coordinate(46, 54, "z")?;

    Ok(AtomRecord {
        kind,
        name: column(12, 16).trim().to_string(),
        residue_name: column(17, 20).trim().to_string(),
        chain_id: column(21, 22).chars().next().unwrap_or(' '),
        residue_num: column(22, 26).trim().parse::<i32>().unwrap_or(0),
        coordinates: Vector3::new(x, y, z),
        line: line.to_string(),
    })
}

/// Read every coordinate record of a PDB/PDBQT file.
///
/// Malformed coordinate lines are skipped rather than failing the whole file.
/// With `first_model_only`, reading stops at the first `ENDMDL`.
pub fn read_atom_records<P: AsRef<Path>>(
    path: P,
    first_model_only: bool,
) -> Result<Vec<AtomRecord>, IoError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if first_model_only && line.starts_with("ENDMDL") {
            break;
        }
        if RecordKind::from_line(&line).is_none() {
            continue;
        }
        match parse_atom_record(&line, index + 1) {
            Ok(record) => records.push(record),
            Err(e) => log::debug!("Skipping record in {}: {}", path.as_ref().display(), e),
        }
    }

    Ok(records)
}

/// Read only the coordinates of a structure file
pub fn read_coordinates<P: AsRef<Path>>(path: P) -> Result<Vec<Vector3<f64>>, IoError> {
    Ok(read_atom_records(path, false)?
        .into_iter()
        .map(|record| record.coordinates)
        .collect())
}

/// Write coordinate records back out, followed by `END`
pub fn write_atom_records<P: AsRef<Path>>(records: &[AtomRecord], path: P) -> Result<(), IoError> {
    ensure_parent(path.as_ref())?;
    let mut file = File::create(path)?;
    for record in records {
        writeln!(file, "{}", record.line.trim_end())?;
    }
    writeln!(file, "END")?;
    Ok(())
}

/// Deserialize a JSON file
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, IoError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize a value as pretty-printed JSON, creating parent directories as needed
pub fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<(), IoError> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text)?;
    Ok(())
}

/// Create the parent directory of a path
pub fn ensure_parent(path: &Path) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// True if the file exists and has content
pub fn is_non_empty<P: AsRef<Path>>(path: P) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Files in `dir` with the given extension (case-insensitive), sorted by name
pub fn list_files_with_extension<P: AsRef<Path>>(dir: P, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

/// Subdirectories of `dir`, sorted by name
pub fn list_subdirectories<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    };
    dirs.sort();
    dirs
}

/// Find `<dir>/<stem>.<extension>`, falling back to a case-insensitive stem match
pub fn find_file_by_stem<P: AsRef<Path>>(dir: P, stem: &str, extension: &str) -> Option<PathBuf> {
    let exact = dir.as_ref().join(format!("{}.{}", stem, extension));
    if exact.is_file() {
        return Some(exact);
    }
    let wanted = stem.to_lowercase();
    list_files_with_extension(dir, extension).into_iter().find(|path| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase() == wanted)
            .unwrap_or(false)
    })
}

/// Find `<dir>/<name>/`, falling back to a case-insensitive name match
pub fn find_dir_by_name<P: AsRef<Path>>(dir: P, name: &str) -> Option<PathBuf> {
    let exact = dir.as_ref().join(name);
    if exact.is_dir() {
        return Some(exact);
    }
    let wanted = name.to_lowercase();
    list_subdirectories(dir).into_iter().find(|path| {
        path.file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase() == wanted)
            .unwrap_or(false)
    })
}

/// File stem as an owned string
pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

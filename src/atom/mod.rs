//! Atom records read from PDB/PDBQT coordinate sections

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Standard polymer atom (`ATOM`)
    Atom,
    /// Heteroatom: ligands, cofactors, waters (`HETATM`)
    Hetatm,
}

impl RecordKind {
    /// Record keyword as written in column 1-6
    pub fn keyword(&self) -> &'static str {
        match self {
            RecordKind::Atom => "ATOM",
            RecordKind::Hetatm => "HETATM",
        }
    }

    /// Recognise the record keyword at the start of a line
    pub fn from_line(line: &str) -> Option<Self> {
        if line.starts_with("HETATM") {
            Some(RecordKind::Hetatm)
        } else if line.starts_with("ATOM") {
            Some(RecordKind::Atom)
        } else {
            None
        }
    }
}

/// Represents one coordinate record of a structure file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomRecord {
    /// `ATOM` or `HETATM`
    pub kind: RecordKind,

    /// Atom name (e.g., "CA", "N", "O")
    pub name: String,

    /// Residue name this atom belongs to
    pub residue_name: String,

    /// Chain identifier (blank chains are stored as ' ')
    pub chain_id: char,

    /// Residue sequence number
    pub residue_num: i32,

    /// 3D coordinates (in Angstroms)
    pub coordinates: Vector3<f64>,

    /// The original line, kept so filtered structures can be written back verbatim
    pub line: String,
}

impl AtomRecord {
    /// Calculate distance to another atom
    pub fn distance(&self, other: &AtomRecord) -> f64 {
        (self.coordinates - other.coordinates).norm()
    }

    /// Water molecules are excluded from cleaned receptors by default
    pub fn is_water(&self) -> bool {
        matches!(self.residue_name.as_str(), "HOH" | "WAT")
    }

    /// Is this a C-alpha of a standard amino acid?
    pub fn is_alpha_carbon(&self) -> bool {
        self.kind == RecordKind::Atom && self.name == "CA"
    }
}

impl fmt::Display for AtomRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{} {}({}, {}, {})",
            self.kind.keyword(),
            self.residue_name,
            self.chain_id,
            self.residue_num,
            self.name,
            self.coordinates.x,
            self.coordinates.y,
            self.coordinates.z
        )
    }
}

/// One-letter code of a standard residue
pub fn residue_one_letter(residue_name: &str) -> Option<char> {
    let code = match residue_name.trim().to_uppercase().as_str() {
        "ALA" => 'A',
        "ARG" => 'R',
        "ASN" => 'N',
        "ASP" => 'D',
        "CYS" => 'C',
        "GLN" => 'Q',
        "GLU" => 'E',
        "GLY" => 'G',
        "HIS" | "HID" | "HIE" | "HIP" => 'H',
        "ILE" => 'I',
        "LEU" => 'L',
        "LYS" => 'K',
        "MET" | "MSE" => 'M',
        "PHE" => 'F',
        "PRO" => 'P',
        "SER" => 'S',
        "THR" => 'T',
        "TRP" => 'W',
        "TYR" => 'Y',
        "VAL" => 'V',
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: RecordKind, name: &str, residue: &str, at: [f64; 3]) -> AtomRecord {
        AtomRecord {
            kind,
            name: name.to_string(),
            residue_name: residue.to_string(),
            chain_id: 'A',
            residue_num: 1,
            coordinates: Vector3::new(at[0], at[1], at[2]),
            line: String::new(),
        }
    }

    #[test]
    fn test_record_kind_from_line() {
        assert_eq!(RecordKind::from_line("ATOM      1  N   ALA"), Some(RecordKind::Atom));
        assert_eq!(RecordKind::from_line("HETATM    1  O   HOH"), Some(RecordKind::Hetatm));
        assert_eq!(RecordKind::from_line("REMARK  VINA RESULT"), None);
    }

    #[test]
    fn test_atom_distance() {
        let a = record(RecordKind::Atom, "CA", "ALA", [0.0, 0.0, 0.0]);
        let b = record(RecordKind::Atom, "CA", "ALA", [1.0, 1.0, 1.0]);
        assert!((a.distance(&b) - 1.732).abs() < 0.001);
    }

    #[test]
    fn test_water_and_alpha_carbon() {
        assert!(record(RecordKind::Hetatm, "O", "HOH", [0.0; 3]).is_water());
        assert!(!record(RecordKind::Hetatm, "C1", "EST", [0.0; 3]).is_water());
        assert!(record(RecordKind::Atom, "CA", "GLY", [0.0; 3]).is_alpha_carbon());
        assert!(!record(RecordKind::Hetatm, "CA", "CA", [0.0; 3]).is_alpha_carbon());
    }

    #[test]
    fn test_residue_one_letter() {
        assert_eq!(residue_one_letter("ALA"), Some('A'));
        assert_eq!(residue_one_letter("trp"), Some('W'));
        assert_eq!(residue_one_letter("MSE"), Some('M'));
        assert_eq!(residue_one_letter("HOH"), None);
    }
}

//! Structure representation: a named collection of coordinate records

use nalgebra::Vector3;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use crate::atom::{residue_one_letter, AtomRecord, RecordKind};
use crate::io::{self, IoError};

/// Errors that can occur when working with structures
#[derive(Error, Debug)]
pub enum StructureError {
    #[error("No atoms in structure {0}")]
    EmptyStructure(String),

    #[error("No atoms selected for {name} with chain '{chain}'")]
    NoAtomsSelected { name: String, chain: char },

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Which records survive receptor cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSelection {
    /// Chain to keep
    pub chain: char,

    /// Keep bound ligands (`HETATM` that are not water)
    pub include_ligands: bool,

    /// Keep cofactors (also `HETATM`)
    pub include_cofactors: bool,

    /// Keep crystallographic waters
    pub include_waters: bool,
}

impl Default for ChainSelection {
    fn default() -> Self {
        Self {
            chain: 'A',
            include_ligands: false,
            include_cofactors: false,
            include_waters: false,
        }
    }
}

/// Represents a protein or ligand structure
#[derive(Debug, Clone)]
pub struct Structure {
    /// Name of the structure
    pub name: String,

    /// Coordinate records in file order
    pub atoms: Vec<AtomRecord>,
}

impl Structure {
    /// Create a new empty structure
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            atoms: Vec::new(),
        }
    }

    /// Load every coordinate record of a PDB/PDBQT file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StructureError> {
        let path = path.as_ref();
        Ok(Self {
            name: io::stem_of(path),
            atoms: io::read_atom_records(path, false)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Coordinates of all atoms
    pub fn coordinates(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.coordinates).collect()
    }

    /// Arithmetic mean of the atom coordinates
    pub fn center(&self) -> Result<Vector3<f64>, StructureError> {
        if self.atoms.is_empty() {
            return Err(StructureError::EmptyStructure(self.name.clone()));
        }

        let sum = self
            .atoms
            .iter()
            .fold(Vector3::zeros(), |acc, atom| acc + atom.coordinates);

        Ok(sum / self.atoms.len() as f64)
    }

    /// Axis-aligned bounding box as (min corner, max corner)
    pub fn bounding_box(&self) -> Result<(Vector3<f64>, Vector3<f64>), StructureError> {
        if self.atoms.is_empty() {
            return Err(StructureError::EmptyStructure(self.name.clone()));
        }

        let mut min = Vector3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Vector3::new(f64::MIN, f64::MIN, f64::MIN);

        for atom in &self.atoms {
            min = min.inf(&atom.coordinates);
            max = max.sup(&atom.coordinates);
        }

        Ok((min, max))
    }

    /// Filter to a single chain, optionally keeping heteroatoms and waters
    pub fn select_chain(&self, selection: &ChainSelection) -> Result<Structure, StructureError> {
        let keep_het = selection.include_ligands || selection.include_cofactors;
        let atoms: Vec<AtomRecord> = self
            .atoms
            .iter()
            .filter(|atom| atom.chain_id == selection.chain)
            .filter(|atom| !atom.is_water() || selection.include_waters)
            .filter(|atom| atom.kind == RecordKind::Atom || keep_het || atom.is_water())
            .cloned()
            .collect();

        if atoms.is_empty() {
            return Err(StructureError::NoAtomsSelected {
                name: self.name.clone(),
                chain: selection.chain,
            });
        }

        Ok(Structure {
            name: self.name.clone(),
            atoms,
        })
    }

    /// Heteroatom records of a given residue (a co-crystallised reference ligand)
    pub fn residues_named(&self, residue_name: &str) -> Structure {
        let wanted = residue_name.trim().to_uppercase();
        Structure {
            name: format!("{}_{}", self.name, wanted),
            atoms: self
                .atoms
                .iter()
                .filter(|atom| atom.kind == RecordKind::Hetatm)
                .filter(|atom| atom.residue_name.to_uppercase() == wanted)
                .cloned()
                .collect(),
        }
    }

    /// Chains present in file order
    pub fn chains(&self) -> Vec<char> {
        let mut seen = BTreeSet::new();
        self.atoms
            .iter()
            .map(|atom| atom.chain_id)
            .filter(|chain| seen.insert(*chain))
            .collect()
    }

    /// One-letter sequence of a chain, read from its C-alpha atoms
    pub fn sequence(&self, chain: char) -> String {
        let mut last_residue = None;
        let mut sequence = String::new();
        for atom in self.atoms.iter().filter(|a| a.chain_id == chain && a.is_alpha_carbon()) {
            if last_residue == Some(atom.residue_num) {
                // Alternate locations repeat the CA
                continue;
            }
            last_residue = Some(atom.residue_num);
            if let Some(code) = residue_one_letter(&atom.residue_name) {
                sequence.push(code);
            }
        }
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(kind: RecordKind, name: &str, residue: &str, chain: char, num: i32, at: [f64; 3]) -> AtomRecord {
        AtomRecord {
            kind,
            name: name.to_string(),
            residue_name: residue.to_string(),
            chain_id: chain,
            residue_num: num,
            coordinates: Vector3::new(at[0], at[1], at[2]),
            line: String::new(),
        }
    }

    fn sample() -> Structure {
        Structure {
            name: "1abc".to_string(),
            atoms: vec![
                atom(RecordKind::Atom, "CA", "ALA", 'A', 1, [0.0, 0.0, 0.0]),
                atom(RecordKind::Atom, "CA", "GLY", 'A', 2, [2.0, 4.0, 6.0]),
                atom(RecordKind::Atom, "CA", "TRP", 'B', 1, [10.0, 10.0, 10.0]),
                atom(RecordKind::Hetatm, "C1", "EST", 'A', 600, [1.0, 1.0, 1.0]),
                atom(RecordKind::Hetatm, "O", "HOH", 'A', 700, [-5.0, 0.0, 0.0]),
            ],
        }
    }

    #[test]
    fn test_center_and_bounding_box() {
        let s = Structure {
            name: "t".to_string(),
            atoms: sample().atoms[..2].to_vec(),
        };
        assert_eq!(s.center().unwrap(), Vector3::new(1.0, 2.0, 3.0));
        let (min, max) = s.bounding_box().unwrap();
        assert_eq!(min, Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Vector3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_empty_structure_errors() {
        let s = Structure::new("empty");
        assert!(matches!(s.center(), Err(StructureError::EmptyStructure(_))));
        assert!(s.bounding_box().is_err());
    }

    #[test]
    fn test_select_chain_defaults_drop_het_and_water() {
        let cleaned = sample().select_chain(&ChainSelection::default()).unwrap();
        assert_eq!(cleaned.atoms.len(), 2);
        assert!(cleaned.atoms.iter().all(|a| a.kind == RecordKind::Atom));
    }

    #[test]
    fn test_select_chain_with_ligands_and_waters() {
        let selection = ChainSelection {
            include_ligands: true,
            include_waters: true,
            ..ChainSelection::default()
        };
        let cleaned = sample().select_chain(&selection).unwrap();
        assert_eq!(cleaned.atoms.len(), 4);
    }

    #[test]
    fn test_select_missing_chain_fails() {
        let selection = ChainSelection {
            chain: 'Z',
            ..ChainSelection::default()
        };
        assert!(matches!(
            sample().select_chain(&selection),
            Err(StructureError::NoAtomsSelected { chain: 'Z', .. })
        ));
    }

    #[test]
    fn test_reference_ligand_and_sequence() {
        let s = sample();
        assert_eq!(s.residues_named("est").atoms.len(), 1);
        assert!(s.residues_named("XYZ").is_empty());
        assert_eq!(s.sequence('A'), "AG");
        assert_eq!(s.sequence('B'), "W");
        assert_eq!(s.chains(), vec!['A', 'B']);
    }
}

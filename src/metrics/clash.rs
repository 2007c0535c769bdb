//! Steric clash score
//!
//! Number of ligand/protein atom pairs closer than a cutoff distance
//! (CompassDock, arXiv:2406.06841).

use nalgebra::Vector3;
use rayon::prelude::*;
use std::path::Path;

use crate::atom::RecordKind;
use crate::io::{self, IoError};

/// Default clash distance in Angstroms
pub const CLASH_CUTOFF: f64 = 2.0;

/// Count pairs closer than `cutoff`; `None` when either side is empty
pub fn clash_score(ligand: &[Vector3<f64>], protein: &[Vector3<f64>], cutoff: f64) -> Option<usize> {
    if ligand.is_empty() || protein.is_empty() {
        return None;
    }
    let cutoff_sq = cutoff * cutoff;
    Some(
        ligand
            .par_iter()
            .map(|l| protein.iter().filter(|p| (l - *p).norm_squared() < cutoff_sq).count())
            .sum(),
    )
}

/// Clash score of the first docked pose against the receptor's protein atoms
pub fn clash_score_files(docked: &Path, receptor: &Path, cutoff: f64) -> Result<Option<usize>, IoError> {
    let ligand: Vec<Vector3<f64>> = io::read_atom_records(docked, true)?
        .into_iter()
        .map(|atom| atom.coordinates)
        .collect();
    let protein: Vec<Vector3<f64>> = io::read_atom_records(receptor, false)?
        .into_iter()
        .filter(|atom| atom.kind == RecordKind::Atom)
        .map(|atom| atom.coordinates)
        .collect();
    Ok(clash_score(&ligand, &protein, cutoff))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clash_count() {
        let ligand = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(10.0, 0.0, 0.0)];
        let protein = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.9, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(11.0, 0.0, 0.0),
        ];
        assert_eq!(clash_score(&ligand, &protein, CLASH_CUTOFF), Some(3));
        assert_eq!(clash_score(&[], &protein, CLASH_CUTOFF), None);
    }
}

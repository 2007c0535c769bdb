//! Protein/ligand interaction table
//!
//! The table is a JSON object of parallel arrays:
//!
//! ```json
//! {
//!     "protein": ["8zyq", "1ere"],
//!     "ligand": ["hERG_Ki_WT_curated", "ERalpha_ki_df"],
//!     "ref_ligand": ["1II", "EST"],
//!     "safe_chain": ["A", "A"]
//! }
//! ```
//!
//! Pairs are positional. Shorter arrays yield `None` at missing positions and
//! a position only forms a pair when both protein and ligand are present.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::ids::ProteinId;
use crate::io::{self, IoError};

/// One docking job family: a protein and the ligand dataset to dock against it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DockingPair {
    pub protein: ProteinId,
    pub ligand_dataset: String,
    pub ref_ligand: Option<String>,
    pub safe_chain: Option<String>,
}

impl DockingPair {
    /// Preferred chain letter for this pair, if any
    pub fn chain_id(&self) -> Option<char> {
        self.safe_chain
            .as_deref()
            .and_then(|c| c.trim().chars().next())
    }
}

/// Column-aligned interaction table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionTable {
    pub protein: Vec<Option<String>>,
    pub ligand: Vec<Option<String>>,
    pub ref_ligand: Vec<Option<String>>,
    pub safe_chain: Vec<Option<String>>,
}

fn present(column: &[Option<String>], index: usize) -> Option<String> {
    column
        .get(index)
        .and_then(|value| value.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl InteractionTable {
    /// Load the table; a missing file is an empty table
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Interaction table {} not found", path.display());
            return Ok(Self::default());
        }
        io::read_json(path)
    }

    /// All valid pairs in table order
    pub fn pairs(&self) -> Vec<DockingPair> {
        let rows = self.protein.len().max(self.ligand.len());
        (0..rows)
            .filter_map(|i| {
                let protein = present(&self.protein, i)?;
                let ligand_dataset = present(&self.ligand, i)?;
                Some(DockingPair {
                    protein: ProteinId::new(&protein),
                    ligand_dataset,
                    ref_ligand: present(&self.ref_ligand, i),
                    safe_chain: present(&self.safe_chain, i),
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }

    /// Canonical ids of every protein that takes part in a pair
    pub fn proteins(&self) -> BTreeSet<ProteinId> {
        self.pairs().into_iter().map(|p| p.protein).collect()
    }

    /// Ligand dataset names that take part in a pair
    pub fn ligand_datasets(&self) -> BTreeSet<String> {
        self.pairs().into_iter().map(|p| p.ligand_dataset).collect()
    }

    /// Proteins paired with a ligand dataset (dataset matched case-insensitively)
    pub fn proteins_for_ligand(&self, ligand_dataset: &str) -> Vec<ProteinId> {
        let wanted = ligand_dataset.to_lowercase();
        let mut proteins: Vec<ProteinId> = Vec::new();
        for pair in self.pairs() {
            if pair.ligand_dataset.to_lowercase() == wanted && !proteins.contains(&pair.protein) {
                proteins.push(pair.protein);
            }
        }
        proteins
    }

    /// Ligand datasets paired with a protein
    pub fn ligands_for_protein(&self, protein: &ProteinId) -> Vec<String> {
        self.pairs()
            .into_iter()
            .filter(|pair| &pair.protein == protein)
            .map(|pair| pair.ligand_dataset)
            .collect()
    }

    /// The first pair that mentions a protein, used to pick chains and reference ligands
    pub fn pair_for_protein(&self, protein: &ProteinId) -> Option<DockingPair> {
        self.pairs().into_iter().find(|pair| &pair.protein == protein)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> InteractionTable {
        serde_json::from_str(
            r#"{
                "protein": ["8ZYQ", "1ere", "1ERE", null, "2abc"],
                "ligand": ["hERG", "ERalpha", "ERbeta", "orphan"],
                "ref_ligand": ["1II", "EST"],
                "safe_chain": ["A", "B", "", null, "C"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_pairs_are_positional() {
        let pairs = table().pairs();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].protein.as_str(), "8zyq");
        assert_eq!(pairs[0].ref_ligand.as_deref(), Some("1II"));
        assert_eq!(pairs[1].chain_id(), Some('B'));
        assert_eq!(pairs[2].ref_ligand, None);
        assert_eq!(pairs[2].safe_chain, None);
    }

    #[test]
    fn test_lookups_are_case_insensitive() {
        let table = table();
        assert_eq!(table.proteins().len(), 2);
        assert_eq!(table.proteins_for_ligand("herg"), vec![ProteinId::new("8zyq")]);
        assert_eq!(
            table.ligands_for_protein(&ProteinId::new("1ERE")),
            vec!["ERalpha".to_string(), "ERbeta".to_string()]
        );
        assert!(table.ligand_datasets().contains("ERbeta"));
        assert!(!table.ligand_datasets().contains("orphan"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let table = InteractionTable::load("/nonexistent/interaction.json").unwrap();
        assert!(table.is_empty());
    }
}

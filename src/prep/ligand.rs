//! Ligand preparation: SMILES -> 3D SDF -> PDBQT

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{run_strategies, PrepError, Strategy};
use crate::config::ToolsConfig;
use crate::exec::{CommandExecutor, CommandSpec};
use crate::ids::ProteinId;
use crate::io;
use crate::ligand::LigandRecord;
use crate::provenance::{ArtifactKind, ProvenanceLog};

/// Inline RDKit embedding helper: `smiles output seed`
const RDKIT_EMBED: &str = "\
import sys
from rdkit import Chem
from rdkit.Chem import AllChem
smiles, out, seed = sys.argv[1], sys.argv[2], int(sys.argv[3])
mol = Chem.MolFromSmiles(smiles)
if mol is None:
    sys.exit('Failed to parse SMILES: ' + smiles)
mol = Chem.AddHs(mol)
if AllChem.EmbedMolecule(mol, randomSeed=seed) != 0:
    sys.exit('Embedding failed for ' + smiles)
AllChem.MMFFOptimizeMolecule(mol)
writer = Chem.SDWriter(out)
writer.write(mol)
writer.close()
";

/// Outcome of preparing a ligand table
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PrepSummary {
    pub prepared: usize,
    pub failed: usize,
}

/// Prepares ligand PDBQT files under `<processed>/pdbqt/<protein>`
pub struct LigandPreparator {
    processed_dir: PathBuf,
    tools: ToolsConfig,
    conda_env: Option<String>,
    executor: Arc<dyn CommandExecutor>,
    seed: u64,
    provenance: ProvenanceLog,
}

/// FNV-1a, stable across platforms and releases
fn stable_hash(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl LigandPreparator {
    pub fn new(
        processed_dir: &Path,
        tools: ToolsConfig,
        conda_env: Option<String>,
        executor: Arc<dyn CommandExecutor>,
        seed: u64,
    ) -> Self {
        Self {
            processed_dir: processed_dir.to_path_buf(),
            tools,
            conda_env,
            executor,
            seed,
            provenance: ProvenanceLog::new(processed_dir.join("preparation_manifest.json")),
        }
    }

    pub fn sdf_path(&self, protein: &ProteinId, ligand_id: &str) -> PathBuf {
        self.processed_dir
            .join("sdf")
            .join(protein.as_str())
            .join(format!("{}.sdf", ligand_id))
    }

    pub fn pdbqt_path(&self, protein: &ProteinId, ligand_id: &str) -> PathBuf {
        self.processed_dir
            .join("pdbqt")
            .join(protein.as_str())
            .join(format!("{}.pdbqt", ligand_id))
    }

    /// Embedding seed for one ligand, derived from the run seed
    pub fn ligand_seed(&self, ligand_id: &str) -> i32 {
        let mut rng = StdRng::seed_from_u64(self.seed ^ stable_hash(ligand_id));
        rng.gen_range(0..i32::MAX)
    }

    /// Prepare one ligand for docking against `protein`. Idempotent.
    pub fn prepare(&mut self, protein: &ProteinId, ligand: &LigandRecord) -> Result<PathBuf, PrepError> {
        let sdf = self.sdf_path(protein, &ligand.ligand_id);
        let pdbqt = self.pdbqt_path(protein, &ligand.ligand_id);

        if !io::is_non_empty(&sdf) {
            io::ensure_parent(&sdf)?;
            let strategies = self.sdf_strategies(&ligand.smiles, &sdf, self.ligand_seed(&ligand.ligand_id));
            let strategy = run_strategies(self.executor.as_ref(), &sdf, strategies)?;
            log::debug!("Ligand {}: SDF prepared using {}", ligand.ligand_id, strategy);
            self.provenance.record(&sdf, ArtifactKind::LigandSdf, strategy, None);
        }

        if !io::is_non_empty(&pdbqt) {
            io::ensure_parent(&pdbqt)?;
            let strategies = self.pdbqt_strategies(&sdf, &pdbqt);
            let strategy = run_strategies(self.executor.as_ref(), &pdbqt, strategies)?;
            log::debug!("Ligand {}: PDBQT prepared using {}", ligand.ligand_id, strategy);
            self.provenance
                .record(&pdbqt, ArtifactKind::LigandPdbqt, strategy, Some(&sdf));
        }

        Ok(pdbqt)
    }

    /// Prepare every ligand of a table. Single-ligand failures are logged and
    /// counted; faults (no toolchain at all) stop the table.
    pub fn prepare_table(
        &mut self,
        protein: &ProteinId,
        ligands: &[LigandRecord],
    ) -> Result<PrepSummary, PrepError> {
        let mut summary = PrepSummary::default();
        for ligand in ligands {
            match self.prepare(protein, ligand) {
                Ok(_) => summary.prepared += 1,
                Err(e) if e.is_fault() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to prepare ligand {} for {}: {}", ligand.ligand_id, protein, e);
                    summary.failed += 1;
                }
            }
        }
        log::info!(
            "Prepared {} ligands for {} ({} failed)",
            summary.prepared,
            protein,
            summary.failed
        );
        Ok(summary)
    }

    fn sdf_strategies(&self, smiles: &str, sdf: &Path, seed: i32) -> Vec<Strategy> {
        let sdf = sdf.display().to_string();
        let mut strategies = Vec::new();
        if self.tools.use_rdkit {
            strategies.push(Strategy::new(
                "rdkit",
                CommandSpec::new(&self.tools.python)
                    .args(["-c", RDKIT_EMBED, smiles, sdf.as_str()])
                    .arg(seed.to_string())
                    .conda_env(self.conda_env.as_deref()),
            ));
        }
        strategies.push(Strategy::new(
            "obabel",
            CommandSpec::new(&self.tools.obabel)
                .arg(format!("-:{}", smiles))
                .args(["-O", sdf.as_str(), "--gen3d", "-h"])
                .conda_env(self.conda_env.as_deref()),
        ));
        strategies
    }

    fn pdbqt_strategies(&self, sdf: &Path, pdbqt: &Path) -> Vec<Strategy> {
        let sdf = sdf.display().to_string();
        let pdbqt = pdbqt.display().to_string();
        let mut strategies = Vec::new();
        if self.tools.use_meeko {
            strategies.push(Strategy::new(
                "meeko",
                CommandSpec::new(&self.tools.meeko_ligand)
                    .args(["-i", sdf.as_str(), "-o", pdbqt.as_str()])
                    .conda_env(self.conda_env.as_deref()),
            ));
        }
        strategies.push(Strategy::new(
            "obabel",
            CommandSpec::new(&self.tools.obabel)
                .args([sdf.as_str(), "-O", pdbqt.as_str(), "-h"])
                .conda_env(self.conda_env.as_deref()),
        ));
        strategies
    }

    pub fn save_manifest(&self) -> Result<(), PrepError> {
        Ok(self.provenance.save()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prep::testing::FakeTools;
    use tempfile::tempdir;

    fn record(id: &str) -> LigandRecord {
        LigandRecord {
            ligand_id: id.to_string(),
            smiles: "CCO".to_string(),
        }
    }

    #[test]
    fn test_seed_is_deterministic_per_ligand() {
        let dir = tempdir().unwrap();
        let tools = Arc::new(FakeTools::new(&[]));
        let a = LigandPreparator::new(dir.path(), ToolsConfig::default(), None, tools.clone(), 42);
        let b = LigandPreparator::new(dir.path(), ToolsConfig::default(), None, tools, 42);
        assert_eq!(a.ligand_seed("mol1"), b.ligand_seed("mol1"));
        assert_ne!(a.ligand_seed("mol1"), a.ligand_seed("mol2"));
        assert!(a.ligand_seed("mol1") >= 0);
    }

    #[test]
    fn test_prepare_records_toolchain() {
        let dir = tempdir().unwrap();
        let tools = Arc::new(FakeTools::new(&["python3", "obabel"]));
        let mut prep = LigandPreparator::new(dir.path(), ToolsConfig::default(), None, tools.clone(), 42);
        let protein = ProteinId::new("1ERE");

        let pdbqt = prep.prepare(&protein, &record("mol1")).unwrap();
        assert!(pdbqt.ends_with("pdbqt/1ere/mol1.pdbqt"));
        assert_eq!(prep.provenance.get(&prep.sdf_path(&protein, "mol1")).unwrap().strategy, "rdkit");
        assert_eq!(prep.provenance.get(&pdbqt).unwrap().strategy, "obabel");
        assert_eq!(tools.calls(), vec!["python3", "mk_prepare_ligand.py", "obabel"]);

        // Second pass finds both files
        prep.prepare(&protein, &record("mol1")).unwrap();
        assert_eq!(tools.calls().len(), 3);
    }

    #[test]
    fn test_prepare_table_counts() {
        let dir = tempdir().unwrap();
        let tools = Arc::new(FakeTools::new(&["obabel"]));
        let mut prep = LigandPreparator::new(dir.path(), ToolsConfig::default(), None, tools, 7);
        let summary = prep
            .prepare_table(&ProteinId::new("x"), &[record("a"), record("b")])
            .unwrap();
        assert_eq!(summary, PrepSummary { prepared: 2, failed: 0 });
    }
}

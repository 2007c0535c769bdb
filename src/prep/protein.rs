//! Receptor preparation: chain filtering followed by PDBQT conversion

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{run_strategies, PrepError, Strategy};
use crate::config::{ProteinSettings, SettingsMap, ToolsConfig};
use crate::exec::{CommandExecutor, CommandSpec};
use crate::ids::{CaseInsensitiveLookup, ProteinId};
use crate::io;
use crate::provenance::{ArtifactKind, ProvenanceLog};
use crate::structure::{ChainSelection, Structure};

/// Prepares receptor PDBQT files under `<processed>/proteins`
pub struct ProteinPreparator {
    processed_dir: PathBuf,
    settings: SettingsMap,
    tools: ToolsConfig,
    conda_env: Option<String>,
    executor: Arc<dyn CommandExecutor>,
    provenance: ProvenanceLog,
}

impl ProteinPreparator {
    pub fn new(
        processed_dir: &Path,
        settings: SettingsMap,
        tools: ToolsConfig,
        conda_env: Option<String>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            processed_dir: processed_dir.to_path_buf(),
            settings,
            tools,
            conda_env,
            executor,
            provenance: ProvenanceLog::new(processed_dir.join("preparation_manifest.json")),
        }
    }

    pub fn proteins_dir(&self) -> PathBuf {
        self.processed_dir.join("proteins")
    }

    pub fn cleaned_dir(&self) -> PathBuf {
        self.proteins_dir().join("cleaned")
    }

    /// `<processed>/proteins/<id>.pdbqt`
    pub fn receptor_path(&self, protein: &ProteinId) -> PathBuf {
        self.proteins_dir().join(format!("{}.pdbqt", protein))
    }

    /// `<processed>/proteins/cleaned/<id>_chain<C>.pdb`
    pub fn cleaned_path(&self, protein: &ProteinId, chain: char) -> PathBuf {
        self.cleaned_dir().join(format!("{}_chain{}.pdb", protein, chain))
    }

    /// Settings for a protein (exact key first, then case-insensitive)
    pub fn settings_for(&self, protein: &str) -> ProteinSettings {
        self.settings.get_ignore_case(protein).cloned().unwrap_or_default()
    }

    /// Record selection: settings chain, else the pair's safe chain, else `A`
    pub fn selection_for(&self, protein: &str, pair_chain: Option<char>) -> ChainSelection {
        let settings = self.settings_for(protein);
        ChainSelection {
            chain: settings.chain_id().or(pair_chain).unwrap_or('A'),
            include_ligands: settings.include_ligands,
            include_cofactors: settings.include_cofactors,
            include_waters: settings.include_waters,
        }
    }

    /// Write the chain-filtered structure, unless it already exists
    pub fn clean(&mut self, pdb_path: &Path, selection: &ChainSelection) -> Result<PathBuf, PrepError> {
        let protein = ProteinId::from_path(pdb_path)
            .ok_or_else(|| PrepError::MissingInput(pdb_path.to_path_buf()))?;
        let cleaned = self.cleaned_path(&protein, selection.chain);
        if io::is_non_empty(&cleaned) {
            return Ok(cleaned);
        }
        if !pdb_path.is_file() {
            return Err(PrepError::MissingInput(pdb_path.to_path_buf()));
        }

        let structure = Structure::from_file(pdb_path)?.select_chain(selection)?;
        io::write_atom_records(&structure.atoms, &cleaned)?;
        log::info!(
            "Cleaned {} to chain {} ({} atoms)",
            protein,
            selection.chain,
            structure.atoms.len()
        );
        self.provenance.record(
            &cleaned,
            ArtifactKind::CleanedReceptor,
            &format!("chain_{}", selection.chain),
            Some(pdb_path),
        );
        Ok(cleaned)
    }

    /// Produce the receptor PDBQT for a raw PDB file. Idempotent.
    pub fn prepare(&mut self, pdb_path: &Path, pair_chain: Option<char>) -> Result<PathBuf, PrepError> {
        let raw_name = io::stem_of(pdb_path);
        let protein = ProteinId::new(&raw_name);
        let receptor = self.receptor_path(&protein);
        if io::is_non_empty(&receptor) {
            log::debug!("Receptor {} already prepared", receptor.display());
            return Ok(receptor);
        }

        let selection = self.selection_for(&raw_name, pair_chain);
        let cleaned = self.clean(pdb_path, &selection)?;

        let strategy = run_strategies(
            self.executor.as_ref(),
            &receptor,
            self.receptor_strategies(&cleaned, &receptor, selection.chain),
        )?;
        log::info!("Protein {}: prepared using {}", protein, strategy);
        self.provenance
            .record(&receptor, ArtifactKind::Receptor, strategy, Some(&cleaned));
        Ok(receptor)
    }

    fn receptor_strategies(&self, cleaned: &Path, receptor: &Path, chain: char) -> Vec<Strategy> {
        let cleaned = cleaned.display().to_string();
        let receptor = receptor.display().to_string();
        let chain = chain.to_string();
        let mut strategies = Vec::new();

        if self.tools.use_meeko {
            strategies.push(Strategy::new(
                "meeko",
                CommandSpec::new(&self.tools.meeko_receptor)
                    .args(["--read_pdb", cleaned.as_str()])
                    .args(["--default_altloc", chain.as_str()])
                    .args(["--delete_residues", "HOH", "--allow_bad_res"])
                    .args(["-p", receptor.as_str()])
                    .conda_env(self.conda_env.as_deref()),
            ));
        }
        strategies.push(Strategy::new(
            "obabel",
            CommandSpec::new(&self.tools.obabel)
                .args([cleaned.as_str(), "-O", receptor.as_str(), "-xr", "-xh"])
                .conda_env(self.conda_env.as_deref()),
        ));
        strategies
    }

    /// Persist which toolchain produced each receptor
    pub fn save_manifest(&self) -> Result<(), PrepError> {
        Ok(self.provenance.save()?)
    }
}

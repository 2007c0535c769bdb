//! Boltz-2 co-folding adapter
//!
//! Boltz-2 needs no receptor preparation or search box: every pair becomes a
//! YAML input holding the protein sequence and the ligand SMILES, and the
//! predicted affinity is read from the JSON it writes next to the structure.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::{record_pair_failure, require_dir, DockingMethod, DockingSummary, MethodContext, MethodError};
use crate::config::MethodSettings;
use crate::error_log::ErrorLogger;
use crate::exec::CommandSpec;
use crate::ids::{CaseInsensitiveLookup, ProteinId};
use crate::interaction::DockingPair;
use crate::io::{self, IoError};
use crate::ligand::load_ligand_table;
use crate::metrics::read_boltz_affinity;
use crate::results::{MetricRecord, MetricValue};
use crate::structure::Structure;

const NAME: &str = "boltz2";
const PROTEIN_CHAIN: &str = "A";
const LIGAND_CHAIN: &str = "B";

#[derive(Debug, Serialize)]
struct BoltzInput {
    version: u32,
    sequences: Vec<SequenceEntry>,
    properties: Vec<PropertyEntry>,
}

/// Exactly one of the fields is set
#[derive(Debug, Default, Serialize)]
struct SequenceEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    protein: Option<ProteinEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ligand: Option<LigandEntry>,
}

#[derive(Debug, Serialize)]
struct ProteinEntry {
    id: String,
    sequence: String,
    /// `empty` runs single-sequence mode when the MSA server is off
    #[serde(skip_serializing_if = "Option::is_none")]
    msa: Option<String>,
}

#[derive(Debug, Serialize)]
struct LigandEntry {
    id: String,
    smiles: String,
}

#[derive(Debug, Serialize)]
struct PropertyEntry {
    affinity: AffinityEntry,
}

#[derive(Debug, Serialize)]
struct AffinityEntry {
    binder: String,
}

/// Boltz-2 structure and affinity prediction
pub struct Boltz2 {
    ctx: Arc<MethodContext>,
    settings: MethodSettings,
}

impl Boltz2 {
    pub fn new(ctx: Arc<MethodContext>) -> Self {
        let settings = ctx.config.method(NAME);
        Self { ctx, settings }
    }

    pub fn binary(&self) -> &str {
        self.settings.binary.as_deref().unwrap_or("boltz")
    }

    /// `<processed>/boltz2`
    pub fn input_dir(&self) -> PathBuf {
        self.ctx.processed_dir().join(NAME)
    }

    /// `<output>/boltz2`
    pub fn method_dir(&self) -> PathBuf {
        self.ctx.output_dir().join(NAME)
    }

    /// `boltz_results_<ligand>/predictions/<ligand>` under a protein's output directory
    fn prediction_dir(protein_dir: &Path, ligand: &str) -> PathBuf {
        protein_dir
            .join(format!("boltz_results_{}", ligand))
            .join("predictions")
            .join(ligand)
    }

    fn affinity_path(protein_dir: &Path, ligand: &str) -> PathBuf {
        Self::prediction_dir(protein_dir, ligand).join(format!("affinity_{}.json", ligand))
    }

    fn input(&self, sequence: &str, smiles: &str) -> BoltzInput {
        BoltzInput {
            version: 1,
            sequences: vec![
                SequenceEntry {
                    protein: Some(ProteinEntry {
                        id: PROTEIN_CHAIN.to_string(),
                        sequence: sequence.to_string(),
                        msa: (!self.settings.use_msa_server).then(|| "empty".to_string()),
                    }),
                    ..SequenceEntry::default()
                },
                SequenceEntry {
                    ligand: Some(LigandEntry {
                        id: LIGAND_CHAIN.to_string(),
                        smiles: smiles.to_string(),
                    }),
                    ..SequenceEntry::default()
                },
            ],
            properties: vec![PropertyEntry {
                affinity: AffinityEntry {
                    binder: LIGAND_CHAIN.to_string(),
                },
            }],
        }
    }

    /// Sequence of the docking chain: settings chain, else the pair's safe chain, else `A`
    fn sequence(&self, pdb: &Path, pair: &DockingPair) -> Option<String> {
        let chain = self
            .ctx
            .protein_settings
            .get_ignore_case(&io::stem_of(pdb))
            .and_then(|s| s.chain_id())
            .or_else(|| pair.chain_id())
            .unwrap_or('A');
        let structure = match Structure::from_file(pdb) {
            Ok(structure) => structure,
            Err(e) => {
                log::warn!("Cannot read {}: {}", pdb.display(), e);
                return None;
            }
        };
        let sequence = structure.sequence(chain);
        if sequence.is_empty() {
            log::warn!("No residues on chain {} of {}", chain, pdb.display());
            return None;
        }
        Some(sequence)
    }

    fn write_inputs(&self, pair: &DockingPair, sequence: &str, ligand_dir: &Path) -> Result<usize, MethodError> {
        let Some(table) = io::find_file_by_stem(ligand_dir, &pair.ligand_dataset, "csv") else {
            log::warn!("No ligand table for {} in {}", pair.ligand_dataset, ligand_dir.display());
            return Ok(0);
        };
        let ligands = match load_ligand_table(&table) {
            Ok(ligands) => ligands,
            Err(e) => {
                log::warn!("Skipping ligand table {}: {}", table.display(), e);
                return Ok(0);
            }
        };

        let protein_dir = self.input_dir().join(pair.protein.as_str());
        let mut written = 0;
        for ligand in &ligands {
            let path = protein_dir.join(format!("{}.yaml", ligand.ligand_id));
            if io::is_non_empty(&path) {
                continue;
            }
            let yaml = serde_yaml::to_string(&self.input(sequence, &ligand.smiles))?;
            io::ensure_parent(&path)?;
            fs::write(&path, yaml).map_err(IoError::from)?;
            written += 1;
        }
        Ok(written)
    }

    fn command(&self, input: &Path, out_dir: &Path) -> CommandSpec {
        let mut command = CommandSpec::new(self.binary())
            .arg("predict")
            .arg(input.display().to_string())
            .args(["--out_dir".to_string(), out_dir.display().to_string()]);
        if self.settings.use_msa_server {
            command = command.arg("--use_msa_server");
        }
        if self.settings.use_potentials {
            command = command.arg("--use_potentials");
        }
        command
            .args(["--seed".to_string(), self.ctx.seed().to_string()])
            .args(self.settings.extra_args.iter().cloned())
            .conda_env(self.settings.conda_env.as_deref())
            .timeout(self.settings.timeout())
    }

    fn record(&self, protein: &ProteinId, protein_dir: &Path, ligand: &str) -> MetricRecord {
        let affinity_file = Self::affinity_path(protein_dir, ligand);
        let affinity = read_boltz_affinity(&affinity_file).unwrap_or_else(|e| {
            log::warn!("Unreadable affinity {}: {}", affinity_file.display(), e);
            None
        });
        let structure = Self::prediction_dir(protein_dir, ligand).join(format!("{}_model_0.cif", ligand));
        let output_file = if structure.is_file() {
            MetricValue::Text(structure.display().to_string())
        } else {
            MetricValue::Missing
        };

        MetricRecord::new(NAME, protein, ligand)
            .with_affinity(affinity.and_then(|a| a.affinity))
            .with("binding_probability", affinity.and_then(|a| a.binding_probability))
            .with("output_file", output_file)
    }
}

impl DockingMethod for Boltz2 {
    fn name(&self) -> &str {
        NAME
    }

    fn preprocess(&mut self, protein_dir: &Path, ligand_dir: &Path) -> Result<(), MethodError> {
        require_dir(protein_dir)?;
        require_dir(ligand_dir)?;

        for pair in self.ctx.interactions.pairs() {
            let Some(pdb) = io::find_file_by_stem(protein_dir, pair.protein.as_str(), "pdb") else {
                log::warn!("No structure for protein {} in {}", pair.protein, protein_dir.display());
                continue;
            };
            let Some(sequence) = self.sequence(&pdb, &pair) else {
                continue;
            };
            let written = self.write_inputs(&pair, &sequence, ligand_dir)?;
            log::info!(
                "Boltz-2 inputs for {} / {}: {} new",
                pair.protein,
                pair.ligand_dataset,
                written
            );
        }
        Ok(())
    }

    fn dock_all(&mut self, ligand_dir: Option<&Path>) -> Result<DockingSummary, MethodError> {
        let input_root = self.input_dir();
        require_dir(&input_root)?;

        let method_dir = self.method_dir();
        let mut errors = ErrorLogger::new(&method_dir);
        let mut summary = DockingSummary::default();

        for protein in self.ctx.interactions.proteins() {
            let Some(inputs) = io::find_dir_by_name(&input_root, protein.as_str()) else {
                log::warn!("No Boltz-2 inputs for {}, skipping", protein);
                continue;
            };
            let out_dir = method_dir.join(protein.as_str());

            for input in io::list_files_with_extension(&inputs, "yaml") {
                let ligand = io::stem_of(&input);
                let affinity_file = Self::affinity_path(&out_dir, &ligand);
                if io::is_non_empty(&affinity_file) {
                    summary.skipped += 1;
                    continue;
                }
                fs::create_dir_all(&out_dir).map_err(IoError::from)?;

                let started = Instant::now();
                match self.ctx.executor.run(&self.command(&input, &out_dir)) {
                    Ok(_) => {
                        log::info!(
                            "Predicted {}/{} with boltz2 in {:.1}s",
                            protein,
                            ligand,
                            started.elapsed().as_secs_f64()
                        );
                        summary.docked += 1;
                    }
                    Err(e) => {
                        let outcome = record_pair_failure(
                            &mut errors,
                            e,
                            protein.as_str(),
                            &ligand,
                            ligand_dir,
                            None,
                            &[&affinity_file],
                        );
                        if let Err(fault) = outcome {
                            errors.save()?;
                            return Err(fault);
                        }
                        summary.failed += 1;
                    }
                }
            }
        }

        if !errors.is_empty() {
            errors.save()?;
        }
        log::info!(
            "boltz2: {} predicted, {} skipped, {} failed",
            summary.docked,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    fn extract_metrics(&self) -> Result<Vec<MetricRecord>, MethodError> {
        let method_dir = self.method_dir();
        let mut records = Vec::new();
        for protein_dir in io::list_subdirectories(&method_dir) {
            let protein = ProteinId::new(&io::stem_of(&protein_dir));
            for run in io::list_subdirectories(&protein_dir) {
                let dir_name = run
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(ligand) = dir_name.strip_prefix("boltz_results_") {
                    records.push(self.record(&protein, &protein_dir, ligand));
                }
            }
        }
        log::info!("Extracted {} boltz2 results", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BenchmarkConfig, SettingsMap};
    use crate::exec::CommandOutput;
    use crate::interaction::InteractionTable;
    use crate::methods::testing::{flag, ScriptedExecutor};
    use tempfile::tempdir;

    const PDB: &str = "\
ATOM      1  CA  ALA A   1       0.000   0.000   0.000  1.00  0.00           C
ATOM      2  CA  GLY A   2       1.000   0.000   0.000  1.00  0.00           C
ATOM      3  CA  TRP B   1       2.000   0.000   0.000  1.00  0.00           C
";

    fn context(base: &Path, executor: ScriptedExecutor) -> Arc<MethodContext> {
        let mut config = BenchmarkConfig::default();
        config.base_dir = base.to_path_buf();
        config.random_state = 7;
        let interactions: InteractionTable =
            serde_json::from_str(r#"{"protein": ["1ERE"], "ligand": ["ERalpha"], "safe_chain": ["A"]}"#).unwrap();
        Arc::new(MethodContext {
            config,
            interactions,
            protein_settings: SettingsMap::new(),
            box_settings: SettingsMap::new(),
            executor: Arc::new(executor),
        })
    }

    /// Writes the affinity and model files Boltz-2 would produce
    fn fake_boltz() -> ScriptedExecutor {
        ScriptedExecutor::new(|spec| {
            let input = Path::new(&spec.args[1]);
            let ligand = io::stem_of(input);
            let out_dir = Path::new(flag(spec, "--out_dir").unwrap());
            let predictions = Boltz2::prediction_dir(out_dir, &ligand);
            fs::create_dir_all(&predictions).unwrap();
            fs::write(
                predictions.join(format!("affinity_{}.json", ligand)),
                r#"{"affinity_pred_value": -1.5, "affinity_probability_binary": 0.75}"#,
            )
            .unwrap();
            fs::write(predictions.join(format!("{}_model_0.cif", ligand)), "data_model").unwrap();
            Ok(CommandOutput::default())
        })
    }

    fn inputs(base: &Path) -> (PathBuf, PathBuf) {
        let proteins = base.join("proteins");
        let ligands = base.join("ligands");
        fs::create_dir_all(&proteins).unwrap();
        fs::create_dir_all(&ligands).unwrap();
        fs::write(proteins.join("1ERE.pdb"), PDB).unwrap();
        fs::write(ligands.join("ERalpha.csv"), "id;smiles\nmol1;CCO\n").unwrap();
        (proteins, ligands)
    }

    #[test]
    fn test_preprocess_writes_yaml_input() {
        let dir = tempdir().unwrap();
        let (proteins, ligands) = inputs(dir.path());
        let mut boltz = Boltz2::new(context(dir.path(), fake_boltz()));
        boltz.preprocess(&proteins, &ligands).unwrap();

        let text = fs::read_to_string(boltz.input_dir().join("1ere/mol1.yaml")).unwrap();
        let yaml: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(yaml["version"].as_u64(), Some(1));
        assert_eq!(yaml["sequences"][0]["protein"]["sequence"].as_str(), Some("AG"));
        assert_eq!(yaml["sequences"][0]["protein"]["msa"].as_str(), Some("empty"));
        assert_eq!(yaml["sequences"][1]["ligand"]["smiles"].as_str(), Some("CCO"));
        assert_eq!(yaml["properties"][0]["affinity"]["binder"].as_str(), Some("B"));
    }

    #[test]
    fn test_dock_and_extract() {
        let dir = tempdir().unwrap();
        let (proteins, ligands) = inputs(dir.path());
        let ctx = context(dir.path(), fake_boltz());
        let mut boltz = Boltz2::new(ctx.clone());
        boltz.preprocess(&proteins, &ligands).unwrap();

        let summary = boltz.dock_all(Some(&ligands)).unwrap();
        assert_eq!(summary.docked, 1);
        assert_eq!(boltz.dock_all(Some(&ligands)).unwrap().skipped, 1);

        let records = boltz.extract_metrics().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ligand, "mol1");
        assert_eq!(records[0].affinity, Some(-1.5));
        assert_eq!(records[0].number("binding_probability"), Some(0.75));
        assert!(!records[0].get("output_file").is_missing());
    }

    #[test]
    fn test_command_carries_seed_and_flags() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), fake_boltz());
        let mut boltz = Boltz2::new(ctx);
        boltz.settings.use_potentials = true;
        let command = boltz.command(Path::new("in/mol1.yaml"), Path::new("out"));
        assert_eq!(command.program, "boltz");
        assert_eq!(command.args[0], "predict");
        assert_eq!(flag(&command, "--seed"), Some("7"));
        assert!(command.args.contains(&"--use_potentials".to_string()));
        assert!(!command.args.contains(&"--use_msa_server".to_string()));
    }

    #[test]
    fn test_dock_requires_inputs() {
        let dir = tempdir().unwrap();
        let mut boltz = Boltz2::new(context(dir.path(), fake_boltz()));
        assert!(matches!(boltz.dock_all(None), Err(MethodError::MissingDirectory(_))));
    }
}

//! AutoDock Vina family adapters (QuickVina 2, AutoDock Vina)
//!
//! Both tools share the command line and the pose table format, so one
//! adapter serves both; only the default binary and log handling differ.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::{record_pair_failure, require_dir, DockingMethod, DockingSummary, MethodContext, MethodError};
use crate::boxes::{BoxCalculator, BoxMethod};
use crate::config::MethodSettings;
use crate::error_log::ErrorLogger;
use crate::exec::CommandSpec;
use crate::ids::ProteinId;
use crate::io;
use crate::ligand::load_ligand_table;
use crate::metrics::{clash_score_files, read_vina_affinity, CLASH_CUTOFF};
use crate::prep::{LigandPreparator, ProteinPreparator};
use crate::results::{MetricRecord, MetricValue};

const DEFAULT_EXHAUSTIVENESS: u32 = 8;

/// Vina-style docking through an external binary
pub struct VinaFamily {
    name: &'static str,
    default_binary: &'static str,
    /// AutoDock Vina 1.2 dropped `--log`; its pose table only goes to stdout
    log_flag: bool,
    ctx: Arc<MethodContext>,
    settings: MethodSettings,
}

impl VinaFamily {
    pub fn qvina(ctx: Arc<MethodContext>) -> Self {
        Self::new("qvina", "qvina02", true, ctx)
    }

    pub fn vina(ctx: Arc<MethodContext>) -> Self {
        Self::new("vina", "vina", false, ctx)
    }

    fn new(name: &'static str, default_binary: &'static str, log_flag: bool, ctx: Arc<MethodContext>) -> Self {
        let settings = ctx.config.method(name);
        Self {
            name,
            default_binary,
            log_flag,
            ctx,
            settings,
        }
    }

    pub fn binary(&self) -> &str {
        self.settings.binary.as_deref().unwrap_or(self.default_binary)
    }

    pub fn exhaustiveness(&self) -> u32 {
        self.settings.exhaustiveness.unwrap_or(DEFAULT_EXHAUSTIVENESS)
    }

    /// `<output>/<method>`
    pub fn method_dir(&self) -> PathBuf {
        self.ctx.output_dir().join(self.name)
    }

    fn docking_env(&self) -> Option<&str> {
        self.settings
            .conda_env
            .as_deref()
            .or(self.ctx.config.environments.preprocessing.as_deref())
    }

    fn box_calculator(&self) -> BoxCalculator {
        BoxCalculator::new(
            &self.ctx.processed_dir(),
            self.ctx.box_settings.clone(),
            self.ctx.config.labox.clone(),
        )
    }

    fn uses_reference_ligand(&self) -> bool {
        let labox = &self.ctx.config.labox;
        [labox.method.as_str(), labox.fallback_method.as_str()]
            .iter()
            .any(|m| BoxMethod::parse(m) == Some(BoxMethod::Autobox))
    }

    fn prepare_proteins(&self, protein_dir: &Path) -> Result<(), MethodError> {
        let processed = self.ctx.processed_dir();
        let mut boxes = self.box_calculator();
        let mut proteins = ProteinPreparator::new(
            &processed,
            self.ctx.protein_settings.clone(),
            self.ctx.config.tools.clone(),
            self.ctx.config.environments.preprocessing.clone(),
            self.ctx.executor.clone(),
        );

        for protein in self.ctx.interactions.proteins() {
            let Some(pdb) = io::find_file_by_stem(protein_dir, protein.as_str(), "pdb") else {
                log::warn!("No structure for protein {} in {}", protein, protein_dir.display());
                continue;
            };
            let pair = self.ctx.interactions.pair_for_protein(&protein);

            match proteins.prepare(&pdb, pair.as_ref().and_then(|p| p.chain_id())) {
                Ok(receptor) => log::info!("Receptor for {}: {}", protein, receptor.display()),
                Err(e) if e.is_fault() => return Err(e.into()),
                Err(e) => {
                    log::warn!("Failed to prepare protein {}: {}", protein, e);
                    continue;
                }
            }

            let reference = match pair.as_ref().and_then(|p| p.ref_ligand.as_deref()) {
                Some(residue) if self.uses_reference_ligand() => boxes.reference_ligand(&pdb, residue)?,
                _ => None,
            };
            boxes.prepare(&pdb, reference.as_deref(), None)?;
        }

        proteins.save_manifest()?;
        Ok(())
    }

    fn prepare_ligands(&self, ligand_dir: &Path) -> Result<(), MethodError> {
        let mut ligands = LigandPreparator::new(
            &self.ctx.processed_dir(),
            self.ctx.config.tools.clone(),
            self.ctx.config.environments.preprocessing.clone(),
            self.ctx.executor.clone(),
            self.ctx.seed(),
        );

        for dataset in self.ctx.interactions.ligand_datasets() {
            let Some(table) = io::find_file_by_stem(ligand_dir, &dataset, "csv") else {
                log::warn!("No ligand table for {} in {}", dataset, ligand_dir.display());
                continue;
            };
            let records = match load_ligand_table(&table) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Skipping ligand table {}: {}", table.display(), e);
                    continue;
                }
            };
            for protein in self.ctx.interactions.proteins_for_ligand(&dataset) {
                ligands.prepare_table(&protein, &records)?;
            }
        }

        ligands.save_manifest()?;
        Ok(())
    }

    fn command(&self, receptor: &Path, ligand: &Path, out: &Path, log_file: &Path, box_args: Vec<String>) -> CommandSpec {
        let mut command = CommandSpec::new(self.binary())
            .args(["--receptor".to_string(), receptor.display().to_string()])
            .args(["--ligand".to_string(), ligand.display().to_string()])
            .args(box_args)
            .args(["--out".to_string(), out.display().to_string()]);
        if self.log_flag {
            command = command.args(["--log".to_string(), log_file.display().to_string()]);
        }
        command
            .args(["--exhaustiveness".to_string(), self.exhaustiveness().to_string()])
            .args(self.settings.extra_args.iter().cloned())
            .conda_env(self.docking_env())
            .timeout(self.settings.timeout())
    }

    fn record(&self, protein: &ProteinId, log_file: &Path, receptor: Option<&Path>) -> MetricRecord {
        let ligand = io::stem_of(log_file);
        let affinity = read_vina_affinity(log_file).unwrap_or_else(|e| {
            log::warn!("Unreadable log {}: {}", log_file.display(), e);
            None
        });

        let out = log_file.with_file_name(format!("{}_out.pdbqt", ligand));
        let clash = match receptor {
            Some(receptor) if io::is_non_empty(&out) => clash_score_files(&out, receptor, CLASH_CUTOFF)
                .unwrap_or_else(|e| {
                    log::debug!("No clash score for {}/{}: {}", protein, ligand, e);
                    None
                }),
            _ => None,
        };
        let output_file = if out.is_file() {
            MetricValue::Text(out.display().to_string())
        } else {
            MetricValue::Missing
        };

        MetricRecord::new(self.name, protein, &ligand)
            .with_affinity(affinity)
            .with("clash_score", clash.map(|c| c as f64))
            .with("output_file", output_file)
    }
}

impl DockingMethod for VinaFamily {
    fn name(&self) -> &str {
        self.name
    }

    fn preprocess(&mut self, protein_dir: &Path, ligand_dir: &Path) -> Result<(), MethodError> {
        require_dir(protein_dir)?;
        require_dir(ligand_dir)?;
        self.prepare_proteins(protein_dir)?;
        self.prepare_ligands(ligand_dir)
    }

    fn dock_all(&mut self, ligand_dir: Option<&Path>) -> Result<DockingSummary, MethodError> {
        let processed = self.ctx.processed_dir();
        let receptor_dir = processed.join("proteins");
        let ligand_root = processed.join("pdbqt");
        require_dir(&receptor_dir)?;
        require_dir(&ligand_root)?;

        let method_dir = self.method_dir();
        let boxes = self.box_calculator();
        let mut errors = ErrorLogger::new(&method_dir);
        let mut summary = DockingSummary::default();

        for protein in self.ctx.interactions.proteins() {
            let Some(receptor) = io::find_file_by_stem(&receptor_dir, protein.as_str(), "pdbqt") else {
                log::warn!("No receptor for {}, skipping", protein);
                continue;
            };
            let Some(search_box) = boxes.cached(protein.as_str())? else {
                log::warn!("No box for {}, skipping", protein);
                continue;
            };
            let Some(ligands) = io::find_dir_by_name(&ligand_root, protein.as_str()) else {
                log::warn!("No prepared ligands for {}, skipping", protein);
                continue;
            };

            let out_dir = method_dir.join(protein.as_str());
            for ligand in io::list_files_with_extension(&ligands, "pdbqt") {
                let name = io::stem_of(&ligand);
                let out = out_dir.join(format!("{}_out.pdbqt", name));
                let log_file = out_dir.join(format!("{}.log", name));
                if io::is_non_empty(&out) {
                    log::debug!("{}/{} already docked", protein, name);
                    summary.skipped += 1;
                    continue;
                }
                io::ensure_parent(&out)?;

                let command = self.command(&receptor, &ligand, &out, &log_file, search_box.vina_args());
                let started = Instant::now();
                match self.ctx.executor.run(&command) {
                    Ok(output) => {
                        if !log_file.exists() {
                            fs::write(&log_file, &output.stdout).map_err(io::IoError::from)?;
                        }
                        log::info!(
                            "Docked {}/{} with {} in {:.1}s",
                            protein,
                            name,
                            self.name,
                            started.elapsed().as_secs_f64()
                        );
                        summary.docked += 1;
                    }
                    Err(e) => {
                        let outcome = record_pair_failure(
                            &mut errors,
                            e,
                            protein.as_str(),
                            &name,
                            ligand_dir,
                            Some(&log_file),
                            &[&out],
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
            let path = errors.save()?;
            log::warn!("{} docking errors logged to {}", errors.records().len(), path.display());
        }
        log::info!(
            "{}: {} docked, {} skipped, {} failed",
            self.name,
            summary.docked,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    fn extract_metrics(&self) -> Result<Vec<MetricRecord>, MethodError> {
        let method_dir = self.method_dir();
        if !method_dir.is_dir() {
            log::warn!("No {} results in {}", self.name, method_dir.display());
            return Ok(Vec::new());
        }
        let receptor_dir = self.ctx.processed_dir().join("proteins");

        let jobs: Vec<(ProteinId, PathBuf, Option<PathBuf>)> = io::list_subdirectories(&method_dir)
            .into_iter()
            .flat_map(|dir| {
                let name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let protein = ProteinId::new(&name);
                let receptor = io::find_file_by_stem(&receptor_dir, protein.as_str(), "pdbqt");
                io::list_files_with_extension(&dir, "log")
                    .into_iter()
                    .map(move |log_file| (protein.clone(), log_file, receptor.clone()))
            })
            .collect();

        let records: Vec<MetricRecord> = jobs
            .par_iter()
            .map(|(protein, log_file, receptor)| self.record(protein, log_file, receptor.as_deref()))
            .collect();
        log::info!("Extracted {} {} results", records.len(), self.name);
        Ok(records)
    }
}

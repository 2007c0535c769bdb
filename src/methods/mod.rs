//! Docking method adapters
//!
//! Each method implements [`DockingMethod`]: preprocess inputs into its own
//! format, dock every pair of the interaction table, and read its results
//! back as [`MetricRecord`]s. Methods are created by name from a registry;
//! they share nothing but the [`MethodContext`].

pub mod boltz2;
pub mod vina;

pub use boltz2::Boltz2;
pub use vina::VinaFamily;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::boxes::BoxError;
use crate::config::{load_settings_file, BenchmarkConfig, ConfigError, SettingsMap};
use crate::error_log::{ErrorLogger, ErrorType};
use crate::exec::{CommandExecutor, ExecError};
use crate::interaction::InteractionTable;
use crate::io::IoError;
use crate::ligand::{self, LigandError};
use crate::prep::PrepError;
use crate::results::MetricRecord;

#[derive(Error, Debug)]
pub enum MethodError {
    #[error("Required directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    #[error("Box calculation failed: {0}")]
    Box(#[from] BoxError),

    #[error("Preparation failed: {0}")]
    Prep(#[from] PrepError),

    #[error(transparent)]
    Ligand(#[from] LigandError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to write method input: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] IoError),
}

impl MethodError {
    /// Configuration or environment faults, as opposed to bad individual inputs
    pub fn is_fault(&self) -> bool {
        match self {
            MethodError::MissingDirectory(_)
            | MethodError::ToolNotFound(_)
            | MethodError::Box(_)
            | MethodError::Config(_) => true,
            MethodError::Prep(e) => e.is_fault(),
            MethodError::Ligand(_) | MethodError::Yaml(_) | MethodError::Io(_) => false,
        }
    }
}

/// Counts reported by a docking pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DockingSummary {
    pub docked: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The contract every docking method implements
pub trait DockingMethod {
    /// Registry name, also used for output directories and metrics tables
    fn name(&self) -> &str;

    /// Prepare receptors, ligands and any method-specific inputs. Idempotent.
    fn preprocess(&mut self, protein_dir: &Path, ligand_dir: &Path) -> Result<(), MethodError>;

    /// Dock every pair, skipping pairs with existing output. Pair failures are
    /// logged to the error log; only faults are returned as errors.
    fn dock_all(&mut self, ligand_dir: Option<&Path>) -> Result<DockingSummary, MethodError>;

    /// Read results back. Unreadable results become missing values.
    fn extract_metrics(&self) -> Result<Vec<MetricRecord>, MethodError>;
}

/// Inputs shared by every method of a run
pub struct MethodContext {
    pub config: BenchmarkConfig,
    pub interactions: InteractionTable,
    pub protein_settings: SettingsMap,
    pub box_settings: SettingsMap,
    pub executor: Arc<dyn CommandExecutor>,
}

impl MethodContext {
    /// Load the interaction table and settings files named by the configuration
    pub fn load(config: BenchmarkConfig, executor: Arc<dyn CommandExecutor>) -> Result<Self, MethodError> {
        let interactions = InteractionTable::load(config.interaction_path())?;
        let protein_settings = load_settings_file(config.protein_settings_file.as_deref())?;
        let box_settings = match &config.box_settings_file {
            Some(path) => load_settings_file(Some(path))?,
            None => protein_settings.clone(),
        };
        Ok(Self {
            config,
            interactions,
            protein_settings,
            box_settings,
            executor,
        })
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.config.processed_path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.output_path()
    }

    pub fn seed(&self) -> u64 {
        self.config.random_state
    }
}

/// Fail with [`MethodError::MissingDirectory`] unless `dir` exists
pub fn require_dir(dir: &Path) -> Result<(), MethodError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(MethodError::MissingDirectory(dir.to_path_buf()))
    }
}

/// Record a failed pair: classify, attach SMILES and log tail, then drop
/// whatever partial output the tool left behind.
///
/// A missing executable is a fault and is returned instead.
pub fn record_pair_failure(
    errors: &mut ErrorLogger,
    error: ExecError,
    protein: &str,
    ligand: &str,
    ligand_dir: Option<&Path>,
    log_file: Option<&Path>,
    partial_outputs: &[&Path],
) -> Result<(), MethodError> {
    if let ExecError::NotFound { program } = error {
        return Err(MethodError::ToolNotFound(program));
    }

    let error_type = ErrorType::classify(&error);
    let smiles = ligand_dir.and_then(|dir| ligand::find_smiles(dir, ligand));
    let message = match error_type {
        ErrorType::Timeout => error.to_string(),
        _ => error.message(),
    };
    log::warn!("Error docking {}/{}: {}", protein, ligand, message.lines().next().unwrap_or_default());
    errors.log_error(protein, ligand, smiles, error_type, &message, log_file);

    for path in partial_outputs.iter().chain(log_file.as_ref()) {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                log::debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
    Ok(())
}

/// Creates a method from the shared context
pub type MethodConstructor = fn(Arc<MethodContext>) -> Box<dyn DockingMethod>;

fn make_qvina(ctx: Arc<MethodContext>) -> Box<dyn DockingMethod> {
    Box::new(VinaFamily::qvina(ctx))
}

fn make_vina(ctx: Arc<MethodContext>) -> Box<dyn DockingMethod> {
    Box::new(VinaFamily::vina(ctx))
}

fn make_boltz2(ctx: Arc<MethodContext>) -> Box<dyn DockingMethod> {
    Box::new(Boltz2::new(ctx))
}

/// Method name -> constructor
pub fn registry() -> BTreeMap<&'static str, MethodConstructor> {
    let mut methods: BTreeMap<&'static str, MethodConstructor> = BTreeMap::new();
    methods.insert("qvina", make_qvina);
    methods.insert("vina", make_vina);
    methods.insert("boltz2", make_boltz2);
    methods
}

/// Names of every registered method
pub fn available_methods() -> Vec<&'static str> {
    registry().keys().copied().collect()
}

/// Instantiate a method by (case-insensitive) name
pub fn create(name: &str, ctx: Arc<MethodContext>) -> Option<Box<dyn DockingMethod>> {
    registry()
        .get(name.trim().to_lowercase().as_str())
        .map(|constructor| constructor(ctx))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor for adapter tests

    use crate::exec::{CommandExecutor, CommandOutput, CommandSpec, ExecError};
    use std::sync::Mutex;
    use std::time::Duration;

    type Script = dyn Fn(&CommandSpec) -> Result<CommandOutput, ExecError> + Send + Sync;

    /// Runs a closure instead of a process and remembers every invocation
    pub struct ScriptedExecutor {
        script: Box<Script>,
        pub calls: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedExecutor {
        pub fn new<F>(script: F) -> Self
        where
            F: Fn(&CommandSpec) -> Result<CommandOutput, ExecError> + Send + Sync + 'static,
        {
            Self {
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CommandExecutor for ScriptedExecutor {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
            self.calls.lock().unwrap().push(spec.clone());
            (self.script)(spec)
        }
    }

    /// Value following a flag
    pub fn flag<'a>(spec: &'a CommandSpec, name: &str) -> Option<&'a str> {
        spec.args
            .iter()
            .position(|a| a == name)
            .and_then(|i| spec.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn timeout(program: &str) -> ExecError {
        ExecError::Timeout {
            program: program.to_string(),
            timeout: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_log::{load_records, ERROR_LOG_FILE};
    use crate::exec::SystemExecutor;
    use tempfile::tempdir;

    #[test]
    fn test_registry() {
        assert_eq!(available_methods(), vec!["boltz2", "qvina", "vina"]);
        let ctx = Arc::new(MethodContext {
            config: BenchmarkConfig::default(),
            interactions: InteractionTable::default(),
            protein_settings: SettingsMap::new(),
            box_settings: SettingsMap::new(),
            executor: Arc::new(SystemExecutor::new()),
        });
        assert_eq!(create("QVina", ctx.clone()).unwrap().name(), "qvina");
        assert!(create("unimol", ctx).is_none());
    }

    #[test]
    fn test_fault_classes() {
        assert!(MethodError::MissingDirectory(PathBuf::from("x")).is_fault());
        assert!(MethodError::ToolNotFound("qvina02".to_string()).is_fault());
        assert!(!MethodError::Io(IoError::Parse { line: 1, message: String::new() }).is_fault());
    }

    #[test]
    fn test_record_pair_failure() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("mol1_out.pdbqt");
        let log_file = dir.path().join("mol1.log");
        fs::write(&output, "partial").unwrap();
        fs::write(&log_file, "Parse error on line 3").unwrap();

        let mut errors = ErrorLogger::new(dir.path());
        let error = ExecError::Failed {
            program: "qvina02".to_string(),
            code: Some(1),
            stdout: String::new(),
            stderr: "Parse error on line 3".to_string(),
        };
        record_pair_failure(&mut errors, error, "1ere", "mol1", None, Some(&log_file), &[&output]).unwrap();
        errors.save().unwrap();

        assert!(!output.exists());
        assert!(!log_file.exists());
        let records = load_records(dir.path().join(ERROR_LOG_FILE)).unwrap();
        assert_eq!(records[0].error_type, ErrorType::ParseError);
        assert_eq!(records[0].log_snippet.as_deref(), Some("Parse error on line 3"));

        let missing = ExecError::NotFound {
            program: "qvina02".to_string(),
        };
        let err = record_pair_failure(&mut errors, missing, "1ere", "mol2", None, None, &[]).unwrap_err();
        assert!(err.is_fault());
    }
}

//! Structure preparation through external toolchains
//!
//! Receptors and ligands are converted by external tools (Meeko, RDKit, Open
//! Babel). Each conversion is an ordered list of strategies; the first one
//! that leaves a non-empty output file wins and is recorded as provenance.

pub mod ligand;
pub mod protein;

pub use ligand::LigandPreparator;
pub use protein::ProteinPreparator;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::exec::{CommandExecutor, CommandSpec, ExecError};
use crate::io::IoError;
use crate::structure::StructureError;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Input not found: {0}")]
    MissingInput(PathBuf),

    #[error("No preparation tool available for {artifact}: {source}")]
    ToolMissing {
        artifact: PathBuf,
        #[source]
        source: ExecError,
    },

    #[error("All strategies failed for {artifact}: {}", .attempts.join("; "))]
    Failed {
        artifact: PathBuf,
        attempts: Vec<String>,
    },

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Io(#[from] IoError),
}

impl PrepError {
    /// Faults stop the whole preparation stage rather than a single item
    pub fn is_fault(&self) -> bool {
        matches!(self, PrepError::MissingInput(_) | PrepError::ToolMissing { .. })
    }
}

/// One way of producing an artifact
pub struct Strategy {
    pub name: &'static str,
    pub command: CommandSpec,
}

impl Strategy {
    pub fn new(name: &'static str, command: CommandSpec) -> Self {
        Self { name, command }
    }
}

/// Try each strategy in order until one writes a non-empty `output`.
///
/// Returns the name of the winning strategy. When every strategy failed
/// because its program is not installed the result is [`PrepError::ToolMissing`].
pub fn run_strategies(
    executor: &dyn CommandExecutor,
    output: &Path,
    strategies: Vec<Strategy>,
) -> Result<&'static str, PrepError> {
    let mut attempts = Vec::new();
    let mut missing = None;
    let mut missing_count = 0;
    let total = strategies.len();

    for strategy in strategies {
        match executor.run(&strategy.command) {
            Ok(_) if crate::io::is_non_empty(output) => return Ok(strategy.name),
            Ok(_) => attempts.push(format!("{}: produced an empty file", strategy.name)),
            Err(e @ ExecError::NotFound { .. }) => {
                attempts.push(format!("{}: {}", strategy.name, e));
                missing_count += 1;
                missing = Some(e);
            }
            Err(e) => attempts.push(format!("{}: {}", strategy.name, e.message().trim())),
        }
        log::debug!("{}", attempts.last().map(String::as_str).unwrap_or_default());
    }

    match missing {
        Some(source) if missing_count == total => {
            Err(PrepError::ToolMissing {
                artifact: output.to_path_buf(),
                source,
            })
        }
        _ => Err(PrepError::Failed {
            artifact: output.to_path_buf(),
            attempts,
        }),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor shared by the preparation tests

    use crate::exec::{CommandExecutor, CommandOutput, CommandSpec, ExecError};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Writes a fixed payload to the path following `output_flag` for programs in `working`
    pub struct FakeTools {
        pub working: Vec<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeTools {
        pub fn new(working: &[&str]) -> Self {
            Self {
                working: working.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandExecutor for FakeTools {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
            self.calls.lock().unwrap().push(spec.program.clone());
            if !self.working.contains(&spec.program) {
                return Err(ExecError::NotFound {
                    program: spec.program.clone(),
                });
            }
            let output = spec
                .args
                .iter()
                .rev()
                .map(PathBuf::from)
                .find(|a| matches!(a.extension().and_then(|e| e.to_str()), Some("sdf" | "pdbqt")))
                .unwrap();
            fs::create_dir_all(output.parent().unwrap()).unwrap();
            fs::write(&output, format!("made by {}\n", spec.program)).unwrap();
            Ok(CommandOutput::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeTools;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_working_strategy_wins() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("x.pdbqt");
        let tools = FakeTools::new(&["obabel"]);
        let name = run_strategies(
            &tools,
            &out,
            vec![
                Strategy::new("meeko", CommandSpec::new("meeko").args(["-p", out.to_str().unwrap()])),
                Strategy::new("obabel", CommandSpec::new("obabel").args(["in.pdb", "-O", out.to_str().unwrap()])),
            ],
        )
        .unwrap();
        assert_eq!(name, "obabel");
        assert_eq!(tools.calls(), vec!["meeko".to_string(), "obabel".to_string()]);
    }

    #[test]
    fn test_all_missing_is_fault() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("x.pdbqt");
        let tools = FakeTools::new(&[]);
        let err = run_strategies(
            &tools,
            &out,
            vec![Strategy::new("obabel", CommandSpec::new("obabel").args(["in.pdb", "-O", "x.pdbqt"]))],
        )
        .unwrap_err();
        assert!(err.is_fault());
    }
}

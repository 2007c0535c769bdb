//! Benchmark configuration
//!
//! Configuration is read from YAML or JSON (chosen by file extension). Every
//! field has a default so a partial file, or no file at all, is valid; the CLI
//! then overrides individual fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ids::CaseInsensitiveLookup;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported settings file format: {0}")]
    UnsupportedFormat(String),
}

/// Box calculation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaboxConfig {
    /// Primary strategy: "labox", "autobox", anything else means fallback
    pub method: String,

    /// Used when the primary strategy does not apply: "autobox" or "default"
    pub fallback_method: String,

    /// Multiplier applied to the coordinate extent
    pub scale: f64,

    /// Lower bound for every box edge (Angstroms)
    pub min_size: f64,
}

impl Default for LaboxConfig {
    fn default() -> Self {
        Self {
            method: "labox".to_string(),
            fallback_method: "default".to_string(),
            scale: 2.0,
            min_size: 4.0,
        }
    }
}

/// Per-protein overrides from the protein/box settings files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProteinSettings {
    pub chain: Option<String>,
    pub include_ligands: bool,
    pub include_cofactors: bool,
    pub include_waters: bool,
    pub scale: Option<f64>,
    pub min_size: Option<f64>,
}

impl ProteinSettings {
    /// Chain letter, if one is configured
    pub fn chain_id(&self) -> Option<char> {
        self.chain
            .as_deref()
            .and_then(|c| c.trim().chars().next())
    }
}

/// Settings map keyed by raw protein name
pub type SettingsMap = BTreeMap<String, ProteinSettings>;

/// Named conda environments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environments {
    /// Environment for structure preparation tools
    pub preprocessing: Option<String>,
}

/// External preparation toolchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Python interpreter used for the RDKit embedding helper
    pub python: String,

    /// Open Babel executable (fallback for every conversion)
    pub obabel: String,

    /// Meeko ligand preparation CLI
    pub meeko_ligand: String,

    /// Meeko receptor preparation CLI
    pub meeko_receptor: String,

    /// Try RDKit before Open Babel for SMILES -> 3D
    pub use_rdkit: bool,

    /// Try Meeko before Open Babel for PDBQT conversion
    pub use_meeko: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            obabel: "obabel".to_string(),
            meeko_ligand: "mk_prepare_ligand.py".to_string(),
            meeko_receptor: "mk_prepare_receptor.py".to_string(),
            use_rdkit: true,
            use_meeko: true,
        }
    }
}

/// Settings for a single docking method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSettings {
    /// Executable to invoke
    pub binary: Option<String>,

    /// Search exhaustiveness (Vina family)
    pub exhaustiveness: Option<u32>,

    /// Per-invocation timeout in seconds; unset means no limit
    pub docking_timeout: Option<f64>,

    /// Conda environment for this method's tool
    pub conda_env: Option<String>,

    /// Boltz-2: query the MSA server
    pub use_msa_server: bool,

    /// Boltz-2: inference-time potentials
    pub use_potentials: bool,

    /// Appended verbatim to every invocation
    pub extra_args: Vec<String>,
}

impl MethodSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.docking_timeout
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Top-level benchmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Root for output and processed files
    pub base_dir: PathBuf,

    /// Directory containing protein `.pdb` files
    pub protein_dir: PathBuf,

    /// Directory containing ligand `.csv` tables
    pub ligand_dir: PathBuf,

    /// Results directory, relative to `base_dir`
    pub output_dir: PathBuf,

    /// Prepared structures, relative to `base_dir`
    pub processed_dir: PathBuf,

    /// Seed for every probabilistic preparation step
    pub random_state: u64,

    /// Methods to run, in order
    pub methods: Vec<String>,

    /// Interaction table; defaults to `<base_dir>/config/interaction_protein_ligand.json`
    pub interaction_file: Option<PathBuf>,

    pub protein_settings_file: Option<PathBuf>,
    pub box_settings_file: Option<PathBuf>,

    pub labox: LaboxConfig,
    pub environments: Environments,
    pub tools: ToolsConfig,

    /// Per-method settings keyed by method name
    pub method_settings: BTreeMap<String, MethodSettings>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            protein_dir: PathBuf::from("data/proteins"),
            ligand_dir: PathBuf::from("data/ligands"),
            output_dir: PathBuf::from("results"),
            processed_dir: PathBuf::from("processed"),
            random_state: 42,
            methods: vec!["qvina".to_string()],
            interaction_file: None,
            protein_settings_file: None,
            box_settings_file: None,
            labox: LaboxConfig::default(),
            environments: Environments::default(),
            tools: ToolsConfig::default(),
            method_settings: BTreeMap::new(),
        }
    }
}

impl BenchmarkConfig {
    /// Load a configuration file (YAML or JSON)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_structured(path.as_ref())
    }

    /// Absolute-ish results directory
    pub fn output_path(&self) -> PathBuf {
        self.base_dir.join(&self.output_dir)
    }

    /// Absolute-ish processed directory
    pub fn processed_path(&self) -> PathBuf {
        self.base_dir.join(&self.processed_dir)
    }

    pub fn interaction_path(&self) -> PathBuf {
        self.interaction_file
            .clone()
            .unwrap_or_else(|| self.base_dir.join("config").join("interaction_protein_ligand.json"))
    }

    /// Settings for one method; missing entries yield defaults
    pub fn method(&self, name: &str) -> MethodSettings {
        self.method_settings
            .get_ignore_case(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutable settings for one method, created on first use
    pub fn method_mut(&mut self, name: &str) -> &mut MethodSettings {
        self.method_settings.entry(name.to_string()).or_default()
    }

    /// Merge a separate methods file (entries there replace inline ones)
    pub fn merge_methods_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let methods: BTreeMap<String, MethodSettings> = load_structured(path.as_ref())?;
        self.method_settings.extend(methods);
        Ok(())
    }
}

/// Load a per-protein settings file. A missing path or file yields an empty map.
pub fn load_settings_file(path: Option<&Path>) -> Result<SettingsMap, ConfigError> {
    match path {
        Some(path) if path.exists() => load_structured(path),
        Some(path) => {
            log::warn!("Settings file {} not found, using defaults", path.display());
            Ok(SettingsMap::new())
        }
        None => Ok(SettingsMap::new()),
    }
}

fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
        "json" => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
        other => Err(ConfigError::UnsupportedFormat(format!(".{}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.random_state, 42);
        assert_eq!(config.labox.scale, 2.0);
        assert_eq!(config.labox.min_size, 4.0);
        assert_eq!(config.output_path(), PathBuf::from("./results"));
        assert_eq!(
            config.interaction_path(),
            PathBuf::from("./config/interaction_protein_ligand.json")
        );
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "base_dir: /tmp/bench\nrandom_state: 7\nmethods: [qvina, boltz2]\nlabox:\n  min_size: 6.0\nmethod_settings:\n  qvina:\n    exhaustiveness: 16\n    docking_timeout: 300\n",
        )
        .unwrap();

        let config = BenchmarkConfig::load(&path).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/tmp/bench"));
        assert_eq!(config.random_state, 7);
        assert_eq!(config.methods, vec!["qvina", "boltz2"]);
        assert_eq!(config.labox.min_size, 6.0);
        assert_eq!(config.labox.scale, 2.0);
        let qvina = config.method("QVina");
        assert_eq!(qvina.exhaustiveness, Some(16));
        assert_eq!(qvina.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.method("vina"), MethodSettings::default());
    }

    #[test]
    fn test_settings_file_formats() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("proteins.json");
        fs::write(&json, r#"{"1ERE": {"chain": "B", "include_waters": true}}"#).unwrap();
        let settings = load_settings_file(Some(&json)).unwrap();
        let entry = settings.get_ignore_case("1ere").unwrap();
        assert_eq!(entry.chain_id(), Some('B'));
        assert!(entry.include_waters);

        let toml = dir.path().join("proteins.toml");
        fs::write(&toml, "x = 1").unwrap();
        assert!(matches!(
            load_settings_file(Some(&toml)),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        assert!(load_settings_file(Some(&dir.path().join("missing.yaml")))
            .unwrap()
            .is_empty());
        assert!(load_settings_file(None).unwrap().is_empty());
    }
}

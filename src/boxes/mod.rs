//! Docking search boxes
//!
//! A box is computed at most once per protein and cached as
//! `<processed>/boxes/<id>.json`; `boxes_summary.json` maps every computed
//! protein to its box. Strategies:
//!
//! - `labox`: bounding box of the (cleaned) protein, scaled and clamped to a minimum edge
//! - `autobox`: centred on a reference ligand, twice its extent
//! - `default`: a fixed 20 Å cube at the origin

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{LaboxConfig, SettingsMap};
use crate::ids::{canonical, CaseInsensitiveLookup, ProteinId};
use crate::io::{self, IoError};
use crate::math::{round3, round_to};
use crate::provenance::{ArtifactKind, ProvenanceLog};
use crate::structure::{Structure, StructureError};

const SUMMARY_FILE: &str = "boxes_summary.json";
const PROVENANCE_FILE: &str = "box_provenance.json";

#[derive(Error, Debug)]
pub enum BoxError {
    #[error("No coordinates found for box calculation in {0}")]
    NoCoordinates(PathBuf),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// Axis-aligned search volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSpec {
    pub center: [f64; 3],
    pub size: [f64; 3],
}

impl Default for BoxSpec {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0, 0.0],
            size: [20.0, 20.0, 20.0],
        }
    }
}

impl BoxSpec {
    /// Box around a coordinate extent: midpoint centre, scaled edges no
    /// smaller than `min_size`. Returns `None` for an empty set.
    pub fn from_extent(coordinates: &[Vector3<f64>], scale: f64, min_size: f64) -> Option<Self> {
        let (min, max) = extent(coordinates)?;
        let center = (min + max) / 2.0;
        let size = (max - min).abs() * scale;
        Some(Self {
            center: round3(&center),
            size: round3(&size).map(|edge| edge.max(min_size)),
        })
    }

    /// Box around a reference ligand: centroid centre, twice the extent
    pub fn around_ligand(coordinates: &[Vector3<f64>]) -> Option<Self> {
        let (min, max) = extent(coordinates)?;
        let centroid = coordinates.iter().sum::<Vector3<f64>>() / coordinates.len() as f64;
        Some(Self {
            center: round3(&centroid),
            size: round3(&((max - min) * 2.0)),
        })
    }

    /// Vina-style command line arguments
    pub fn vina_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(12);
        for (axis, value) in ["x", "y", "z"].iter().zip(self.center) {
            args.push(format!("--center_{}", axis));
            args.push(round_to(value, 3).to_string());
        }
        for (axis, value) in ["x", "y", "z"].iter().zip(self.size) {
            args.push(format!("--size_{}", axis));
            args.push(round_to(value, 3).to_string());
        }
        args
    }
}

fn extent(coordinates: &[Vector3<f64>]) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let first = coordinates.first()?;
    Some(
        coordinates
            .iter()
            .fold((*first, *first), |(min, max), c| (min.inf(c), max.sup(c))),
    )
}

/// Box computation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxMethod {
    Labox,
    Autobox,
    Default,
}

impl BoxMethod {
    /// Parse a strategy name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "labox" => Some(BoxMethod::Labox),
            "autobox" => Some(BoxMethod::Autobox),
            "default" => Some(BoxMethod::Default),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoxMethod::Labox => "labox",
            BoxMethod::Autobox => "autobox",
            BoxMethod::Default => "default",
        }
    }
}

/// Computes and caches boxes under `<processed>/boxes`
pub struct BoxCalculator {
    processed_dir: PathBuf,
    settings: SettingsMap,
    config: LaboxConfig,
    provenance: ProvenanceLog,
}

impl BoxCalculator {
    pub fn new(processed_dir: &Path, settings: SettingsMap, config: LaboxConfig) -> Self {
        let box_dir = processed_dir.join("boxes");
        Self {
            processed_dir: processed_dir.to_path_buf(),
            settings,
            config,
            provenance: ProvenanceLog::new(box_dir.join(PROVENANCE_FILE)),
        }
    }

    pub fn box_dir(&self) -> PathBuf {
        self.processed_dir.join("boxes")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.box_dir().join(SUMMARY_FILE)
    }

    /// Canonical box file for a protein
    pub fn box_path(&self, protein: &ProteinId) -> PathBuf {
        self.box_dir().join(format!("{}.json", protein))
    }

    /// Existing box file for a raw protein name: exact name, canonical name,
    /// then any case variant
    pub fn find_box_file(&self, raw_name: &str) -> Option<PathBuf> {
        let dir = self.box_dir();
        let exact = dir.join(format!("{}.json", raw_name));
        if exact.is_file() {
            return Some(exact);
        }
        io::find_file_by_stem(&dir, &canonical(raw_name), "json")
            .filter(|path| !path.ends_with(SUMMARY_FILE) && !path.ends_with(PROVENANCE_FILE))
    }

    /// Cached box for a protein, if one was computed before
    pub fn cached(&self, raw_name: &str) -> Result<Option<BoxSpec>, BoxError> {
        match self.find_box_file(raw_name) {
            Some(path) => Ok(Some(io::read_json(path)?)),
            None => Ok(None),
        }
    }

    /// Return the box for a protein, computing and persisting it on first use.
    ///
    /// `method` overrides the configured primary strategy. An unknown method,
    /// or `autobox` without a ligand, uses the configured fallback.
    pub fn prepare(
        &mut self,
        protein_path: &Path,
        ligand_path: Option<&Path>,
        method: Option<&str>,
    ) -> Result<BoxSpec, BoxError> {
        let raw_name = io::stem_of(protein_path);
        if let Some(cached) = self.cached(&raw_name)? {
            log::debug!("Using cached box for {}", raw_name);
            return Ok(cached);
        }

        let protein = ProteinId::new(&raw_name);
        let requested = method.unwrap_or(&self.config.method);
        let (spec, strategy, source) = match (BoxMethod::parse(requested), ligand_path) {
            (Some(BoxMethod::Labox), _) => {
                let (spec, source) = self.labox(protein_path)?;
                (spec, BoxMethod::Labox, Some(source))
            }
            (Some(BoxMethod::Autobox), Some(ligand)) => {
                let (spec, strategy) = self.autobox(ligand)?;
                (spec, strategy, Some(ligand.to_path_buf()))
            }
            _ => match (BoxMethod::parse(&self.config.fallback_method), ligand_path) {
                (Some(BoxMethod::Autobox), Some(ligand)) => {
                    let (spec, strategy) = self.autobox(ligand)?;
                    (spec, strategy, Some(ligand.to_path_buf()))
                }
                _ => (BoxSpec::default(), BoxMethod::Default, None),
            },
        };

        let box_path = self.box_path(&protein);
        io::write_json(&box_path, &spec)?;
        self.update_summary(&protein, &spec)?;
        self.provenance
            .record(&box_path, ArtifactKind::Box, strategy.as_str(), source.as_deref());
        self.provenance.save()?;

        log::info!(
            "Box for {} ({}): center {:?}, size {:?}",
            protein,
            strategy.as_str(),
            spec.center,
            spec.size
        );
        Ok(spec)
    }

    fn labox(&self, protein_path: &Path) -> Result<(BoxSpec, PathBuf), BoxError> {
        let raw_name = io::stem_of(protein_path);
        let overrides = self.settings.get_ignore_case(&raw_name).cloned().unwrap_or_default();
        let scale = overrides.scale.unwrap_or(self.config.scale);
        let min_size = overrides.min_size.unwrap_or(self.config.min_size);

        let source = self.locate_processed_protein(protein_path);
        let coordinates = if source.is_file() {
            io::read_coordinates(&source)?
        } else {
            Vec::new()
        };

        let spec = BoxSpec::from_extent(&coordinates, scale, min_size)
            .ok_or_else(|| BoxError::NoCoordinates(source.clone()))?;
        Ok((spec, source))
    }

    fn autobox(&self, ligand_path: &Path) -> Result<(BoxSpec, BoxMethod), BoxError> {
        let coordinates = if ligand_path.is_file() {
            io::read_coordinates(ligand_path)?
        } else {
            Vec::new()
        };
        match BoxSpec::around_ligand(&coordinates) {
            Some(spec) => Ok((spec, BoxMethod::Autobox)),
            None => {
                log::warn!("No ligand coordinates in {}, using default box", ligand_path.display());
                Ok((BoxSpec::default(), BoxMethod::Default))
            }
        }
    }

    /// The most processed structure available: the cleaned chain file if one
    /// exists (configured chain first), else the raw input
    pub fn locate_processed_protein(&self, protein_path: &Path) -> PathBuf {
        let cleaned_dir = self.processed_dir.join("proteins").join("cleaned");
        let raw_name = io::stem_of(protein_path);
        let protein = canonical(&raw_name);
        let chain = self
            .settings
            .get_ignore_case(&raw_name)
            .and_then(|s| s.chain_id())
            .unwrap_or('A');

        for name in [&raw_name, &protein] {
            let candidate = cleaned_dir.join(format!("{}_chain{}.pdb", name, chain));
            if candidate.is_file() {
                return candidate;
            }
        }

        io::list_files_with_extension(&cleaned_dir, "pdb")
            .into_iter()
            .find(|path| {
                io::stem_of(path)
                    .rsplit_once("_chain")
                    .map(|(name, _)| canonical(name) == protein)
                    .unwrap_or(false)
            })
            .unwrap_or_else(|| protein_path.to_path_buf())
    }

    /// Extract a co-crystallised ligand from the raw protein file for autobox.
    ///
    /// Written once to `<processed>/ref_ligands/<id>_<RES>.pdb`; `None` when
    /// the residue is absent.
    pub fn reference_ligand(&mut self, protein_path: &Path, residue: &str) -> Result<Option<PathBuf>, BoxError> {
        let protein = ProteinId::new(&io::stem_of(protein_path));
        let residue = residue.trim().to_uppercase();
        let path = self
            .processed_dir
            .join("ref_ligands")
            .join(format!("{}_{}.pdb", protein, residue));
        if io::is_non_empty(&path) {
            return Ok(Some(path));
        }
        if !protein_path.is_file() {
            return Ok(None);
        }

        let structure = Structure::from_file(protein_path)?;
        let ligand = structure.residues_named(&residue);
        if ligand.is_empty() {
            log::warn!("Reference ligand {} not found in {}", residue, protein_path.display());
            return Ok(None);
        }

        io::write_atom_records(&ligand.atoms, &path)?;
        self.provenance
            .record(&path, ArtifactKind::ReferenceLigand, &residue, Some(protein_path));
        Ok(Some(path))
    }

    /// Record a box in the summary, dropping case-variant keys for the same protein
    fn update_summary(&self, protein: &ProteinId, spec: &BoxSpec) -> Result<(), BoxError> {
        let path = self.summary_path();
        let mut summary: BTreeMap<String, BoxSpec> = if path.exists() {
            io::read_json(&path).unwrap_or_else(|e| {
                log::warn!("Rewriting unreadable box summary {}: {}", path.display(), e);
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };

        summary.retain(|key, _| !protein.matches(key) || key == protein.as_str());
        summary.insert(protein.to_string(), *spec);
        io::write_json(&path, &summary)?;
        Ok(())
    }
}

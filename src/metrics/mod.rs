//! Metric extraction from docking tool output

pub mod boltz;
pub mod clash;
pub mod vina;

pub use boltz::{read_boltz_affinity, BoltzAffinity};
pub use clash::{clash_score, clash_score_files, CLASH_CUTOFF};
pub use vina::{best_pose, parse_vina_poses, read_vina_affinity, Pose};

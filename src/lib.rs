//! dockbench: a reproducible benchmark harness for molecular docking methods
//!
//! This library drives external docking tools (QuickVina 2, AutoDock Vina,
//! Boltz-2) over a shared set of protein/ligand pairs, caches the docking
//! search boxes it derives from protein coordinates, and aggregates the
//! per-method results into comparable statistics.

pub mod atom;
pub mod boxes;
pub mod config;
pub mod error_log;
pub mod exec;
pub mod ids;
pub mod interaction;
pub mod io;
pub mod ligand;
pub mod math;
pub mod methods;
pub mod metrics;
pub mod pipeline;
pub mod prep;
pub mod provenance;
pub mod report;
pub mod results;
pub mod stats;
pub mod structure;

// Re-export commonly used types and functions
pub use boxes::{BoxCalculator, BoxSpec};
pub use config::BenchmarkConfig;
pub use ids::ProteinId;
pub use methods::DockingMethod;
pub use pipeline::{Pipeline, RunSummary, Stage};
pub use results::{MetricRecord, MetricsByMethod};
pub use stats::{compare_methods, CompareOptions, ComparisonTable};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

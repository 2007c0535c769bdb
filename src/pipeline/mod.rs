//! Benchmark orchestration
//!
//! A run moves through `Init → Preprocessing → Docking → MetricExtraction → Done`.
//! Each stage runs over every method before the next one starts. A method that
//! fails a stage is logged and recorded; the remaining methods and stages still
//! run.

use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::BenchmarkConfig;
use crate::exec::CommandExecutor;
use crate::methods::{self, DockingMethod, DockingSummary, MethodContext, MethodError};
use crate::report::ReportGenerator;
use crate::results::{ResultsCollector, ResultsError};
use crate::stats::StatsError;

/// Errors that end a run. Method failures never do.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to set up the benchmark: {0}")]
    Setup(#[from] MethodError),

    #[error(transparent)]
    Results(#[from] ResultsError),

    #[error(transparent)]
    Report(#[from] StatsError),
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Preprocessing,
    Docking,
    MetricExtraction,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Preprocessing => "preprocessing",
            Stage::Docking => "docking",
            Stage::MetricExtraction => "metric extraction",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A method that failed one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub method: String,
    pub message: String,
}

/// What a run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub methods: Vec<String>,
    pub docking: BTreeMap<String, DockingSummary>,
    pub records: BTreeMap<String, usize>,
    pub failures: Vec<StageFailure>,
    pub metrics_table: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

impl RunSummary {
    pub fn failed(&self, stage: Stage, method: &str) -> bool {
        self.failures
            .iter()
            .any(|f| f.stage == stage && f.method == method)
    }
}

/// Render an error with its whole source chain
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Drives every selected method through the three stages
pub struct Pipeline {
    ctx: Arc<MethodContext>,
    methods: Vec<Box<dyn DockingMethod>>,
    stage: Stage,
}

impl Pipeline {
    /// Load shared inputs and instantiate the configured methods.
    /// Unknown method names are warned about and skipped.
    pub fn new(config: BenchmarkConfig, executor: Arc<dyn CommandExecutor>) -> Result<Self, PipelineError> {
        let ctx = Arc::new(MethodContext::load(config, executor)?);
        let mut selected = Vec::new();
        for name in &ctx.config.methods {
            match methods::create(name, ctx.clone()) {
                Some(method) => selected.push(method),
                None => warn!(
                    "Unknown method {} (available: {})",
                    name,
                    methods::available_methods().join(", ")
                ),
            }
        }
        Ok(Self::with_methods(ctx, selected))
    }

    pub fn with_methods(ctx: Arc<MethodContext>, methods: Vec<Box<dyn DockingMethod>>) -> Self {
        Self {
            ctx,
            methods,
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name().to_string()).collect()
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        info!("=== {} ===", stage);
    }

    /// Run all stages to completion
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let config = &self.ctx.config;
        let protein_dir = config.protein_dir.clone();
        let ligand_dir = config.ligand_dir.clone();
        let output_dir = self.ctx.output_dir();
        info!(
            "Benchmarking {} with seed {} into {}",
            self.method_names().join(", "),
            self.ctx.seed(),
            output_dir.display()
        );

        let mut summary = RunSummary {
            methods: self.method_names(),
            ..RunSummary::default()
        };

        self.enter(Stage::Preprocessing);
        for method in self.methods.iter_mut() {
            info!("Preprocessing for {}", method.name());
            if let Err(message) = isolated(|| method.preprocess(&protein_dir, &ligand_dir)) {
                record_failure(&mut summary, Stage::Preprocessing, method.name(), message);
            }
        }

        self.enter(Stage::Docking);
        for method in self.methods.iter_mut() {
            info!("Docking with {}", method.name());
            match isolated(|| method.dock_all(Some(&ligand_dir))) {
                Ok(result) => {
                    summary.docking.insert(method.name().to_string(), result);
                }
                Err(message) => record_failure(&mut summary, Stage::Docking, method.name(), message),
            }
        }

        self.enter(Stage::MetricExtraction);
        let mut collector = ResultsCollector::new(&output_dir);
        for method in self.methods.iter() {
            info!("Extracting metrics for {}", method.name());
            let records = match isolated(|| method.extract_metrics()) {
                Ok(records) => records,
                Err(message) => {
                    record_failure(&mut summary, Stage::MetricExtraction, method.name(), message);
                    if let Err(e) = collector.discard(method.name()) {
                        record_failure(&mut summary, Stage::MetricExtraction, method.name(), error_chain(&e));
                    }
                    continue;
                }
            };
            summary.records.insert(method.name().to_string(), records.len());
            if let Err(e) = collector.collect(method.name(), records) {
                record_failure(&mut summary, Stage::MetricExtraction, method.name(), error_chain(&e));
            }
        }

        summary.metrics_table = collector.combine_all()?;
        if !collector.all().is_empty() {
            summary.report = Some(ReportGenerator::new(&output_dir).generate(collector.all())?);
        }

        self.enter(Stage::Done);
        if summary.failures.is_empty() {
            info!("Benchmark complete");
        } else {
            warn!("Benchmark complete with {} failed method stages", summary.failures.len());
        }
        Ok(summary)
    }
}

/// Run one method stage; an error or a panic becomes the failure message
fn isolated<T>(stage: impl FnOnce() -> Result<T, MethodError>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(stage)) {
        Ok(result) => result.map_err(|e| error_chain(&e)),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());
            Err(format!("panicked: {}", detail))
        }
    }
}

fn record_failure(summary: &mut RunSummary, stage: Stage, method: &str, message: String) {
    error!("{} failed during {}: {}", method, stage, message);
    summary.failures.push(StageFailure {
        stage,
        method: method.to_string(),
        message,
    });
}

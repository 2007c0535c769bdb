//! Main executable for dockbench

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dockbench::config::BenchmarkConfig;
use dockbench::exec::SystemExecutor;
use dockbench::pipeline::Pipeline;
use dockbench::report::ReportGenerator;
use dockbench::results::{load_metrics, METRICS_DIR};
use dockbench::stats::{AggregateBy, CompareOptions, ComparisonFilters, SortOrder, StatisticsCalculator, StatsError};

/// Command-line arguments for the application
#[derive(Parser, Debug)]
#[clap(
    name = "dockbench",
    version = dockbench::VERSION,
    about = "Benchmark molecular docking methods on shared protein/ligand sets"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[clap(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full benchmark: preprocessing, docking, metric extraction
    Run(RunArgs),

    /// Compare methods from existing metrics tables
    Compare(CompareArgs),

    /// Write the JSON report and default comparison for existing results
    Analyze {
        /// Directory with results (must contain metrics/)
        #[clap(long, value_parser)]
        results_dir: PathBuf,

        /// Output directory for reports (default: results directory)
        #[clap(long, value_parser)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Configuration file (YAML or JSON)
    #[clap(long, short, value_parser)]
    config: Option<PathBuf>,

    /// Separate per-method settings file (YAML or JSON)
    #[clap(long, value_parser)]
    methods_config: Option<PathBuf>,

    /// Base directory for output and processed files
    #[clap(long, value_parser)]
    base_dir: Option<PathBuf>,

    /// Directory containing protein PDB files
    #[clap(long, value_parser)]
    protein_dir: Option<PathBuf>,

    /// Directory containing ligand CSV tables
    #[clap(long, value_parser)]
    ligand_dir: Option<PathBuf>,

    /// Random seed for reproducibility
    #[clap(long)]
    random_state: Option<u64>,

    /// Docking methods to run
    #[clap(long, num_args = 1.., value_delimiter = ',')]
    methods: Option<Vec<String>>,

    /// Protein preparation overrides (YAML/JSON)
    #[clap(long, value_parser)]
    protein_settings: Option<PathBuf>,

    /// Box preparation overrides (YAML/JSON)
    #[clap(long, value_parser)]
    box_settings: Option<PathBuf>,

    /// Path to the QVina binary
    #[clap(long)]
    qvina_binary: Option<String>,

    /// QVina exhaustiveness
    #[clap(long)]
    qvina_exhaustiveness: Option<u32>,

    /// Path to the AutoDock Vina binary
    #[clap(long)]
    vina_binary: Option<String>,

    /// Vina exhaustiveness
    #[clap(long)]
    vina_exhaustiveness: Option<u32>,

    /// Per-invocation timeout in seconds for every selected method
    #[clap(long)]
    docking_timeout: Option<f64>,

    /// Use the MSA server for Boltz-2
    #[clap(long)]
    boltz_use_msa_server: bool,

    /// Use inference-time potentials for Boltz-2
    #[clap(long)]
    boltz_use_potentials: bool,
}

#[derive(clap::Args, Debug)]
struct CompareArgs {
    /// Directory with results (must contain metrics/)
    #[clap(long, value_parser)]
    results_dir: PathBuf,

    /// Output directory for reports (default: results directory)
    #[clap(long, value_parser)]
    output_dir: Option<PathBuf>,

    /// Output formats for the comparison
    #[clap(long, value_enum, num_args = 1.., default_value = "csv")]
    output_format: Vec<OutputFormat>,

    /// Methods to include (default: all available)
    #[clap(long, num_args = 1..)]
    methods: Option<Vec<String>>,

    /// Methods to exclude
    #[clap(long, num_args = 1..)]
    exclude_methods: Vec<String>,

    /// Metrics to compare (e.g. affinity clash_score)
    #[clap(long, num_args = 1..)]
    metrics: Option<Vec<String>>,

    /// Metrics to exclude
    #[clap(long, num_args = 1..)]
    exclude_metrics: Vec<String>,

    /// Only these proteins
    #[clap(long, num_args = 1..)]
    proteins: Option<Vec<String>>,

    /// Only these ligands
    #[clap(long, num_args = 1..)]
    ligands: Option<Vec<String>>,

    /// How to aggregate statistics
    #[clap(long, value_enum, default_value = "method")]
    aggregate_by: Aggregate,

    /// Also write per-protein statistics
    #[clap(long)]
    include_per_protein: bool,

    /// Also write per-ligand statistics
    #[clap(long)]
    include_per_ligand: bool,

    /// Column to sort by (e.g. mean_affinity)
    #[clap(long)]
    sort_by: Option<String>,

    /// Sort order
    #[clap(long, value_enum, default_value = "desc")]
    sort_order: Order,

    /// Keep only the first N rows
    #[clap(long)]
    top_n: Option<usize>,

    /// Minimum number of results for a method to be included
    #[clap(long)]
    min_count: Option<usize>,

    /// Drop rows with missing values in the compared metrics
    #[clap(long)]
    filter_null: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Aggregate {
    Method,
    Protein,
    Ligand,
    All,
}

impl From<Aggregate> for AggregateBy {
    fn from(value: Aggregate) -> Self {
        match value {
            Aggregate::Method => AggregateBy::Method,
            Aggregate::Protein => AggregateBy::Protein,
            Aggregate::Ligand => AggregateBy::Ligand,
            Aggregate::All => AggregateBy::All,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Order {
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(value: Order) -> Self {
        match value {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

/// Report a usage error and exit with status 2
fn usage_error(message: impl std::fmt::Display) -> ! {
    Cli::command().error(ErrorKind::InvalidValue, message).exit()
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Compare(args) => compare(args),
        Commands::Analyze {
            results_dir,
            output_dir,
        } => analyze(&results_dir, output_dir.as_deref()),
    }
}

fn build_config(args: &RunArgs) -> Result<BenchmarkConfig> {
    let mut config = match &args.config {
        Some(path) => BenchmarkConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => BenchmarkConfig::default(),
    };
    if let Some(path) = &args.methods_config {
        config
            .merge_methods_file(path)
            .with_context(|| format!("Failed to load method settings from {}", path.display()))?;
    }

    if let Some(base_dir) = &args.base_dir {
        config.base_dir = base_dir.clone();
    }
    if let Some(protein_dir) = &args.protein_dir {
        config.protein_dir = protein_dir.clone();
    }
    if let Some(ligand_dir) = &args.ligand_dir {
        config.ligand_dir = ligand_dir.clone();
    }
    if let Some(seed) = args.random_state {
        config.random_state = seed;
    }
    if let Some(methods) = &args.methods {
        config.methods = methods.clone();
    }
    if let Some(path) = &args.protein_settings {
        config.protein_settings_file = Some(path.clone());
    }
    if let Some(path) = &args.box_settings {
        config.box_settings_file = Some(path.clone());
    }

    if let Some(binary) = &args.qvina_binary {
        config.method_mut("qvina").binary = Some(binary.clone());
    }
    if let Some(exhaustiveness) = args.qvina_exhaustiveness {
        config.method_mut("qvina").exhaustiveness = Some(exhaustiveness);
    }
    if let Some(binary) = &args.vina_binary {
        config.method_mut("vina").binary = Some(binary.clone());
    }
    if let Some(exhaustiveness) = args.vina_exhaustiveness {
        config.method_mut("vina").exhaustiveness = Some(exhaustiveness);
    }
    if args.boltz_use_msa_server {
        config.method_mut("boltz2").use_msa_server = true;
    }
    if args.boltz_use_potentials {
        config.method_mut("boltz2").use_potentials = true;
    }
    if let Some(timeout) = args.docking_timeout {
        for method in config.methods.clone() {
            config.method_mut(&method.to_lowercase()).docking_timeout = Some(timeout);
        }
    }
    Ok(config)
}

fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    for dir in [&config.protein_dir, &config.ligand_dir] {
        if !dir.is_dir() {
            usage_error(format!("Directory does not exist: {}", dir.display()));
        }
    }

    info!("Loading benchmark inputs from {}", config.base_dir.display());
    let mut pipeline =
        Pipeline::new(config, Arc::new(SystemExecutor::new())).context("Failed to set up the benchmark")?;
    let summary = pipeline.run().context("Benchmark run failed")?;

    for (method, docking) in &summary.docking {
        println!(
            "{:<10} docked {:>5}  skipped {:>5}  failed {:>5}  records {:>5}",
            method,
            docking.docked,
            docking.skipped,
            docking.failed,
            summary.records.get(method).copied().unwrap_or(0)
        );
    }
    for failure in &summary.failures {
        println!("{} failed during {}: {}", failure.method, failure.stage, failure.message);
    }
    if let Some(report) = &summary.report {
        println!("Report: {}", report.display());
    }
    Ok(())
}

fn metrics_dir(results_dir: &Path) -> PathBuf {
    if !results_dir.is_dir() {
        usage_error(format!("Results directory does not exist: {}", results_dir.display()));
    }
    let metrics_dir = results_dir.join(METRICS_DIR);
    if !metrics_dir.is_dir() {
        usage_error(format!("Metrics directory not found: {}", metrics_dir.display()));
    }
    metrics_dir
}

fn compare(args: CompareArgs) -> Result<()> {
    let metrics_dir = metrics_dir(&args.results_dir);
    let output_dir = args.output_dir.clone().unwrap_or_else(|| args.results_dir.clone());

    let all = load_metrics(&metrics_dir)
        .with_context(|| format!("Failed to load metrics from {}", metrics_dir.display()))?;
    if all.is_empty() {
        usage_error(format!("No metrics files found in {}", metrics_dir.display()));
    }
    for (method, records) in &all {
        info!("Loaded {} results for {}", records.len(), method);
    }

    let filters = ComparisonFilters {
        methods: args.methods.clone(),
        exclude_methods: args.exclude_methods.clone(),
        proteins: args.proteins.clone(),
        ligands: args.ligands.clone(),
        filter_null: args.filter_null,
        null_metrics: args.metrics.clone(),
        min_count: args.min_count,
    };
    let filtered = match filters.apply(all) {
        Ok(filtered) => filtered,
        Err(e @ StatsError::NoMethods) => usage_error(e),
        Err(e) => return Err(e.into()),
    };
    info!(
        "Comparing {} methods: {}",
        filtered.len(),
        filtered.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    let options = CompareOptions {
        metrics: args.metrics.clone(),
        exclude_metrics: args.exclude_metrics.clone(),
        aggregate_by: args.aggregate_by.into(),
        include_per_protein: args.include_per_protein,
        include_per_ligand: args.include_per_ligand,
    };
    let mut comparison = StatisticsCalculator::new(&output_dir)
        .compare_methods(&filtered, &options)
        .context("Failed to compare methods")?;

    if let Some(column) = &args.sort_by {
        if !comparison.sort_by(column, args.sort_order.into()) {
            warn!("Unknown sort column {}, keeping table order", column);
        }
    }
    if let Some(n) = args.top_n {
        comparison.truncate(n);
    }

    let reporter = ReportGenerator::new(&output_dir);
    let reports = reporter.reports_dir();
    // The JSON report also writes a default comparison; the filtered one below replaces it
    if args.output_format.contains(&OutputFormat::Json) {
        let report = reporter.generate(&filtered).context("Failed to write report")?;
        let path = reports.join("method_comparison.json");
        dockbench::io::write_json(&path, &comparison.to_json())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved JSON report to: {}", report.display());
    }
    if args.output_format.contains(&OutputFormat::Csv) || args.output_format.contains(&OutputFormat::Json) {
        let path = reports.join(dockbench::report::COMPARISON_FILE);
        comparison
            .write_csv(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved CSV comparison to: {}", path.display());
    }

    println!("{}", comparison);
    Ok(())
}

fn analyze(results_dir: &Path, output_dir: Option<&Path>) -> Result<()> {
    let metrics_dir = metrics_dir(results_dir);
    let output_dir = output_dir.unwrap_or(results_dir);

    let all = load_metrics(&metrics_dir)
        .with_context(|| format!("Failed to load metrics from {}", metrics_dir.display()))?;
    if all.is_empty() {
        usage_error(format!("No metrics files found in {}", metrics_dir.display()));
    }

    let reporter = ReportGenerator::new(output_dir);
    let report = reporter.generate(&all).context("Failed to write report")?;
    println!("Saved JSON report to: {}", report.display());

    let comparison = dockbench::stats::compare_methods(&all, &CompareOptions::default());
    println!("{}", comparison);
    Ok(())
}

//! CLI command definitions for misuse-bench.
//!
//! Every subcommand shares the same options. `checkout`, `compile`, `detect`
//! and `eval` build the task chain cumulatively, so `eval` runs checkout,
//! compile, detect and evaluation for each selected version.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing::info;

use crate::data::{Detector, DetectorMode, DetectorRegistry};
use crate::pipeline::{BenchmarkConfig, RunnerReport, TaskContext, TaskRunner};
use crate::shell::Interrupt;
use crate::tasks::{
    calculator_names, check_prerequisites, create_calculator, visualize, CheckoutTask,
    CompileTask, DetectTask, EvaluateTask, PREREQUISITES,
};

/// Benchmark harness for API-misuse detectors.
#[derive(Parser)]
#[command(name = "misuse-bench")]
#[command(about = "Benchmark API-misuse detectors against a corpus of known misuses")]
#[command(version)]
#[command(
    long_about = "misuse-bench checks out project versions with documented API misuses, compiles them, runs a detector on them and scores its findings.\n\nExample usage:\n  misuse-bench eval --detector DMMC --white-list jodatime\n  misuse-bench stats --script summary --detector DMMC"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(flatten)]
    pub options: BenchmarkArgs,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Verify that the required external tools are installed.
    Check,

    /// Check out the selected project versions.
    Checkout,

    /// Check out and compile the selected project versions.
    Compile,

    /// Check out, compile and run the detector.
    Detect,

    /// Check out, compile, run the detector and evaluate its findings.
    #[command(alias = "evaluate")]
    Eval,

    /// Run a statistics calculator over the selected versions.
    Stats,

    /// Aggregate all result tables into results/result.csv.
    Visualize,
}

impl Commands {
    /// Position in the checkout → compile → detect → eval chain.
    fn depth(self) -> usize {
        match self {
            Commands::Checkout => 1,
            Commands::Compile => 2,
            Commands::Detect => 3,
            Commands::Eval => 4,
            Commands::Check | Commands::Stats | Commands::Visualize => 0,
        }
    }

    /// Whether the required tools are verified before the command runs.
    /// `check` reports them itself.
    fn checks_prerequisites(self) -> bool {
        self != Commands::Check
    }
}

/// Options shared by every subcommand.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BenchmarkArgs {
    /// Corpus root (default: ./data or MUBENCH_DATA_PATH).
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Checkout root (default: ./checkouts or MUBENCH_CHECKOUTS_PATH).
    #[arg(long, global = true)]
    pub checkouts: Option<PathBuf>,

    /// Results root (default: ./results or MUBENCH_RESULTS_PATH).
    #[arg(long, global = true)]
    pub results: Option<PathBuf>,

    /// Detector root (default: ./detectors or MUBENCH_DETECTORS_PATH).
    #[arg(long, global = true)]
    pub detectors: Option<PathBuf>,

    /// Project or project.version ids to process (repeatable or comma-separated).
    #[arg(long, value_delimiter = ',', global = true)]
    pub white_list: Vec<String>,

    /// Project or project.version ids to skip; wins over --white-list.
    #[arg(long, value_delimiter = ',', global = true)]
    pub black_list: Vec<String>,

    /// Discard existing checkouts.
    #[arg(long, global = true)]
    pub force_checkout: bool,

    /// Discard existing build output.
    #[arg(long, global = true)]
    pub force_compile: bool,

    /// Re-run the detector even if a previous run was recorded.
    #[arg(long, global = true)]
    pub force_detect: bool,

    /// Re-evaluate even if the result table is up to date.
    #[arg(long, global = true)]
    pub force_eval: bool,

    /// Detector timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// JVM options for java-based detectors (space-separated).
    #[arg(long, value_delimiter = ' ', allow_hyphen_values = true, global = true)]
    pub java_options: Vec<String>,

    /// Detector to run.
    #[arg(short, long, global = true)]
    pub detector: Option<String>,

    /// Detector release tag or cli version.
    #[arg(long, default_value = "latest", global = true)]
    pub detector_release: String,

    /// Detector mode (mine-and-detect, detect-only).
    #[arg(long, global = true)]
    pub detector_mode: Option<DetectorMode>,

    /// Option forwarded to the detector as key=value (repeatable).
    #[arg(long = "detector-option", global = true)]
    pub detector_options: Vec<String>,

    /// Statistics calculator for `stats`.
    #[arg(long, global = true)]
    pub script: Option<String>,

    /// Stop the whole run at the first failed task.
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Only evaluate findings with at least this confidence.
    #[arg(long, global = true)]
    pub min_confidence: Option<f64>,

    /// Only evaluate findings in files that contain a known misuse.
    #[arg(long, global = true)]
    pub potential_hits: bool,

    /// Output a JSON summary.
    #[arg(short = 'j', long, global = true)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the misuse-bench CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli.options)?;
    let ctx = TaskContext::new(Interrupt::listen());
    let json = cli.options.json;

    if cli.command.checks_prerequisites() {
        check_prerequisites(PREREQUISITES, &ctx.interrupt)
            .await
            .context("Missing prerequisites (run `misuse-bench check` for details)")?;
    }

    match cli.command {
        Commands::Check => run_check_command(&ctx, json).await,
        Commands::Visualize => run_visualize_command(&config, json),
        command => run_pipeline_command(command, &config, &ctx, json).await,
    }
}

/// Builds the configuration: defaults, then environment, then CLI options.
pub fn build_config(args: &BenchmarkArgs) -> anyhow::Result<BenchmarkConfig> {
    let mut config = BenchmarkConfig::from_env().context("Invalid environment configuration")?;

    if let Some(ref path) = args.data {
        config.data_path = path.clone();
    }
    if let Some(ref path) = args.checkouts {
        config.checkouts_path = path.clone();
    }
    if let Some(ref path) = args.results {
        config.results_path = path.clone();
    }
    if let Some(ref path) = args.detectors {
        config.detectors_path = path.clone();
    }
    if let Some(secs) = args.timeout {
        config.detect_timeout = Duration::from_secs(secs);
    }
    if let Some(mode) = args.detector_mode {
        config.detector_mode = mode;
    }
    if let Some(threshold) = args.min_confidence {
        config.min_confidence = Some(threshold);
    }

    config.white_list = args.white_list.clone();
    config.black_list = args.black_list.clone();
    config.force_checkout = args.force_checkout;
    config.force_compile = args.force_compile;
    config.force_detect = args.force_detect;
    config.force_eval = args.force_eval;
    config.detector = args.detector.clone();
    config.detector_options = args.detector_options.clone();
    config.script = args.script.clone();
    config.fail_fast = config.fail_fast || args.fail_fast;

    let config = config
        .with_java_options(args.java_options.iter().filter(|o| !o.is_empty()).cloned().collect())
        .with_detector_release(args.detector_release.clone())
        .with_potential_hits(args.potential_hits);

    config.validate()?;
    Ok(config)
}

/// Resolves the configured detector through the registry.
fn resolve_detector(config: &BenchmarkConfig) -> anyhow::Result<Arc<Detector>> {
    let registry = DetectorRegistry::discover(&config.detectors_path)?;
    let name = config.detector.as_deref().ok_or_else(|| {
        anyhow!(
            "--detector is required (available: {})",
            registry.names().join(", ")
        )
    })?;
    let detector = registry.create(name, &config.detector_release)?;
    detector.verify()?;
    info!(detector = %detector, mode = %config.detector_mode, "Using detector");
    Ok(Arc::new(detector))
}

/// Builds the task chain for a pipeline subcommand.
pub fn build_runner(command: Commands, config: &BenchmarkConfig) -> anyhow::Result<TaskRunner> {
    let mut runner = TaskRunner::new(config);

    if command == Commands::Stats {
        let script = config.script.as_deref().ok_or_else(|| {
            anyhow!(
                "stats requires --script (available: {})",
                calculator_names().join(", ")
            )
        })?;
        runner.add(create_calculator(script, config)?);
        return Ok(runner);
    }

    let depth = command.depth();
    runner.add(Box::new(CheckoutTask::new(config)));
    if depth >= Commands::Compile.depth() {
        runner.add(Box::new(CompileTask::new(config)));
    }
    if depth >= Commands::Detect.depth() {
        let detector = resolve_detector(config)?;
        runner.add(Box::new(DetectTask::new(config, Arc::clone(&detector))));
        if depth >= Commands::Eval.depth() {
            runner.add(Box::new(EvaluateTask::new(config, detector)));
        }
    }
    Ok(runner)
}

async fn run_pipeline_command(
    command: Commands,
    config: &BenchmarkConfig,
    ctx: &TaskContext,
    json: bool,
) -> anyhow::Result<()> {
    let mut runner = build_runner(command, config)?;
    let report = runner.run(ctx).await?;
    print_report(&report, json)?;

    if report.aborted {
        let failure = report
            .failures
            .last()
            .map(|f| format!("{} on {}: {}", f.task, f.version, f.reason))
            .unwrap_or_default();
        bail!("Run aborted (--fail-fast) after failure in {}", failure);
    }
    Ok(())
}

fn print_report(report: &RunnerReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("\n=== Benchmark Run ===");
    println!("Processed: {}", report.processed);
    println!("Succeeded: {}", report.succeeded);
    println!("Failed:    {}", report.failures.len());
    println!("Ignored:   {}", report.ignored.len());
    for failure in &report.failures {
        println!("  ✗ {} [{}]: {}", failure.version, failure.task, failure.reason);
    }
    Ok(())
}

async fn run_check_command(ctx: &TaskContext, json: bool) -> anyhow::Result<()> {
    let statuses = check_prerequisites(PREREQUISITES, &ctx.interrupt).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }
    for status in &statuses {
        match status.version {
            Some(ref version) => println!("✓ {:<8} {}", status.name, version),
            None => println!("- {:<8} not found (optional)", status.name),
        }
    }
    Ok(())
}

fn run_visualize_command(config: &BenchmarkConfig, json: bool) -> anyhow::Result<()> {
    let rows = visualize(&config.results_path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!(
            "Aggregated {} rows into {}",
            rows.len(),
            config.results_path.join(crate::data::RESULT_FILE).display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("misuse-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_global_options() {
        let cli = parse(&[
            "detect",
            "--detector",
            "DMMC",
            "--white-list",
            "a,b.1",
            "--white-list",
            "c",
            "--detector-mode",
            "detect-only",
            "--java-options",
            "-Xmx2g -Xss4m",
            "--detector-option",
            "depth=2",
            "--timeout",
            "60",
        ]);
        assert_eq!(cli.command, Commands::Detect);
        assert_eq!(cli.options.white_list, vec!["a", "b.1", "c"]);
        assert_eq!(cli.options.detector_mode, Some(DetectorMode::DetectOnly));
        assert_eq!(cli.options.java_options, vec!["-Xmx2g", "-Xss4m"]);

        let config = build_config(&cli.options).unwrap();
        assert_eq!(config.detector.as_deref(), Some("DMMC"));
        assert_eq!(config.detect_timeout, Duration::from_secs(60));
        assert_eq!(config.detector_options, vec!["depth=2"]);
        assert_eq!(config.java_options, vec!["-Xmx2g", "-Xss4m"]);
        assert_eq!(config.detector_release, "latest");
        assert!(!config.potential_hits);
    }

    #[test]
    fn test_every_command_but_check_verifies_prerequisites() {
        assert!(!Commands::Check.checks_prerequisites());
        for command in [
            Commands::Checkout,
            Commands::Compile,
            Commands::Detect,
            Commands::Eval,
            Commands::Stats,
            Commands::Visualize,
        ] {
            assert!(command.checks_prerequisites(), "{:?}", command);
        }
    }

    #[test]
    fn test_eval_alias() {
        assert_eq!(parse(&["evaluate"]).command, Commands::Eval);
    }

    #[test]
    fn test_chain_is_cumulative() {
        let config = BenchmarkConfig::default();
        let runner = build_runner(Commands::Compile, &config).unwrap();
        assert_eq!(runner.task_names(), vec!["checkout", "compile"]);
    }

    #[test]
    fn test_detect_requires_known_detector() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = BenchmarkConfig::default()
            .with_detectors_path(temp.path())
            .with_detector("missing");
        let err = build_runner(Commands::Detect, &config).err().unwrap();
        assert!(err.to_string().contains("Unknown detector 'missing'"));
    }

    #[test]
    fn test_stats_requires_script() {
        let config = BenchmarkConfig::default();
        let err = build_runner(Commands::Stats, &config).err().unwrap();
        assert!(err.to_string().contains("available: projects, summary, violations"));

        let runner = build_runner(Commands::Stats, &config.with_script("violations")).unwrap();
        assert_eq!(runner.task_names(), vec!["violations"]);
    }
}

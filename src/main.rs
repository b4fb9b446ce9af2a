//! misuse-bench CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "out.log";

/// Moves a log left by a previous run aside and opens a fresh one.
fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if path.exists() {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let archived = format!("{}.{}", path.display(), stamp);
        fs::rename(path, &archived)
            .with_context(|| format!("Failed to roll over {}", path.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get log_level
    let cli = misuse_bench::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter));

    let log_file = open_log_file(Path::new(LOG_FILE))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .with_filter(LevelFilter::DEBUG),
        )
        .init();

    // Run the CLI with parsed arguments
    misuse_bench::cli::run_with_cli(cli).await
}

//! Command-line interface for misuse-bench.
//!
//! Provides the benchmark stages (checkout, compile, detect, eval), the
//! statistics calculators, prerequisite checks and result aggregation.

mod commands;

pub use commands::{build_config, build_runner, parse_cli, run, run_with_cli, BenchmarkArgs, Cli, Commands};

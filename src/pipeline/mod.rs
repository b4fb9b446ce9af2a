//! Benchmark pipeline infrastructure.
//!
//! This module provides the configuration, the task abstraction and the
//! runner that applies a chain of tasks to every selected project version.
//!
//! # Architecture
//!
//! - **Config**: explicit settings passed to every task constructor
//! - **Runner**: iterates versions and applies the task chain
//! - **Markers**: on-disk success/failure records enabling resumed runs
//!
//! # Pipeline Flow
//!
//! 1. **Discovery**: projects and versions are enumerated from the data root
//! 2. **Selection**: white/black lists pick the versions to process
//! 3. **Tasks**: checkout, compile, detect and evaluate run in order per version
//! 4. **Reporting**: failures are collected; calculators print in their `end` hook
//!
//! # Example
//!
//! ```rust,ignore
//! use misuse_bench::pipeline::{BenchmarkConfig, TaskContext, TaskRunner};
//! use misuse_bench::tasks::{CheckoutTask, CompileTask};
//!
//! let config = BenchmarkConfig::from_env()?.with_white_list(vec!["jodatime".into()]);
//!
//! let mut runner = TaskRunner::new(&config)
//!     .with_task(Box::new(CheckoutTask::new(&config)))
//!     .with_task(Box::new(CompileTask::new(&config)));
//!
//! let report = runner.run(&TaskContext::default()).await?;
//! println!("{} versions processed, {} failed", report.processed, report.failures.len());
//! ```

pub mod config;
pub mod markers;
pub mod runner;

// Re-export main types for convenience
pub use config::{BenchmarkConfig, ConfigError};
pub use markers::{MarkerState, Markers};
pub use runner::{
    RunnerReport, Task, TaskContext, TaskResult, TaskRunner, VersionFailure, VersionFilter,
};

//! misuse-bench: benchmark harness for API-misuse detectors.
//!
//! This library loads a corpus of project versions with documented API
//! misuses, checks them out, compiles them, runs a detector on them and
//! classifies the detector's findings against the known misuses.

pub mod cli;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod shell;
pub mod tasks;
pub mod utils;

// Re-export commonly used error types
pub use error::{DataError, DetectorError, ShellError, TaskError};

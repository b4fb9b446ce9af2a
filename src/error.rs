//! Error types for benchmark operations.
//!
//! Defines error types for the major subsystems:
//! - Corpus loading (projects, versions, misuses, findings)
//! - External command execution
//! - Detector registry lookups
//! - Task execution defects that abort a run

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading the misuse corpus or detector output.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Missing description file: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Misuse '{misuse}' referenced by version '{version}' does not exist")]
    UnknownMisuse { version: String, misuse: String },

    #[error("Malformed result table '{path}' (record {record}): {reason}")]
    MalformedTable {
        path: PathBuf,
        record: usize,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while running an external command.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' exited with code {code}")]
    NonZeroExit {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Command '{command}' was interrupted")]
    Interrupted { command: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Returns true for failures a task records and moves past.
    ///
    /// An interrupt or an IO problem of the harness itself is not operational
    /// and must abort the run.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            ShellError::Spawn { .. } | ShellError::NonZeroExit { .. } | ShellError::Timeout { .. }
        )
    }

    /// Returns true if the command exceeded its time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ShellError::Timeout { .. })
    }
}

/// Errors that can occur when resolving detectors.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Unknown detector '{name}' (available: {available})")]
    UnknownDetector { name: String, available: String },

    #[error("Detector '{name}' has no release '{release}'")]
    UnknownRelease { name: String, release: String },

    #[error("Detector '{name}' has no releases")]
    NoReleases { name: String },

    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort the whole task run.
///
/// Expected operational failures never take this path; they are reported
/// through [`crate::pipeline::TaskResult::Failed`].
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Interrupted by user")]
    Interrupted,

    #[error("Missing required tool: {0}")]
    MissingPrerequisite(String),

    #[error("Task '{task}' failed unexpectedly on '{version}': {reason}")]
    Internal {
        task: String,
        version: String,
        reason: String,
    },

    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

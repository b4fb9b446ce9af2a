//! Executions: one detector applied to one project version.
//!
//! An execution is created before detection starts with no result, and is
//! completed exactly once by the detect task. Its outcome is persisted as
//! `run.yml` next to the findings so a resumed benchmark can tell "not yet
//! attempted" from "attempted and failed".

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::detector::Detector;
use super::filters::FindingsFilter;
use super::finding::{load_findings, Finding};
use super::misuse::Misuse;
use super::project::ProjectVersion;
use super::read_yaml;
use crate::error::DataError;
use crate::utils::write_atomic;

/// Name of the findings file a detector writes.
pub const FINDINGS_FILE: &str = "findings.yml";

/// Name of the persisted execution record.
pub const RUN_FILE: &str = "run.yml";

/// Terminal outcome of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Success,
    Error,
    Timeout,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Success => write!(f, "success"),
            ExecutionResult::Error => write!(f, "error"),
            ExecutionResult::Timeout => write!(f, "timeout"),
        }
    }
}

/// How a detector is applied to a version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorMode {
    /// Mine patterns from the target and detect violations in one go.
    #[default]
    MineAndDetect,
    /// Detect against the correct usages supplied with each misuse.
    DetectOnly,
}

impl fmt::Display for DetectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorMode::MineAndDetect => write!(f, "mine-and-detect"),
            DetectorMode::DetectOnly => write!(f, "detect-only"),
        }
    }
}

impl FromStr for DetectorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "mine-and-detect" | "mine" | "0" => Ok(DetectorMode::MineAndDetect),
            "detect-only" | "detect" | "1" => Ok(DetectorMode::DetectOnly),
            other => Err(format!("Unknown detector mode: {}", other)),
        }
    }
}

/// Variant-specific data of an execution.
#[derive(Debug, Clone)]
pub enum ExecutionKind {
    MineAndDetect,
    DetectOnly { misuse: Arc<Misuse> },
}

/// The persisted outcome of an execution (`run.yml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub result: ExecutionResult,
    pub runtime_secs: f64,
    #[serde(default)]
    pub message: String,
    pub detector: String,
    pub detector_version: String,
    pub mode: DetectorMode,
    pub finished_at: DateTime<Utc>,
}

/// One (detector × project version) unit of work.
#[derive(Debug, Clone)]
pub struct Execution {
    pub kind: ExecutionKind,
    pub detector: Arc<Detector>,
    pub version: Arc<ProjectVersion>,
    findings_dir: PathBuf,
    filter: Arc<dyn FindingsFilter>,
    result: Option<ExecutionResult>,
    runtime: Duration,
    message: String,
}

impl Execution {
    /// Creates a mining-and-detection execution over the whole version.
    pub fn mine_and_detect(
        detector: Arc<Detector>,
        version: Arc<ProjectVersion>,
        findings_dir: impl Into<PathBuf>,
        filter: Arc<dyn FindingsFilter>,
    ) -> Self {
        Self::new(ExecutionKind::MineAndDetect, detector, version, findings_dir, filter)
    }

    /// Creates a detection-only execution for one misuse and its correct usages.
    pub fn detect_only(
        detector: Arc<Detector>,
        version: Arc<ProjectVersion>,
        misuse: Arc<Misuse>,
        findings_dir: impl Into<PathBuf>,
        filter: Arc<dyn FindingsFilter>,
    ) -> Self {
        Self::new(
            ExecutionKind::DetectOnly { misuse },
            detector,
            version,
            findings_dir,
            filter,
        )
    }

    fn new(
        kind: ExecutionKind,
        detector: Arc<Detector>,
        version: Arc<ProjectVersion>,
        findings_dir: impl Into<PathBuf>,
        filter: Arc<dyn FindingsFilter>,
    ) -> Self {
        Self {
            kind,
            detector,
            version,
            findings_dir: findings_dir.into(),
            filter,
            result: None,
            runtime: Duration::ZERO,
            message: String::new(),
        }
    }

    pub fn mode(&self) -> DetectorMode {
        match self.kind {
            ExecutionKind::MineAndDetect => DetectorMode::MineAndDetect,
            ExecutionKind::DetectOnly { .. } => DetectorMode::DetectOnly,
        }
    }

    /// Identifies the execution in logs.
    pub fn id(&self) -> String {
        match self.kind {
            ExecutionKind::MineAndDetect => format!("{}/{}", self.detector.name, self.version.id),
            ExecutionKind::DetectOnly { ref misuse } => {
                format!("{}/{}/{}", self.detector.name, self.version.id, misuse.misuse_id)
            }
        }
    }

    /// The misuses this execution is evaluated against.
    pub fn misuses(&self) -> Vec<Arc<Misuse>> {
        match self.kind {
            ExecutionKind::MineAndDetect => self.version.misuses().to_vec(),
            ExecutionKind::DetectOnly { ref misuse } => vec![Arc::clone(misuse)],
        }
    }

    pub fn result(&self) -> Option<ExecutionResult> {
        self.result
    }

    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn filter(&self) -> &dyn FindingsFilter {
        self.filter.as_ref()
    }

    /// Completes the execution. A terminal result is never overwritten.
    ///
    /// Returns false (and leaves the execution untouched) if a result is
    /// already set.
    #[must_use]
    pub fn complete(
        &mut self,
        result: ExecutionResult,
        runtime: Duration,
        message: impl Into<String>,
    ) -> bool {
        if let Some(existing) = self.result {
            warn!(execution = %self.id(), %existing, attempted = %result, "Execution already completed");
            return false;
        }
        self.result = Some(result);
        self.runtime = runtime;
        self.message = message.into();
        true
    }

    pub fn is_success(&self) -> bool {
        self.result == Some(ExecutionResult::Success)
    }

    pub fn is_error(&self) -> bool {
        self.result == Some(ExecutionResult::Error)
    }

    pub fn is_timeout(&self) -> bool {
        self.result == Some(ExecutionResult::Timeout)
    }

    /// True when the execution ended in error or timeout.
    pub fn is_failure(&self) -> bool {
        self.is_error() || self.is_timeout()
    }

    pub fn findings_dir(&self) -> &Path {
        &self.findings_dir
    }

    pub fn findings_path(&self) -> PathBuf {
        self.findings_dir.join(FINDINGS_FILE)
    }

    pub fn record_path(&self) -> PathBuf {
        self.findings_dir.join(RUN_FILE)
    }

    /// Restores the outcome of a previous attempt from `run.yml`.
    ///
    /// Returns false if there is no record, or if the record belongs to a
    /// different detector release or mode.
    pub fn load_record(&mut self) -> Result<bool, DataError> {
        let path = self.record_path();
        if !path.is_file() || self.result.is_some() {
            return Ok(false);
        }

        let record: RunRecord = read_yaml(&path)?;
        if record.detector_version != self.detector.version() || record.mode != self.mode() {
            return Ok(false);
        }

        self.result = Some(record.result);
        self.runtime = Duration::from_secs_f64(record.runtime_secs.max(0.0));
        self.message = record.message;
        Ok(true)
    }

    /// Persists the outcome to `run.yml`. Does nothing before completion.
    pub fn save_record(&self) -> Result<(), DataError> {
        let Some(result) = self.result else {
            return Ok(());
        };

        let record = RunRecord {
            result,
            runtime_secs: self.runtime.as_secs_f64(),
            message: self.message.clone(),
            detector: self.detector.name.clone(),
            detector_version: self.detector.version().to_string(),
            mode: self.mode(),
            finished_at: Utc::now(),
        };
        let yaml = serde_yaml::to_string(&record)?;
        write_atomic(&self.record_path(), yaml)?;
        Ok(())
    }

    /// Loads the findings and applies this execution's filter.
    pub fn findings(&self) -> Result<Vec<Finding>, DataError> {
        let findings = load_findings(&self.findings_path())?;
        Ok(self.filter.filter(findings))
    }
}

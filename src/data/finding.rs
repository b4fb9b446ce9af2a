//! Findings reported by detectors.
//!
//! Detectors write `findings.yml`, a YAML sequence of findings:
//!
//! ```yaml
//! - id: pattern-17
//!   file: src/A.java
//!   method: m()
//!   line: 42
//!   confidence: 0.8
//!   apis: [java.util.Iterator]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// A detector-reported candidate misuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Pattern/finding identifier assigned by the detector.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub line: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub apis: Vec<String>,
    /// Detector-specific properties.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Finding {
    /// Creates a finding at a file/method location.
    pub fn new(id: impl Into<String>, file: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file: file.into(),
            method: method.into(),
            line: None,
            confidence: None,
            apis: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "finding '{}' in {}#{}", self.id, self.file, self.method)
    }
}

/// Loads the findings file written by a detector.
///
/// A missing file after a clean exit means zero findings. Findings without an
/// id get their 1-based rank.
pub fn load_findings(path: &Path) -> Result<Vec<Finding>, DataError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let findings: Option<Vec<Finding>> =
        serde_yaml::from_str(&content).map_err(|source| DataError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let mut findings = findings.unwrap_or_default();
    for (rank, finding) in findings.iter_mut().enumerate() {
        if finding.id.is_empty() {
            finding.id = (rank + 1).to_string();
        }
    }
    Ok(findings)
}

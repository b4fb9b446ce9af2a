//! Benchmark configuration.
//!
//! This module provides the settings shared by every task: corpus and output
//! locations, per-stage timeouts, detector selection and the force flags that
//! control output regeneration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::data::{DetectorMode, Misuse, ProjectVersion};

/// Copies of each misuse's correct usages handed to pattern-based detectors.
pub const DEFAULT_PATTERN_FREQUENCY: usize = 20;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable or option has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    // Locations
    /// Root of the misuse corpus.
    pub data_path: PathBuf,
    /// Root of materialized project sources.
    pub checkouts_path: PathBuf,
    /// Root of detector findings and result tables.
    pub results_path: PathBuf,
    /// Root of detector installations.
    pub detectors_path: PathBuf,

    // Timeouts
    pub checkout_timeout: Duration,
    pub compile_timeout: Duration,
    /// Budget of a single detector invocation.
    pub detect_timeout: Duration,

    // Pattern compilation
    /// Number of copies of each misuse's correct usages.
    pub pattern_frequency: usize,
    /// Java compiler used to build the patterns.
    pub javac: String,

    // Detector settings
    /// Detector to run; required by `detect` and `eval`.
    pub detector: Option<String>,
    /// Release tag or cli version, `latest` by default.
    pub detector_release: String,
    pub detector_mode: DetectorMode,
    /// `key=value` pairs forwarded to the detector.
    pub detector_options: Vec<String>,
    /// JVM options for detectors with a java runtime.
    pub java_options: Vec<String>,

    // Version selection
    /// Project or `project.version` ids to process; empty admits all.
    pub white_list: Vec<String>,
    /// Project or `project.version` ids to exclude; wins over the white list.
    pub black_list: Vec<String>,

    // Regeneration
    pub force_checkout: bool,
    pub force_compile: bool,
    pub force_detect: bool,
    pub force_eval: bool,

    /// Abort the whole run at the first failed task.
    pub fail_fast: bool,

    // Evaluation
    /// Statistics calculator selected by `--script`.
    pub script: Option<String>,
    pub min_confidence: Option<f64>,
    pub potential_hits: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data"),
            checkouts_path: PathBuf::from("./checkouts"),
            results_path: PathBuf::from("./results"),
            detectors_path: PathBuf::from("./detectors"),

            checkout_timeout: Duration::from_secs(1800), // 30 minutes
            compile_timeout: Duration::from_secs(1800),
            detect_timeout: Duration::from_secs(3600), // 1 hour

            pattern_frequency: DEFAULT_PATTERN_FREQUENCY,
            javac: "javac".to_string(),

            detector: None,
            detector_release: crate::data::detector::LATEST_RELEASE.to_string(),
            detector_mode: DetectorMode::default(),
            detector_options: Vec::new(),
            java_options: Vec::new(),

            white_list: Vec::new(),
            black_list: Vec::new(),

            force_checkout: false,
            force_compile: false,
            force_detect: false,
            force_eval: false,

            fail_fast: false,

            script: None,
            min_confidence: None,
            potential_hits: false,
        }
    }
}

impl BenchmarkConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MUBENCH_DATA_PATH`: Corpus root (default: ./data)
    /// - `MUBENCH_CHECKOUTS_PATH`: Checkout root (default: ./checkouts)
    /// - `MUBENCH_RESULTS_PATH`: Results root (default: ./results)
    /// - `MUBENCH_DETECTORS_PATH`: Detector root (default: ./detectors)
    /// - `MUBENCH_CHECKOUT_TIMEOUT_SECS`: Checkout timeout (default: 1800)
    /// - `MUBENCH_COMPILE_TIMEOUT_SECS`: Compile timeout (default: 1800)
    /// - `MUBENCH_DETECT_TIMEOUT_SECS`: Detector timeout (default: 3600)
    /// - `MUBENCH_PATTERN_FREQUENCY`: Copies of each pattern (default: 20)
    /// - `MUBENCH_JAVAC`: Java compiler for patterns (default: javac)
    /// - `MUBENCH_FAIL_FAST`: Abort at the first failed task (default: false)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MUBENCH_DATA_PATH") {
            config.data_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("MUBENCH_CHECKOUTS_PATH") {
            config.checkouts_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("MUBENCH_RESULTS_PATH") {
            config.results_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("MUBENCH_DETECTORS_PATH") {
            config.detectors_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("MUBENCH_CHECKOUT_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "MUBENCH_CHECKOUT_TIMEOUT_SECS")?;
            config.checkout_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("MUBENCH_COMPILE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "MUBENCH_COMPILE_TIMEOUT_SECS")?;
            config.compile_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("MUBENCH_DETECT_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "MUBENCH_DETECT_TIMEOUT_SECS")?;
            config.detect_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("MUBENCH_PATTERN_FREQUENCY") {
            config.pattern_frequency = parse_env_value(&val, "MUBENCH_PATTERN_FREQUENCY")?;
        }

        if let Ok(val) = std::env::var("MUBENCH_JAVAC") {
            config.javac = val;
        }

        if let Ok(val) = std::env::var("MUBENCH_FAIL_FAST") {
            config.fail_fast = parse_env_bool(&val, "MUBENCH_FAIL_FAST")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, timeout) in [
            ("checkout_timeout", self.checkout_timeout),
            ("compile_timeout", self.compile_timeout),
            ("detect_timeout", self.detect_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.pattern_frequency == 0 {
            return Err(ConfigError::ValidationFailed(
                "pattern_frequency must be greater than 0".to_string(),
            ));
        }

        if self.javac.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("javac cannot be empty".to_string()));
        }

        if self.detector_release.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "detector_release cannot be empty".to_string(),
            ));
        }

        if let Some(threshold) = self.min_confidence {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::ValidationFailed(
                    "min_confidence must be between 0.0 and 1.0".to_string(),
                ));
            }
        }

        if let Some(option) = self.detector_options.iter().find(|o| !o.contains('=')) {
            return Err(ConfigError::ValidationFailed(format!(
                "detector option '{}' must have the form key=value",
                option
            )));
        }

        Ok(())
    }

    /// Directory holding a version's checkout, build logs and markers.
    pub fn version_dir(&self, version: &ProjectVersion) -> PathBuf {
        self.checkouts_path
            .join(&version.project_id)
            .join(&version.version_id)
    }

    /// Directory holding a version's materialized sources.
    pub fn checkout_dir(&self, version: &ProjectVersion) -> PathBuf {
        self.version_dir(version).join("checkout")
    }

    /// Copies of a misuse's correct usages, one numbered subdirectory per copy.
    pub fn pattern_sources_dir(&self, version: &ProjectVersion, misuse: &Misuse) -> PathBuf {
        self.version_dir(version)
            .join("misuses")
            .join(&misuse.misuse_id)
            .join("patterns-src")
    }

    /// Compiled patterns, laid out like [`Self::pattern_sources_dir`].
    pub fn pattern_classes_dir(&self, version: &ProjectVersion, misuse: &Misuse) -> PathBuf {
        self.version_dir(version)
            .join("misuses")
            .join(&misuse.misuse_id)
            .join("patterns-classes")
    }

    /// Directory holding a detector's findings and result table for a version.
    pub fn results_dir(&self, detector: &str, version: &ProjectVersion) -> PathBuf {
        detector_results_dir(&self.results_path, detector)
            .join(&version.project_id)
            .join(&version.version_id)
    }

    /// Builder method to set the corpus root.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Builder method to set the checkout root.
    pub fn with_checkouts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkouts_path = path.into();
        self
    }

    /// Builder method to set the results root.
    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = path.into();
        self
    }

    /// Builder method to set the detector root.
    pub fn with_detectors_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.detectors_path = path.into();
        self
    }

    /// Builder method to set the same timeout for every stage.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self.compile_timeout = timeout;
        self.detect_timeout = timeout;
        self
    }

    /// Builder method to set the detector timeout.
    pub fn with_detect_timeout(mut self, timeout: Duration) -> Self {
        self.detect_timeout = timeout;
        self
    }

    /// Builder method to select the detector.
    pub fn with_detector(mut self, name: impl Into<String>) -> Self {
        self.detector = Some(name.into());
        self
    }

    /// Builder method to set the number of pattern copies.
    pub fn with_pattern_frequency(mut self, frequency: usize) -> Self {
        self.pattern_frequency = frequency;
        self
    }

    /// Builder method to set the Java compiler.
    pub fn with_javac(mut self, javac: impl Into<String>) -> Self {
        self.javac = javac.into();
        self
    }

    /// Builder method to select the detector release.
    pub fn with_detector_release(mut self, release: impl Into<String>) -> Self {
        self.detector_release = release.into();
        self
    }

    /// Builder method to set the detector mode.
    pub fn with_detector_mode(mut self, mode: DetectorMode) -> Self {
        self.detector_mode = mode;
        self
    }

    /// Builder method to set the detector options.
    pub fn with_detector_options(mut self, options: Vec<String>) -> Self {
        self.detector_options = options;
        self
    }

    /// Builder method to set JVM options.
    pub fn with_java_options(mut self, options: Vec<String>) -> Self {
        self.java_options = options;
        self
    }

    /// Builder method to set the white list.
    pub fn with_white_list(mut self, ids: Vec<String>) -> Self {
        self.white_list = ids;
        self
    }

    /// Builder method to set the black list.
    pub fn with_black_list(mut self, ids: Vec<String>) -> Self {
        self.black_list = ids;
        self
    }

    /// Builder method to set every force flag at once.
    pub fn with_force_all(mut self, force: bool) -> Self {
        self.force_checkout = force;
        self.force_compile = force;
        self.force_detect = force;
        self.force_eval = force;
        self
    }

    /// Builder method to force re-running the detector.
    pub fn with_force_detect(mut self, force: bool) -> Self {
        self.force_detect = force;
        self
    }

    /// Builder method to force re-evaluation.
    pub fn with_force_eval(mut self, force: bool) -> Self {
        self.force_eval = force;
        self
    }

    /// Builder method to enable or disable fail-fast.
    pub fn with_fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    /// Builder method to select the statistics calculator.
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Builder method to set the confidence threshold.
    pub fn with_min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = Some(threshold);
        self
    }

    /// Builder method to restrict evaluation to potential hits.
    pub fn with_potential_hits(mut self, enabled: bool) -> Self {
        self.potential_hits = enabled;
        self
    }
}

/// Directory holding all results of one detector.
pub fn detector_results_dir(results_path: &Path, detector: &str) -> PathBuf {
    results_path.join(detector)
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.data_path, PathBuf::from("./data"));
        assert_eq!(config.checkout_timeout, Duration::from_secs(1800));
        assert_eq!(config.detect_timeout, Duration::from_secs(3600));
        assert_eq!(config.detector_release, "latest");
        assert_eq!(config.detector_mode, DetectorMode::MineAndDetect);
        assert!(!config.force_detect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BenchmarkConfig::new()
            .with_data_path("/corpus")
            .with_timeout(Duration::from_secs(60))
            .with_detector("DMMC")
            .with_detector_mode(DetectorMode::DetectOnly)
            .with_white_list(vec!["p.1".to_string()])
            .with_force_all(true)
            .with_min_confidence(0.5);

        assert_eq!(config.data_path, PathBuf::from("/corpus"));
        assert_eq!(config.compile_timeout, Duration::from_secs(60));
        assert_eq!(config.detect_timeout, Duration::from_secs(60));
        assert_eq!(config.detector.as_deref(), Some("DMMC"));
        assert_eq!(config.detector_mode, DetectorMode::DetectOnly);
        assert_eq!(config.white_list, vec!["p.1"]);
        assert!(config.force_checkout && config.force_eval);
        assert_eq!(config.min_confidence, Some(0.5));
    }

    #[test]
    fn test_validation_invalid_timeout() {
        let config = BenchmarkConfig::default().with_detect_timeout(Duration::ZERO);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("detect_timeout"));
    }

    #[test]
    fn test_validation_invalid_confidence() {
        let config = BenchmarkConfig::default().with_min_confidence(1.5);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("min_confidence"));
    }

    #[test]
    fn test_validation_zero_pattern_frequency() {
        let config = BenchmarkConfig::default().with_pattern_frequency(0);
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("pattern_frequency"));
    }

    #[test]
    fn test_validation_malformed_detector_option() {
        let config = BenchmarkConfig::default().with_detector_options(vec!["verbose".to_string()]);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("key=value"));
    }

    #[test]
    fn test_path_helpers() {
        let temp = tempfile::TempDir::new().unwrap();
        crate::data::fixtures::synthetic_corpus(temp.path());
        let project = crate::data::Project::load(temp.path(), "p").unwrap();
        let version = project.versions().unwrap().remove(0);

        let config = BenchmarkConfig::default()
            .with_checkouts_path("/co")
            .with_results_path("/res");
        assert_eq!(config.checkout_dir(&version), PathBuf::from("/co/p/1/checkout"));
        assert_eq!(config.results_dir("d", &version), PathBuf::from("/res/d/p/1"));
        assert_eq!(
            config.pattern_sources_dir(&version, &version.misuses()[0]),
            PathBuf::from("/co/p/1/misuses/m1/patterns-src")
        );
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("ON", "test").unwrap());
        assert!(!parse_env_bool("no", "test").unwrap());
        assert!(parse_env_bool("invalid", "test").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let secs: u64 = parse_env_value("90", "T").unwrap();
        assert_eq!(secs, 90);
        let err = parse_env_value::<u64>("ninety", "T").unwrap_err();
        assert!(err.to_string().contains("ninety"));
    }
}

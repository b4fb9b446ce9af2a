//! Detector descriptors and the detector registry.
//!
//! A detector is an opaque external executable living in
//! `detectors/<name>/`. Its `releases.yml` lists the available releases,
//! newest first:
//!
//! ```yaml
//! - cli_version: 0.0.13
//!   tag: latest
//!   executable: bin/detector
//!   runtime: native
//!   sha256: 4f0c...
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{read_yaml, string_or_number};
use crate::error::DetectorError;

/// Name of the release list inside a detector directory.
pub const RELEASES_FILE: &str = "releases.yml";

/// Release selector meaning "first listed release".
pub const LATEST_RELEASE: &str = "latest";

/// How a detector executable is launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorRuntime {
    /// Executed directly.
    #[default]
    Native,
    /// Launched with `java <options> -jar`.
    Java,
}

/// One entry of `releases.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorRelease {
    #[serde(deserialize_with = "string_or_number")]
    pub cli_version: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub executable: String,
    #[serde(default)]
    pub runtime: DetectorRuntime,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// A versioned, stateless descriptor of an external detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    pub name: String,
    /// The detector's directory.
    pub path: PathBuf,
    pub release: DetectorRelease,
}

impl Detector {
    /// Loads `release` (a tag, a cli version or `latest`) from `detectors_dir/name`.
    pub fn load(detectors_dir: &Path, name: &str, release: &str) -> Result<Self, DetectorError> {
        let path = detectors_dir.join(name);
        let releases: Vec<DetectorRelease> = read_yaml(&path.join(RELEASES_FILE))?;

        let selected = if release == LATEST_RELEASE {
            releases.into_iter().next()
        } else {
            releases
                .into_iter()
                .find(|r| r.tag.as_deref() == Some(release) || r.cli_version == release)
        };

        match selected {
            Some(release) => Ok(Self {
                name: name.to_string(),
                path,
                release,
            }),
            None if release == LATEST_RELEASE => Err(DetectorError::NoReleases {
                name: name.to_string(),
            }),
            None => Err(DetectorError::UnknownRelease {
                name: name.to_string(),
                release: release.to_string(),
            }),
        }
    }

    /// Identifies the release in result records.
    pub fn version(&self) -> &str {
        &self.release.cli_version
    }

    /// Absolute path of the executable.
    pub fn executable(&self) -> PathBuf {
        self.path.join(&self.release.executable)
    }

    /// Checks the executable against the release checksum, if one is recorded.
    pub fn verify(&self) -> Result<(), DetectorError> {
        let Some(ref expected) = self.release.sha256 else {
            return Ok(());
        };

        let executable = self.executable();
        let bytes = fs::read(&executable)?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if actual.eq_ignore_ascii_case(expected) {
            debug!(detector = %self.name, "Checksum verified");
            Ok(())
        } else {
            Err(DetectorError::ChecksumMismatch {
                path: executable,
                expected: expected.clone(),
                actual,
            })
        }
    }

    /// Builds the shell command line invoking the detector with `args`.
    pub fn command_line(&self, java_options: &[String], args: &[String]) -> String {
        let mut parts = Vec::new();
        if self.release.runtime == DetectorRuntime::Java {
            parts.push("java".to_string());
            parts.extend(java_options.iter().map(|o| shell_quote(o)));
            parts.push("-jar".to_string());
        }
        parts.push(shell_quote(&self.executable().to_string_lossy()));
        parts.extend(args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version())
    }
}

/// Quotes a word for `sh -c`.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Creates a detector for a requested release.
pub type DetectorFactory = Box<dyn Fn(&str) -> Result<Detector, DetectorError> + Send + Sync>;

/// Explicit name → factory mapping, populated at startup.
#[derive(Default)]
pub struct DetectorRegistry {
    factories: BTreeMap<String, DetectorFactory>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every `detectors_dir/<name>` that has a `releases.yml`.
    pub fn discover(detectors_dir: &Path) -> Result<Self, DetectorError> {
        let mut registry = Self::new();
        if !detectors_dir.is_dir() {
            return Ok(registry);
        }

        for entry in fs::read_dir(detectors_dir)?.filter_map(Result::ok) {
            let path = entry.path();
            if !path.join(RELEASES_FILE).is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let dir = detectors_dir.to_path_buf();
            let detector_name = name.clone();
            registry.register(
                name,
                Box::new(move |release| Detector::load(&dir, &detector_name, release)),
            );
        }

        debug!(detectors = ?registry.names(), "Discovered detectors");
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, factory: DetectorFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Creates detector `name` at `release`.
    pub fn create(&self, name: &str, release: &str) -> Result<Detector, DetectorError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DetectorError::UnknownDetector {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        factory(release)
    }
}

impl fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("detectors", &self.names())
            .finish()
    }
}

//! Documented API misuses, the benchmark's ground truth.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{read_yaml, string_or_number};
use crate::error::DataError;

/// Name of the misuse description file.
pub const MISUSE_FILE: &str = "misuse.yml";

/// Directory holding correct usages of the misused API.
const CORRECT_USAGES_DIR: &str = "correct-usages";

/// Source location of a misuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub method: String,
    /// Line number, -1 if unknown.
    #[serde(default = "unknown_line")]
    pub line: i64,
}

fn unknown_line() -> i64 {
    -1
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({}, {})", self.file, self.method)
    }
}

/// The commit that fixed a misuse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub revision: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MisuseSource {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MisuseFile {
    #[serde(default)]
    description: String,
    location: Location,
    #[serde(default)]
    fix: Fix,
    #[serde(default)]
    crash: bool,
    #[serde(default)]
    api: Vec<String>,
    #[serde(default)]
    violations: Vec<String>,
    #[serde(default)]
    source: Option<MisuseSource>,
    #[serde(default)]
    internal: bool,
}

/// A correct usage example shipped alongside a misuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrectUsage {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Path relative to the misuse's `correct-usages` directory.
    pub relative: String,
}

/// A documented instance of incorrect API usage.
///
/// Parsed once from `misuse.yml`; immutable afterwards. Two misuses are equal
/// when they come from the same directory.
#[derive(Debug, Clone)]
pub struct Misuse {
    pub project_id: String,
    pub version_id: String,
    pub misuse_id: String,
    /// Lower-cased `project.version.misuse`.
    pub id: String,
    /// Directory containing `misuse.yml`.
    pub path: PathBuf,
    pub description: String,
    pub location: Location,
    pub fix: Fix,
    pub is_crash: bool,
    pub apis: Vec<String>,
    pub violations: Vec<String>,
    pub source: Option<String>,
    pub apis_are_internal: bool,
    correct_usages: Vec<CorrectUsage>,
}

impl Misuse {
    /// Checks whether `path` is a misuse directory.
    pub fn is_misuse(path: &Path) -> bool {
        path.join(MISUSE_FILE).is_file()
    }

    /// Loads misuse `misuse_id` of `project_path` in the context of a version.
    pub fn load(
        project_path: &Path,
        project_id: &str,
        version_id: &str,
        misuse_id: &str,
    ) -> Result<Self, DataError> {
        let path = project_path.join("misuses").join(misuse_id);
        let raw: MisuseFile = read_yaml(&path.join(MISUSE_FILE))?;
        let correct_usages = collect_correct_usages(&path.join(CORRECT_USAGES_DIR))?;

        Ok(Self {
            project_id: project_id.to_string(),
            version_id: version_id.to_string(),
            misuse_id: misuse_id.to_string(),
            id: format!("{project_id}.{version_id}.{misuse_id}").to_lowercase(),
            path,
            description: raw.description,
            location: raw.location,
            fix: raw.fix,
            is_crash: raw.crash,
            apis: raw.api,
            violations: raw.violations,
            source: raw.source.and_then(|s| s.name),
            apis_are_internal: raw.internal,
            correct_usages,
        })
    }

    /// Correct usages, enumerated at load time.
    pub fn correct_usages(&self) -> &[CorrectUsage] {
        &self.correct_usages
    }

    /// Whether correct usages are available for pattern-based detection.
    pub fn has_correct_usages(&self) -> bool {
        !self.correct_usages.is_empty()
    }
}

fn collect_correct_usages(dir: &Path) -> Result<Vec<CorrectUsage>, DataError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut usages = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "java") {
            let relative = path
                .strip_prefix(dir)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            usages.push(CorrectUsage {
                path: path.to_path_buf(),
                relative,
            });
        }
    }
    Ok(usages)
}

impl PartialEq for Misuse {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Misuse {}

impl Hash for Misuse {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for Misuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "misuse '{}'", self.id)
    }
}

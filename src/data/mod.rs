//! Benchmark data model.
//!
//! Covers the misuse corpus (projects, versions, misuses), detector
//! descriptors, detector findings, the execution/run result model and the
//! result tables produced by evaluation.
//!
//! # Corpus layout
//!
//! ```text
//! data/<project>/project.yml
//! data/<project>/versions/<version>/version.yml
//! data/<project>/misuses/<misuse>/misuse.yml
//! data/<project>/misuses/<misuse>/correct-usages/**/*.java
//! ```
//!
//! Everything under `data/` is parsed once into immutable values. The files
//! never change after checkout, so nothing is re-read or invalidated.

pub mod detector;
pub mod execution;
pub mod filters;
pub mod finding;
pub mod misuse;
pub mod project;
pub mod results;
pub mod run;

pub use detector::{Detector, DetectorRegistry, DetectorRelease, DetectorRuntime};
pub use execution::{
    DetectorMode, Execution, ExecutionKind, ExecutionResult, RunRecord, FINDINGS_FILE, RUN_FILE,
};
pub use filters::{
    build_filter, same_file, AllFindings, FilterChain, FindingsFilter, MinConfidence, PotentialHits,
};
pub use finding::{load_findings, Finding};
pub use misuse::{CorrectUsage, Fix, Location, Misuse};
pub use project::{BuildConfig, Project, ProjectVersion, Repository, RepositoryKind};
pub use results::{
    read_result_table, to_csv, Classification, ResultRow, RESULT_FILE, REVIEWED_RESULT_FILE,
};
pub use run::Run;

use std::fs;
use std::path::Path;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};

use crate::error::DataError;

/// Enumerates every project under the data root, sorted by id.
///
/// A missing data root yields an empty corpus.
pub fn discover_projects(data_root: &Path) -> Result<Vec<Project>, DataError> {
    if !data_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = fs::read_dir(data_root)?
        .filter_map(Result::ok)
        .filter(|entry| Project::is_project(&entry.path()))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    ids.sort();

    ids.into_iter()
        .map(|id| Project::load(data_root, &id))
        .collect()
}

/// Reads and parses a YAML description file.
pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    if !path.is_file() {
        return Err(DataError::MissingFile(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|source| DataError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts YAML scalars where a string is expected (revisions are often bare numbers).
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!("expected a scalar, got {other:?}"))),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Helpers that lay out a small corpus on disk.

    use std::fs;
    use std::path::Path;

    pub fn write_project(data: &Path, project: &str, repository: &str) {
        let dir = data.join(project);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("project.yml"), format!("name: {project}\nrepository:\n{repository}")).unwrap();
    }

    pub fn write_version(data: &Path, project: &str, version: &str, body: &str) {
        let dir = data.join(project).join("versions").join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("version.yml"), body).unwrap();
    }

    pub fn write_misuse(data: &Path, project: &str, misuse: &str, body: &str) {
        let dir = data.join(project).join("misuses").join(misuse);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("misuse.yml"), body).unwrap();
    }

    /// A synthetic project `p` with version `1` containing misuse `m1` at `A.java#m()` line 42.
    pub fn synthetic_corpus(data: &Path) {
        write_project(data, "p", "  type: synthetic\n  url: repo\n");
        let repo = data.join("p").join("repo");
        fs::create_dir_all(repo.join("src")).unwrap();
        fs::write(repo.join("src").join("A.java"), "class A { void m() {} }\n").unwrap();
        write_version(
            data,
            "p",
            "1",
            "revision: 1\nmisuses: [m1]\nbuild:\n  src: src\n  classes: classes\n  commands:\n    - mkdir -p classes\n",
        );
        write_misuse(
            data,
            "p",
            "m1",
            "description: missing null check\nlocation:\n  file: src/A.java\n  method: m()\n  line: 42\ncrash: false\napi: [java.util.Iterator]\nviolations: [missing/condition/null_check]\n",
        );
    }
}

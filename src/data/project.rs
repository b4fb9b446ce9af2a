//! Projects and their versions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::misuse::Misuse;
use super::{read_yaml, string_or_number};
use crate::error::DataError;

/// Name of the project description file.
pub const PROJECT_FILE: &str = "project.yml";

/// Name of the version description file.
pub const VERSION_FILE: &str = "version.yml";

/// Kind of repository a project is checked out from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    Git,
    Svn,
    /// Source copied from a directory inside the project's data folder.
    Synthetic,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Git => write!(f, "git"),
            RepositoryKind::Svn => write!(f, "svn"),
            RepositoryKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Where a project's sources come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    name: Option<String>,
    repository: Repository,
}

/// A project of the corpus; groups its versions.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub repository: Repository,
}

impl Project {
    /// Checks whether `path` is a project directory.
    pub fn is_project(path: &Path) -> bool {
        path.join(PROJECT_FILE).is_file()
    }

    /// Loads project `id` from the data root.
    pub fn load(data_root: &Path, id: &str) -> Result<Self, DataError> {
        let path = data_root.join(id);
        let raw: ProjectFile = read_yaml(&path.join(PROJECT_FILE))?;
        Ok(Self {
            id: id.to_string(),
            name: raw.name.unwrap_or_else(|| id.to_string()),
            path,
            repository: raw.repository,
        })
    }

    /// Enumerates the project's versions, sorted by id.
    pub fn versions(&self) -> Result<Vec<ProjectVersion>, DataError> {
        let versions_dir = self.path.join("versions");
        if !versions_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = fs::read_dir(&versions_dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().join(VERSION_FILE).is_file())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        ids.sort();

        ids.into_iter()
            .map(|id| ProjectVersion::load(self, &id))
            .collect()
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project '{}'", self.id)
    }
}

/// How to build a checked-out version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Source root, relative to the checkout.
    #[serde(default)]
    pub src: String,
    /// Compiled classes, relative to the checkout.
    #[serde(default)]
    pub classes: String,
    /// Build commands, run in order inside the checkout.
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    #[serde(default, deserialize_with = "string_or_number")]
    revision: String,
    #[serde(default)]
    misuses: Vec<String>,
    #[serde(default)]
    build: BuildConfig,
    #[serde(default)]
    ignore: bool,
}

/// A snapshot of a project at a revision, owning its documented misuses.
#[derive(Debug, Clone)]
pub struct ProjectVersion {
    pub project_id: String,
    pub version_id: String,
    /// `project.version`
    pub id: String,
    pub path: PathBuf,
    pub revision: String,
    pub repository: Repository,
    pub build: BuildConfig,
    /// Explicitly excluded from processing (known-bad fixture).
    pub ignored: bool,
    misuses: Vec<Arc<Misuse>>,
}

impl ProjectVersion {
    /// Loads version `version_id` of `project` together with its misuses.
    pub fn load(project: &Project, version_id: &str) -> Result<Self, DataError> {
        let path = project.path.join("versions").join(version_id);
        let raw: VersionFile = read_yaml(&path.join(VERSION_FILE))?;

        let mut misuses = Vec::with_capacity(raw.misuses.len());
        for misuse_id in &raw.misuses {
            if !Misuse::is_misuse(&project.path.join("misuses").join(misuse_id)) {
                return Err(DataError::UnknownMisuse {
                    version: format!("{}.{}", project.id, version_id),
                    misuse: misuse_id.clone(),
                });
            }
            let misuse = Misuse::load(&project.path, &project.id, version_id, misuse_id)?;
            misuses.push(Arc::new(misuse));
        }

        Ok(Self {
            project_id: project.id.clone(),
            version_id: version_id.to_string(),
            id: format!("{}.{}", project.id, version_id),
            path,
            revision: raw.revision,
            repository: project.repository.clone(),
            build: raw.build,
            ignored: raw.ignore,
            misuses,
        })
    }

    /// The documented misuses of this version.
    pub fn misuses(&self) -> &[Arc<Misuse>] {
        &self.misuses
    }

    /// Looks up a misuse by its short id.
    pub fn misuse(&self, misuse_id: &str) -> Option<&Arc<Misuse>> {
        self.misuses.iter().find(|m| m.misuse_id == misuse_id)
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }
}

impl fmt::Display for ProjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version '{}'", self.id)
    }
}

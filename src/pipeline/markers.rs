//! Marker files recording task outcomes on disk.
//!
//! A resumed run reads these to tell "not yet attempted" from "attempted and
//! failed" without repeating expensive work:
//!
//! - `.<task>.success`: the task completed.
//! - `.<task>.failed`: the task failed; holds the reason.
//! - `.ignored`: the version is excluded from the benchmark.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::utils::write_atomic;

const IGNORED_MARKER: &str = ".ignored";

/// Outcome recorded by a previous attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    NotAttempted,
    Succeeded,
    Failed(String),
}

/// Success/failure markers of one task in one state directory.
#[derive(Debug, Clone)]
pub struct Markers {
    success: PathBuf,
    failed: PathBuf,
}

impl Markers {
    pub fn new(dir: &Path, task: &str) -> Self {
        Self {
            success: dir.join(format!(".{task}.success")),
            failed: dir.join(format!(".{task}.failed")),
        }
    }

    /// Reads the recorded state. A failure marker wins over a stale success marker.
    pub fn state(&self) -> io::Result<MarkerState> {
        if self.failed.is_file() {
            let reason = fs::read_to_string(&self.failed)?;
            return Ok(MarkerState::Failed(reason.trim().to_string()));
        }
        if self.success.is_file() {
            return Ok(MarkerState::Succeeded);
        }
        Ok(MarkerState::NotAttempted)
    }

    pub fn mark_success(&self) -> io::Result<()> {
        remove_if_exists(&self.failed)?;
        write_atomic(&self.success, "")
    }

    pub fn mark_failed(&self, reason: &str) -> io::Result<()> {
        remove_if_exists(&self.success)?;
        write_atomic(&self.failed, reason)
    }

    /// Forgets any previous attempt.
    pub fn clear(&self) -> io::Result<()> {
        remove_if_exists(&self.success)?;
        remove_if_exists(&self.failed)
    }
}

/// Records that a version is excluded.
pub fn mark_ignored(dir: &Path) -> io::Result<()> {
    write_atomic(&dir.join(IGNORED_MARKER), "")
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marker_lifecycle() {
        let temp = TempDir::new().unwrap();
        let markers = Markers::new(temp.path(), "compile");
        assert_eq!(markers.state().unwrap(), MarkerState::NotAttempted);

        markers.mark_failed("exit code 2").unwrap();
        assert_eq!(
            markers.state().unwrap(),
            MarkerState::Failed("exit code 2".to_string())
        );

        markers.mark_success().unwrap();
        assert_eq!(markers.state().unwrap(), MarkerState::Succeeded);
        assert!(!temp.path().join(".compile.failed").exists());

        markers.clear().unwrap();
        assert_eq!(markers.state().unwrap(), MarkerState::NotAttempted);
    }

    #[test]
    fn test_markers_are_per_task() {
        let temp = TempDir::new().unwrap();
        Markers::new(temp.path(), "checkout").mark_success().unwrap();
        assert_eq!(
            Markers::new(temp.path(), "compile").state().unwrap(),
            MarkerState::NotAttempted
        );
    }

    #[test]
    fn test_ignored_marker() {
        let temp = TempDir::new().unwrap();
        mark_ignored(temp.path()).unwrap();
        assert!(temp.path().join(IGNORED_MARKER).is_file());
    }
}

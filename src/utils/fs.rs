//! Atomic clear/replace operations on the benchmark's output trees.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Empties `dir`, creating it if needed.
///
/// The old directory is first renamed to a unique `*.stale-<uuid>` sibling, so
/// readers see either the complete old tree or an empty new one.
pub fn reset_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        let stale = sibling(dir, &format!("stale-{}", Uuid::new_v4()));
        fs::rename(dir, &stale)?;
        fs::remove_dir_all(&stale)?;
    }
    fs::create_dir_all(dir)
}

/// Writes `contents` to `path` through a temporary sibling and a rename.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling(path, &format!("tmp-{}", Uuid::new_v4()));
    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Recursively copies `src` into `dst`.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst)?;
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}

/// Returns true if `path` exists and was modified no earlier than every file in `others`.
pub fn is_newer(path: &Path, others: &[PathBuf]) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    others.iter().all(|other| {
        fs::metadata(other)
            .and_then(|m| m.modified())
            .map(|other_modified| modified >= other_modified)
            .unwrap_or(false)
    })
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reset_dir_clears_contents() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("out");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/old.txt"), "old").unwrap();

        reset_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        // No stale siblings left behind.
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_reset_dir_creates_missing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a/b");
        reset_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_write_atomic_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub/result.csv");
        write_atomic(&path, "a long first version").unwrap();
        write_atomic(&path, "short").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "short");
        assert_eq!(fs::read_dir(temp.path().join("sub")).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("pkg")).unwrap();
        fs::write(src.join("pkg/A.java"), "class A {}").unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("pkg/A.java")).unwrap(), "class A {}");
    }

    #[test]
    fn test_is_newer() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("old");
        let new = temp.path().join("new");
        fs::write(&old, "").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&new, "").unwrap();

        assert!(is_newer(&new, &[old.clone()]));
        assert!(!is_newer(&old, &[new.clone()]));
        assert!(!is_newer(&temp.path().join("missing"), &[old]));
    }
}

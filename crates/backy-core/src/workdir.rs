//! Per-backup working directory under the OS user data path.
//!
//! Every invocation gets a private directory named `<db>_<YYYYMMDD_HHMMSS>`
//! in which all intermediate artifacts are produced. The directory is
//! removed on every exit path; a half-written bundle is never left for the
//! next invocation to trip over.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{CoreError, Result};

/// Application directory name under the user data path.
const APP_DIR: &str = "backy";

/// Timestamp in the `YYYYMMDD_HHMMSS` form used in bundle and file names.
pub fn backup_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Scoped working directory for one backup or restore invocation.
///
/// Dropping the guard removes the directory tree; [`WorkingDir::remove`]
/// does the same eagerly and reports failures.
#[derive(Debug)]
pub struct WorkingDir {
    root: PathBuf,
    removed: bool,
}

impl WorkingDir {
    /// Create `<data_dir>/backy/<db>_<timestamp>/`.
    pub fn create(db_name: &str, timestamp: &str) -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| CoreError::WorkingDir("no user data directory available".into()))?
            .join(APP_DIR);
        Self::create_under(&base, db_name, timestamp)
    }

    /// Create the per-backup directory under an explicit base. Used by tests
    /// and by callers that relocate the processing area.
    pub fn create_under(base: &Path, db_name: &str, timestamp: &str) -> Result<Self> {
        let root = base.join(format!("{db_name}_{timestamp}"));
        fs::create_dir_all(&root)?;
        info!(path = %root.display(), "working directory created");
        Ok(Self {
            root,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Staging subdirectory the extractor writes payload files into.
    pub fn payload_dir(&self) -> Result<PathBuf> {
        let dir = self.root.join("backup");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Every regular file directly inside the working directory, sorted by
    /// name for deterministic manifests.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Remove the directory tree now instead of at drop time.
    pub fn remove(mut self) {
        self.remove_inner();
    }

    fn remove_inner(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match fs::remove_dir_all(&self.root) {
            Ok(()) => info!(path = %self.root.display(), "working directory removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.root.display(),
                error = %err,
                "failed to remove working directory"
            ),
        }
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        self.remove_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_drop_removes_tree() {
        let base = tempfile::tempdir().unwrap();
        let path;
        {
            let workdir = WorkingDir::create_under(base.path(), "shop", "20231001_120000").unwrap();
            path = workdir.path().to_path_buf();
            assert!(path.is_dir());
            assert!(path.ends_with("shop_20231001_120000"));
            fs::write(path.join("a.sql"), b"x").unwrap();
        }
        assert!(!path.exists());
    }

    #[test]
    fn files_are_sorted_and_exclude_directories() {
        let base = tempfile::tempdir().unwrap();
        let workdir = WorkingDir::create_under(base.path(), "shop", "20231001_120001").unwrap();
        workdir.payload_dir().unwrap();
        fs::write(workdir.path().join("b.bin"), b"b").unwrap();
        fs::write(workdir.path().join("a.bin"), b"a").unwrap();

        let names: Vec<String> = workdir
            .files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.bin", "b.bin"]);
    }

    #[test]
    fn timestamp_has_expected_shape() {
        let ts = backup_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.chars().nth(8), Some('_'));
    }
}

//! Local filesystem storage: bundles live as directories under a root.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, StorageError};
use crate::{relative_files, StorageBackend};

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn copy_tree(from: &Path, to: &Path) -> Result<()> {
        for relative in relative_files(from)? {
            let dest = to.join(&relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(from.join(&relative), dest)?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn upload(&self, local_path: &Path) -> Result<String> {
        let key = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::UploadFailed("bundle path has no name".into()))?;
        let dest = self.root.join(&key);
        fs::create_dir_all(&dest)?;
        Self::copy_tree(local_path, &dest)
            .map_err(|err| StorageError::UploadFailed(err.to_string()))?;
        info!(key, dest = %dest.display(), "bundle uploaded to local storage");
        Ok(key)
    }

    async fn download(&self, object_key: &str, dest_dir: &Path) -> Result<PathBuf> {
        let source = self.root.join(object_key);
        if !source.is_dir() {
            return Err(StorageError::ObjectNotFound(object_key.to_string()));
        }
        fs::create_dir_all(dest_dir)?;
        Self::copy_tree(&source, dest_dir)
            .map_err(|err| StorageError::DownloadFailed(err.to_string()))?;
        info!(key = object_key, dest = %dest_dir.display(), "bundle downloaded from local storage");
        Ok(dest_dir.to_path_buf())
    }

    async fn delete(&self, object_key: &str) -> Result<()> {
        let target = self.root.join(object_key);
        if !target.exists() {
            return Err(StorageError::ObjectNotFound(object_key.to_string()));
        }
        fs::remove_dir_all(&target).map_err(|err| StorageError::DeleteFailed(err.to_string()))?;
        info!(key = object_key, "bundle deleted from local storage");
        Ok(())
    }

    async fn validate_credentials(&self) -> Result<bool> {
        fs::create_dir_all(&self.root)?;
        let probe = self.root.join(".backy-write-probe");
        match fs::write(&probe, b"probe") {
            Ok(()) => {
                let _ = fs::remove_file(&probe);
                Ok(true)
            }
            Err(err) => Err(StorageError::CredentialsRejected(err.to_string())),
        }
    }
}

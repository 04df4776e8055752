//! # Backy Storage
//!
//! Object storage behind one contract: upload a finished bundle directory
//! and get back an opaque object key; download a key into a local
//! directory; delete a key; check credentials. The metadata sidecar records
//! object keys verbatim.

pub mod error;
pub mod local;
pub mod s3;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use backy_core::{StorageConfig, StorageKind};

pub use error::{Result, StorageError};
pub use local::LocalStorage;
pub use s3::S3Storage;

/// The storage adapter contract.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upload the bundle directory; returns the remote object key.
    async fn upload(&self, local_path: &Path) -> Result<String>;

    /// Download the bundle named by `object_key` into `dest_dir` and return
    /// the local path holding the bundle files.
    async fn download(&self, object_key: &str, dest_dir: &Path) -> Result<PathBuf>;

    /// Remove a bundle from remote storage. Used on upload cancellation so
    /// no partial object survives.
    async fn delete(&self, object_key: &str) -> Result<()>;

    /// Check that the backend is reachable and writable.
    async fn validate_credentials(&self) -> Result<bool>;
}

/// Build the configured backend.
pub async fn create_storage_backend(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    match config.storage_type {
        StorageKind::Local => {
            let root = config.path.clone().ok_or_else(|| {
                StorageError::Configuration("local storage requires a path".into())
            })?;
            Ok(Box::new(LocalStorage::new(root)))
        }
        StorageKind::S3 => {
            let bucket = config.bucket.clone().ok_or_else(|| {
                StorageError::Configuration("s3 storage requires a bucket".into())
            })?;
            Ok(Box::new(
                S3Storage::from_env(bucket, config.region.clone()).await,
            ))
        }
    }
}

/// Regular files under `root`, relative paths, sorted.
pub(crate) fn relative_files(root: &Path) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, root, out)?;
            } else if path.is_file() {
                out.push(
                    path.strip_prefix(root)
                        .expect("walked path is under root")
                        .to_path_buf(),
                );
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

//! Filesystem keystore: one PEM file per key version.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{Result, SecurityError};
use crate::keystore::{version_of_key_id, KeyStore, AUTO_VERSION, KEY_ID_PREFIX};

/// Keys stored as `<store_path>/<key_id>.pem`.
pub struct LocalKeyStore {
    store_path: PathBuf,
}

impl LocalKeyStore {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    fn key_path(&self, key_id: &str) -> PathBuf {
        self.store_path.join(format!("{key_id}.pem"))
    }

    /// Scan the store for the highest-versioned key file.
    async fn latest_key_id(&self) -> Result<Option<String>> {
        let mut entries = match fs::read_dir(&self.store_path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut latest: Option<(u32, String)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name.strip_suffix(".pem") else {
                continue;
            };
            if !stem.starts_with(KEY_ID_PREFIX) {
                continue;
            }
            if let Some(version) = version_of_key_id(stem) {
                if latest.as_ref().is_none_or(|(v, _)| version > *v) {
                    latest = Some((version, stem.to_string()));
                }
            }
        }
        Ok(latest.map(|(_, id)| id))
    }
}

#[async_trait]
impl KeyStore for LocalKeyStore {
    async fn save(&self, key_id: &str, data: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.store_path).await?;
        let path = self.key_path(key_id);
        fs::write(&path, data).await?;
        info!(key_id, path = %path.display(), "key saved to local store");
        Ok(())
    }

    async fn load(&self, key_id: &str) -> Result<Vec<u8>> {
        let path = self.key_path(key_id);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                SecurityError::KeyNotFound(format!("{key_id} not found in local store")),
            ),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key_id: &str) -> Result<()> {
        let path = self.key_path(key_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(key_id, "key deleted from local store");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                SecurityError::KeyNotFound(format!("{key_id} not found in local store")),
            ),
            Err(err) => Err(err.into()),
        }
    }

    async fn validate(&self, key_id: &str) -> Result<Option<String>> {
        if !self.store_path.is_dir() {
            warn!(path = %self.store_path.display(), "key store path does not exist");
            return Ok(None);
        }
        if key_id == AUTO_VERSION {
            return self.latest_key_id().await;
        }
        if self.key_path(key_id).is_file() {
            Ok(Some(key_id.to_string()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalKeyStore::new(dir.path());

        store.save("backy_secret_key_1", b"pem bytes").await.unwrap();
        assert_eq!(store.load("backy_secret_key_1").await.unwrap(), b"pem bytes");

        store.delete("backy_secret_key_1").await.unwrap();
        assert!(matches!(
            store.load("backy_secret_key_1").await,
            Err(SecurityError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_load_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalKeyStore::new(dir.path());
        assert!(matches!(
            store.load("backy_secret_key_9").await,
            Err(SecurityError::KeyNotFound(_))
        ));
        assert!(matches!(
            store.delete("backy_secret_key_9").await,
            Err(SecurityError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn validate_resolves_auto_to_highest_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalKeyStore::new(dir.path());
        store.save("backy_secret_key_1", b"a").await.unwrap();
        store.save("backy_secret_key_3", b"c").await.unwrap();
        store.save("backy_secret_key_2", b"b").await.unwrap();
        store.save("unrelated", b"x").await.unwrap();

        assert_eq!(
            store.validate("auto").await.unwrap(),
            Some("backy_secret_key_3".to_string())
        );
        assert_eq!(
            store.validate("backy_secret_key_2").await.unwrap(),
            Some("backy_secret_key_2".to_string())
        );
        assert_eq!(store.validate("backy_secret_key_7").await.unwrap(), None);
    }

    #[tokio::test]
    async fn validate_on_missing_store_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalKeyStore::new(dir.path().join("nope"));
        assert_eq!(store.validate("auto").await.unwrap(), None);
    }
}

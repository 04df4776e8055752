//! Amazon S3 storage adapter. A bundle maps to a key prefix with one object
//! per bundle file.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{Result, StorageError};
use crate::{relative_files, StorageBackend};

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    /// Build a client from the ambient AWS environment.
    pub async fn from_env(bucket: String, region: Option<String>) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        Self {
            client: S3Client::new(&config),
            bucket,
        }
    }

    pub fn with_client(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn object_keys_under(&self, prefix: &str) -> Result<Vec<String>> {
        let listed = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(format!("{prefix}/"))
            .send()
            .await
            .map_err(|err| StorageError::DownloadFailed(format!("failed to list objects: {err}")))?;
        Ok(listed
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn upload(&self, local_path: &Path) -> Result<String> {
        let key_prefix = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::UploadFailed("bundle path has no name".into()))?;

        let files = relative_files(local_path)?;
        let mut uploaded: Vec<String> = Vec::with_capacity(files.len());
        for relative in &files {
            let object_key = format!("{key_prefix}/{}", relative.to_string_lossy());
            let body = ByteStream::from_path(local_path.join(relative))
                .await
                .map_err(|err| StorageError::UploadFailed(err.to_string()))?;
            let result = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&object_key)
                .body(body)
                .send()
                .await;
            if let Err(err) = result {
                // Best-effort removal of the partial bundle before failing.
                for partial in &uploaded {
                    if let Err(cleanup_err) = self
                        .client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(partial)
                        .send()
                        .await
                    {
                        warn!(key = %partial, error = %cleanup_err, "failed to clean up partial upload");
                    }
                }
                return Err(StorageError::UploadFailed(err.to_string()));
            }
            uploaded.push(object_key);
        }
        info!(key = %key_prefix, objects = uploaded.len(), bucket = %self.bucket, "bundle uploaded to S3");
        Ok(key_prefix)
    }

    async fn download(&self, object_key: &str, dest_dir: &Path) -> Result<PathBuf> {
        let keys = self.object_keys_under(object_key).await?;
        if keys.is_empty() {
            return Err(StorageError::ObjectNotFound(object_key.to_string()));
        }
        fs::create_dir_all(dest_dir).await?;

        for key in keys {
            let relative = key
                .strip_prefix(&format!("{object_key}/"))
                .unwrap_or(&key)
                .to_string();
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|err| StorageError::DownloadFailed(err.to_string()))?;
            let bytes = response
                .body
                .collect()
                .await
                .map_err(|err| StorageError::DownloadFailed(err.to_string()))?
                .into_bytes();
            let dest = dest_dir.join(&relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&dest, &bytes).await?;
        }
        info!(key = object_key, dest = %dest_dir.display(), "bundle downloaded from S3");
        Ok(dest_dir.to_path_buf())
    }

    async fn delete(&self, object_key: &str) -> Result<()> {
        let keys = self.object_keys_under(object_key).await?;
        if keys.is_empty() {
            return Err(StorageError::ObjectNotFound(object_key.to_string()));
        }
        for key in keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|err| StorageError::DeleteFailed(err.to_string()))?;
        }
        info!(key = object_key, "bundle deleted from S3");
        Ok(())
    }

    async fn validate_credentials(&self) -> Result<bool> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| StorageError::CredentialsRejected(err.to_string()))?;
        Ok(true)
    }
}

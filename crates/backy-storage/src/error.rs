//! Error types for the storage adapters.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage configuration error: {0}")]
    Configuration(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Credential validation failed: {0}")]
    CredentialsRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

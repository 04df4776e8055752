//! Error types for the security crate.

use thiserror::Error;

/// Key, encryption and integrity faults.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Failed to wrap symmetric key: {0}")]
    KeyWrapFailed(String),

    #[error("Failed to unwrap symmetric key: {0}")]
    KeyUnwrapFailed(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Integrity mismatch for file {0}")]
    IntegrityMismatch(String),

    #[error("File listed in manifest is missing: {0}")]
    MissingFile(String),

    #[error("Malformed integrity manifest: {0}")]
    MalformedManifest(String),

    #[error("KMS error: {0}")]
    Kms(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for security operations.
pub type Result<T> = std::result::Result<T, SecurityError>;

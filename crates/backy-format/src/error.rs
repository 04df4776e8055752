//! Error types for the container format.

use backy_core::Feature;
use thiserror::Error;

/// Container-level faults.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Corrupted or incomplete chunk metadata: {0}")]
    CorruptMetadata(String),

    #[error("Corrupted or incomplete {feature} payload: expected {expected} bytes, got {actual}")]
    CorruptPayload {
        feature: Feature,
        expected: usize,
        actual: usize,
    },

    #[error("Trailing garbage after the last complete chunk ({0} bytes)")]
    TrailingGarbage(usize),

    #[error("Chunk metadata exceeds the {limit} byte ceiling ({actual} bytes)")]
    MetadataTooLarge { limit: usize, actual: usize },

    #[error("Invalid UTF-8 payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Unknown feature tag in chunk metadata: {0}")]
    UnknownFeature(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, FormatError>;

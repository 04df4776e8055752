//! Error types for the database layer.

use backy_core::Feature;
use thiserror::Error;

/// Boxed error type statement sinks may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Database-layer faults.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to connect to MySQL database: {0}")]
    ConnectionFailed(String),

    #[error("Error extracting {feature} statements: {message}")]
    ExtractionFailed { feature: Feature, message: String },

    #[error("Cycle detected in dependency graph, cannot perform topological sort")]
    CycleDetected,

    #[error("SQL parse error: {0}")]
    ParseError(String),

    #[error("Conflict during replay: {0}")]
    ConflictDetected(String),

    #[error("Unknown conflict handling mode: {0}")]
    UnknownConflictMode(String),

    #[error("Statement sink error: {0}")]
    Sink(#[source] BoxError),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Wrap an introspection failure with the feature it happened in.
    pub fn extraction(feature: Feature, err: impl std::fmt::Display) -> Self {
        DbError::ExtractionFailed {
            feature,
            message: err.to_string(),
        }
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

//! Error types for the orchestration layer.

use thiserror::Error;

/// A pipeline failure annotated with the stage it happened in.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("[{stage}] {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Core(#[from] backy_core::CoreError),

    #[error(transparent)]
    Db(#[from] backy_db::DbError),

    #[error(transparent)]
    Format(#[from] backy_format::FormatError),

    #[error(transparent)]
    Security(#[from] backy_security::SecurityError),

    #[error(transparent)]
    Compression(#[from] backy_compression::CompressionError),

    #[error(transparent)]
    Storage(#[from] backy_storage::StorageError),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Wrap an error with the pipeline stage it escaped from.
    pub fn at_stage(stage: &'static str) -> impl FnOnce(EngineError) -> EngineError {
        move |source| EngineError::Stage {
            stage,
            source: Box::new(source),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

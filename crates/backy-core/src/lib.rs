//! # Backy Core
//!
//! Shared foundation for the Backy backup engine: the feature model, the
//! explicit configuration records, and the per-backup working directory.
//!
//! Everything downstream (extraction, container framing, encryption,
//! orchestration) is parameterised by the types in this crate. There is no
//! module-level mutable state; components receive what they need by
//! construction.

pub mod config;
pub mod error;
pub mod feature;
pub mod workdir;

pub use config::{
    BackupConfig, BackupType, CompressionConfig, CompressionKind, CompressionLevel,
    ConflictMode, DatabaseConfig, DatabaseKind, FeatureToggles, IntegrityAlgorithm,
    IntegrityConfig, KeyProvider, RestoreConfig, RestoreMode, SecurityConfig, SecurityKind,
    StorageConfig, StorageKind,
};
pub use error::{CoreError, Result};
pub use feature::{Feature, Statement};
pub use workdir::{backup_timestamp, WorkingDir};

/// Version information for the engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

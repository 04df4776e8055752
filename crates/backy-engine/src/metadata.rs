//! The metadata sidecar: the single source of truth a restore consults to
//! invert the backup pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use backy_core::{
    BackupConfig, BackupType, CompressionKind, CompressionLevel, ConflictMode, DatabaseKind,
    FeatureToggles, IntegrityAlgorithm, KeyProvider, RestoreMode, SecurityKind, StorageKind,
};
use backy_db::DbError;

use crate::error::{EngineError, Result};

/// Sidecar file names end with `_metadata.<payload ext>.json`.
pub const METADATA_SUFFIX: &str = ".json";

/// Where and how the backup was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSection {
    pub creation_time: String,
    pub platform: String,
    pub machine: String,
    pub engine_version: String,
}

/// What the bundle contains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSection {
    pub backup_id: Uuid,
    pub backup_time: String,
    pub files: Vec<String>,
    pub total_files: usize,
    pub total_size: u64,
    pub backup_type: BackupType,
    pub description: Option<String>,
    pub expiry_date: Option<String>,
}

/// Source database identity and the replay contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub db_type: DatabaseKind,
    pub db_version: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub db_name: String,
    pub multiple_files: bool,
    pub features: FeatureToggles,
    pub restore_mode: Option<RestoreMode>,
    /// Kept as text so an unrecognised mode is reported as such before
    /// replay rather than rejected as unparseable metadata.
    pub conflict_mode: String,
}

impl DatabaseSection {
    /// The conflict policy, failing with `UnknownConflictMode` for any value
    /// other than `skip` / `abort`.
    pub fn conflict_mode(&self) -> Result<ConflictMode> {
        match self.conflict_mode.as_str() {
            "skip" => Ok(ConflictMode::Skip),
            "abort" => Ok(ConflictMode::Abort),
            other => Err(EngineError::Db(DbError::UnknownConflictMode(
                other.to_string(),
            ))),
        }
    }

    /// Restore mode declared at backup time, defaulting by payload format.
    pub fn effective_restore_mode(&self, backup_type: BackupType) -> RestoreMode {
        self.restore_mode.unwrap_or(match backup_type {
            BackupType::Sql => RestoreMode::File,
            BackupType::Backy => RestoreMode::Backy,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSection {
    pub enabled: bool,
    pub compression_type: Option<CompressionKind>,
    pub level: Option<CompressionLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySection {
    pub enabled: bool,
    pub security_type: Option<SecurityKind>,
    pub provider: Option<KeyProvider>,
    pub key_size: Option<u32>,
    pub key_version: Option<String>,
    /// File name of the wrapped symmetric key inside the bundle.
    pub encryption_file: Option<String>,
}

impl SecuritySection {
    /// The key identity, from the recorded version or the wrapped-key file
    /// name.
    pub fn key_id(&self) -> Option<String> {
        if let Some(version) = &self.key_version {
            return Some(format!("backy_secret_key_{version}"));
        }
        self.encryption_file
            .as_deref()
            .and_then(|name| name.strip_suffix(".enc"))
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegritySection {
    pub enabled: bool,
    pub algorithm: Option<IntegrityAlgorithm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    pub storage_type: StorageKind,
    pub object_key: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

/// The full seven-section sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSidecar {
    pub general: GeneralSection,
    pub backup: BackupSection,
    pub database: DatabaseSection,
    pub compression: CompressionSection,
    pub security: SecuritySection,
    pub integrity: IntegritySection,
    pub storage: StorageSection,
}

/// Inputs the builder cannot read off the config: what actually happened
/// during the run.
pub struct BackupFacts<'a> {
    pub timestamp: &'a str,
    pub db_version: &'a str,
    pub payload_files: Vec<(String, u64)>,
    pub key_id: Option<String>,
    pub object_key: &'a str,
}

impl MetadataSidecar {
    /// Assemble the sidecar from the invocation config and the run facts.
    pub fn build(config: &BackupConfig, facts: &BackupFacts<'_>) -> Self {
        let total_size = facts.payload_files.iter().map(|(_, size)| size).sum();
        let file_names: Vec<String> = facts
            .payload_files
            .iter()
            .map(|(name, _)| name.clone())
            .collect();

        let expiry_date = config.expiry_days.map(|days| {
            (Utc::now() + chrono::Duration::days(days as i64))
                .format("%Y-%m-%d")
                .to_string()
        });

        MetadataSidecar {
            general: GeneralSection {
                creation_time: Utc::now().to_rfc3339(),
                platform: std::env::consts::OS.to_string(),
                machine: std::env::consts::ARCH.to_string(),
                engine_version: backy_core::VERSION.to_string(),
            },
            backup: BackupSection {
                backup_id: Uuid::new_v4(),
                backup_time: facts.timestamp.to_string(),
                total_files: file_names.len(),
                files: file_names,
                total_size,
                backup_type: config.database.backup_type,
                description: config.description.clone(),
                expiry_date,
            },
            database: DatabaseSection {
                db_type: config.database.db_type,
                db_version: facts.db_version.to_string(),
                host: config.database.host.clone(),
                port: config.database.port,
                user: config.database.user.clone(),
                db_name: config.database.db_name.clone(),
                multiple_files: config.database.multiple_files,
                features: config.database.features,
                restore_mode: config.database.restore_mode,
                conflict_mode: match config.database.conflict_mode {
                    ConflictMode::Skip => "skip".to_string(),
                    ConflictMode::Abort => "abort".to_string(),
                },
            },
            compression: CompressionSection {
                enabled: config.compression.enabled,
                compression_type: config.compression_kind(),
                level: config.compression.enabled.then_some(config.compression.level),
            },
            security: SecuritySection {
                enabled: config.security.enabled,
                security_type: config.security.enabled.then_some(config.security.security_type),
                provider: config.security.enabled.then_some(config.security.provider),
                key_size: config.security.enabled.then_some(config.security.key_size),
                key_version: facts.key_id.as_deref().and_then(|id| {
                    id.strip_prefix("backy_secret_key_").map(str::to_string)
                }),
                encryption_file: facts.key_id.as_ref().map(|id| format!("{id}.enc")),
            },
            integrity: IntegritySection {
                enabled: config.integrity.enabled,
                algorithm: config.integrity.algorithm,
            },
            storage: StorageSection {
                storage_type: config.storage.storage_type,
                object_key: Some(facts.object_key.to_string()),
                bucket: config.storage.bucket.clone(),
                region: config.storage.region.clone(),
            },
        }
    }

    /// Sidecar file name for a bundle.
    pub fn file_name(db_name: &str, timestamp: &str, backup_type: BackupType) -> String {
        let ext = match backup_type {
            BackupType::Sql => "sql",
            BackupType::Backy => "backy",
        };
        format!("{db_name}_{timestamp}_metadata.{ext}{METADATA_SUFFIX}")
    }

    /// Write the sidecar into the bundle directory.
    pub fn write(&self, dir: &Path, timestamp: &str) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(
            &self.database.db_name,
            timestamp,
            self.backup.backup_type,
        ));
        fs::write(&path, serde_json::to_vec_pretty(self).map_err(|err| {
            EngineError::Metadata(format!("failed to encode sidecar: {err}"))
        })?)?;
        info!(path = %path.display(), "metadata sidecar written");
        Ok(path)
    }

    /// Locate and parse the sidecar in a downloaded bundle directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .map(|name| {
                            let name = name.to_string_lossy();
                            name.contains("_metadata.") && name.ends_with(METADATA_SUFFIX)
                        })
                        .unwrap_or(false)
            })
            .collect();
        candidates.sort();

        let path = candidates.into_iter().next().ok_or_else(|| {
            EngineError::Metadata(format!("no metadata sidecar found in {}", dir.display()))
        })?;
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|err| EngineError::Metadata(format!("failed to parse sidecar: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackupConfig {
        BackupConfig::from_json(
            &serde_json::json!({
                "database": {
                    "host": "localhost",
                    "port": 3306,
                    "user": "root",
                    "password": "secret",
                    "db_name": "shop",
                    "backup_type": "backy",
                    "conflict_mode": "abort"
                },
                "storage": { "storage_type": "local", "path": "/tmp/backups" },
                "compression": { "enabled": true, "compression_type": "targz" },
                "security": { "enabled": true },
                "integrity": { "enabled": true, "algorithm": "sha256" }
            })
            .to_string(),
        )
        .unwrap()
    }

    fn sidecar() -> MetadataSidecar {
        MetadataSidecar::build(
            &config(),
            &BackupFacts {
                timestamp: "20231001_120000",
                db_version: "8.0.36",
                payload_files: vec![("backup.tar.gz.enc".into(), 2048)],
                key_id: Some("backy_secret_key_2".into()),
                object_key: "shop_20231001_120000",
            },
        )
    }

    #[test]
    fn sidecar_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let built = sidecar();
        built.write(dir.path(), "20231001_120000").unwrap();

        let loaded = MetadataSidecar::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.database.db_name, "shop");
        assert_eq!(loaded.backup.files, vec!["backup.tar.gz.enc"]);
        assert_eq!(loaded.backup.total_size, 2048);
        assert_eq!(loaded.security.key_version.as_deref(), Some("2"));
        assert_eq!(
            loaded.security.encryption_file.as_deref(),
            Some("backy_secret_key_2.enc")
        );
        assert_eq!(
            loaded.storage.object_key.as_deref(),
            Some("shop_20231001_120000")
        );
    }

    #[test]
    fn file_name_reflects_payload_format() {
        assert_eq!(
            MetadataSidecar::file_name("shop", "20231001_120000", BackupType::Backy),
            "shop_20231001_120000_metadata.backy.json"
        );
        assert_eq!(
            MetadataSidecar::file_name("shop", "20231001_120000", BackupType::Sql),
            "shop_20231001_120000_metadata.sql.json"
        );
    }

    #[test]
    fn key_id_falls_back_to_the_wrapped_key_file() {
        let mut section = sidecar().security;
        assert_eq!(section.key_id().as_deref(), Some("backy_secret_key_2"));
        section.key_version = None;
        assert_eq!(section.key_id().as_deref(), Some("backy_secret_key_2"));
        section.encryption_file = None;
        assert_eq!(section.key_id(), None);
    }

    #[test]
    fn unknown_conflict_mode_is_surfaced_before_replay() {
        let mut database = sidecar().database;
        assert!(matches!(
            database.conflict_mode().unwrap(),
            ConflictMode::Abort
        ));
        database.conflict_mode = "merge".to_string();
        assert!(matches!(
            database.conflict_mode(),
            Err(EngineError::Db(DbError::UnknownConflictMode(_)))
        ));
    }

    #[test]
    fn restore_mode_defaults_by_payload_format() {
        let database = sidecar().database;
        assert_eq!(
            database.effective_restore_mode(BackupType::Backy),
            RestoreMode::Backy
        );
        assert_eq!(
            database.effective_restore_mode(BackupType::Sql),
            RestoreMode::File
        );
    }

    #[test]
    fn missing_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MetadataSidecar::load_from_dir(dir.path()).is_err());
    }
}

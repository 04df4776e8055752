//! Explicit configuration records for backup and restore invocations.
//!
//! Every option is an enumerated field on a concrete struct; unknown fields
//! are rejected at load time and cross-field rules are checked by
//! [`BackupConfig::validate`] / [`RestoreConfig::validate`] before any I/O
//! happens.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoreError, Result};
use crate::feature::Feature;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Mysql,
}

impl Default for DatabaseKind {
    fn default() -> Self {
        DatabaseKind::Mysql
    }
}

/// Output format of the backup payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Plain reloadable SQL text files.
    Sql,
    /// The chunked `.backy` container, one chunk per statement.
    Backy,
}

impl Default for BackupType {
    fn default() -> Self {
        BackupType::Sql
    }
}

/// How the restore replayer obtains statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// A single SQL file is fed through the dialect parser.
    File,
    /// Each container chunk is already one statement; no parser step.
    Backy,
}

/// Per-statement reaction to a database-reported conflict during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Log the conflict and continue with the next statement.
    Skip,
    /// Re-raise the conflict and roll the transaction back.
    Abort,
}

impl Default for ConflictMode {
    fn default() -> Self {
        ConflictMode::Skip
    }
}

/// Which feature categories an invocation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureToggles {
    pub tables: bool,
    pub data: bool,
    pub views: bool,
    pub functions: bool,
    pub procedures: bool,
    pub triggers: bool,
    pub events: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            tables: true,
            data: true,
            views: false,
            functions: false,
            procedures: false,
            triggers: false,
            events: false,
        }
    }
}

impl FeatureToggles {
    /// The enabled features in the fixed emission order.
    pub fn enabled(&self) -> Vec<Feature> {
        Feature::ORDER
            .into_iter()
            .filter(|f| self.contains(*f))
            .collect()
    }

    /// Whether a feature tag is eligible. `Full` is always eligible.
    pub fn contains(&self, feature: Feature) -> bool {
        match feature {
            Feature::Tables => self.tables,
            Feature::Data => self.data,
            Feature::Views => self.views,
            Feature::Functions => self.functions,
            Feature::Procedures => self.procedures,
            Feature::Triggers => self.triggers,
            Feature::Events => self.events,
            Feature::Full => true,
        }
    }

    /// Enable every feature category.
    pub fn all() -> Self {
        Self {
            tables: true,
            data: true,
            views: true,
            functions: true,
            procedures: true,
            triggers: true,
            events: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled().is_empty()
    }
}

/// Connection identity and extraction options for the source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
    #[serde(default)]
    pub db_type: DatabaseKind,
    #[serde(default)]
    pub backup_type: BackupType,
    /// One payload file per feature instead of a single monolithic file.
    #[serde(default)]
    pub multiple_files: bool,
    #[serde(default)]
    pub features: FeatureToggles,
    #[serde(default)]
    pub restore_mode: Option<RestoreMode>,
    #[serde(default)]
    pub conflict_mode: ConflictMode,
}

/// Where the finished bundle is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub storage_type: StorageKind,
    /// Destination root for local storage.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// Compression format tags recognised in the metadata sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Zip,
    Tar,
    Targz,
}

impl CompressionKind {
    /// The file extension an archive of this kind carries.
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionKind::Zip => "zip",
            CompressionKind::Tar => "tar",
            CompressionKind::Targz => "tar.gz",
        }
    }
}

/// Effort/ratio trade-off for the compressing formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fast,
    Balanced,
    Best,
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::Balanced
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub compression_type: Option<CompressionKind>,
    pub level: CompressionLevel,
}

/// Backend holding the asymmetric half of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityKind {
    Keystore,
    Kms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyProvider {
    Local,
    Aws,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    pub enabled: bool,
    pub security_type: SecurityKind,
    pub provider: KeyProvider,
    /// RSA modulus size in bits for freshly generated key pairs.
    pub key_size: u32,
    /// `backy_secret_key_<N>` version to use, or `auto` for the newest.
    pub key_version: String,
    /// Directory holding keystore PEM files; defaults next to the data dir.
    pub keystore_path: Option<PathBuf>,
    /// A previously written wrapped-key file to reuse instead of generating
    /// a fresh symmetric key.
    pub wrapped_key_file: Option<PathBuf>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            security_type: SecurityKind::Keystore,
            provider: KeyProvider::Local,
            key_size: 4096,
            key_version: "auto".to_string(),
            keystore_path: None,
            wrapped_key_file: None,
        }
    }
}

/// Integrity-proof algorithm for the bundle manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityAlgorithm {
    Sha256,
    Hmac,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrityConfig {
    pub enabled: bool,
    pub algorithm: Option<IntegrityAlgorithm>,
    pub password: Option<String>,
}

/// Complete configuration of one backup invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
    #[serde(default)]
    pub description: Option<String>,
    /// Days until the bundle may be expired by retention tooling.
    #[serde(default)]
    pub expiry_days: Option<u32>,
}

impl BackupConfig {
    /// Load a configuration from JSON text, rejecting unknown fields.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field rules the serde layer cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.database.features.is_empty() {
            return Err(CoreError::Configuration(
                "at least one feature must be enabled for backup".into(),
            ));
        }
        self.storage.validate()?;
        if self.compression.enabled && self.compression.compression_type.is_none() {
            tracing::warn!("compression enabled without a type; defaulting to zip");
        }
        if self.security.enabled && self.security.key_version != "auto" {
            parse_key_version(&self.security.key_version)?;
        }
        if self.integrity.enabled {
            match self.integrity.algorithm {
                Some(IntegrityAlgorithm::Hmac) if self.integrity.password.is_none() => {
                    return Err(CoreError::Configuration(
                        "HMAC integrity requires a password".into(),
                    ));
                }
                None => {
                    return Err(CoreError::Configuration(
                        "integrity enabled without an algorithm".into(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Effective compression kind once defaults are applied.
    pub fn compression_kind(&self) -> Option<CompressionKind> {
        self.compression
            .enabled
            .then(|| self.compression.compression_type.unwrap_or(CompressionKind::Zip))
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        match self.storage_type {
            StorageKind::Local if self.path.is_none() => Err(CoreError::Configuration(
                "local storage requires a destination path".into(),
            )),
            StorageKind::S3 if self.bucket.is_none() => Err(CoreError::Configuration(
                "s3 storage requires a bucket".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Complete configuration of one restore invocation.
///
/// Which reverse stages run is decided by the downloaded metadata sidecar;
/// this record only carries what the sidecar cannot know: where the bundle
/// is, how to reach the target database, and which features to replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestoreConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    /// Remote object key recorded in the backup's sidecar.
    pub object_key: String,
    /// Password for HMAC integrity verification, when the sidecar declares it.
    #[serde(default)]
    pub integrity_password: Option<String>,
    /// Directory holding keystore PEM files for unwrapping.
    #[serde(default)]
    pub keystore_path: Option<PathBuf>,
}

impl RestoreConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.object_key.is_empty() {
            return Err(CoreError::Configuration("object_key must not be empty".into()));
        }
        self.storage.validate()
    }
}

/// Parse the `<N>` of a concrete `backy_secret_key_<N>` version string.
pub fn parse_key_version(version: &str) -> Result<u32> {
    version.parse::<u32>().map_err(|_| {
        CoreError::Configuration(format!(
            "key_version must be a positive integer or \"auto\", got {version:?}"
        ))
    })
}

//! The restore pipeline: download, verify, decrypt, decompress, parse,
//! replay. Which reverse stages run is decided by the downloaded metadata
//! sidecar, not by restore-side configuration.

use sqlx::{Connection, MySql, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use backy_compression::compressor_for;
use backy_core::{
    backup_timestamp, Feature, IntegrityAlgorithm, KeyProvider, RestoreConfig, RestoreMode,
    SecurityKind, WorkingDir,
};
use backy_db::{MySqlSession, Replayer, StatementParser};
use backy_format::{bytes_to_str, ChunkReader};
use backy_security::{
    AwsKms, IntegritySpec, IntegrityService, KeyBackend, KeyEngine, LocalKeyStore,
};
use backy_storage::create_storage_backend;

use crate::backup::default_keystore_path;
use crate::error::{EngineError, Result};
use crate::metadata::MetadataSidecar;

/// Outcome of a completed restore.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub object_key: String,
    pub statements_executed: usize,
}

/// Drives the pipeline
/// `Init → Download → Verify? → Decrypt? → Decompress? → Parse →
/// Replay-under-transaction → Commit/Rollback → Cleanup`.
pub struct RestoreOrchestrator {
    config: RestoreConfig,
}

impl RestoreOrchestrator {
    pub fn new(config: RestoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub async fn run(&self) -> Result<RestoreReport> {
        let timestamp = backup_timestamp();
        let dir_tag = format!("{}_restore", self.config.database.db_name);
        let workdir = WorkingDir::create(&dir_tag, &timestamp)
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("working-dir"))?;

        let result = self.run_pipeline(&workdir).await;
        match &result {
            Ok(report) => info!(
                statements = report.statements_executed,
                "restore completed"
            ),
            Err(err) => error!(error = %err, "restore failed, cleaning up"),
        }
        workdir.remove();
        result
    }

    async fn run_pipeline(&self, workdir: &WorkingDir) -> Result<RestoreReport> {
        // Download the bundle.
        let storage = create_storage_backend(&self.config.storage)
            .await
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("download"))?;
        let bundle_dir = storage
            .download(&self.config.object_key, workdir.path())
            .await
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("download"))?;

        // The sidecar is the single source of truth from here on.
        let sidecar = MetadataSidecar::load_from_dir(&bundle_dir)
            .map_err(EngineError::at_stage("metadata"))?;

        if sidecar.integrity.enabled {
            self.verify_integrity(&sidecar, &bundle_dir)
                .map_err(EngineError::at_stage("verify"))?;
        }

        if sidecar.security.enabled {
            self.decrypt_artifacts(&sidecar, &bundle_dir)
                .await
                .map_err(EngineError::at_stage("decrypt"))?;
        }

        let payload_root = if sidecar.compression.enabled {
            self.decompress_archive(&sidecar, &bundle_dir)
                .map_err(EngineError::at_stage("decompress"))?
        } else {
            bundle_dir.clone()
        };

        // Replay.
        let replayer = Replayer::new(sidecar.database.conflict_mode()?);
        let mode = sidecar
            .database
            .effective_restore_mode(sidecar.backup.backup_type);
        let files = payload_files(&payload_root)?;
        if files.is_empty() {
            return Err(EngineError::at_stage("parse")(EngineError::Pipeline(
                "bundle contains no payload files".into(),
            )));
        }

        let mut session = MySqlSession::connect_to_server(&self.config.database)
            .await
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("connect"))?;

        let mut tx = session.connection().begin().await?;
        let replayed = self.replay_files(&mut tx, &replayer, mode, &files).await;
        let executed = match replayed {
            Ok(executed) => {
                tx.commit().await?;
                executed
            }
            Err(err) => {
                tx.rollback().await?;
                return Err(EngineError::at_stage("replay")(err));
            }
        };
        session.close().await.ok();

        Ok(RestoreReport {
            object_key: self.config.object_key.clone(),
            statements_executed: executed,
        })
    }

    fn verify_integrity(&self, sidecar: &MetadataSidecar, bundle_dir: &Path) -> Result<()> {
        let spec = match sidecar.integrity.algorithm {
            Some(IntegrityAlgorithm::Sha256) => IntegritySpec::Sha256,
            Some(IntegrityAlgorithm::Hmac) => {
                let password = self.config.integrity_password.clone().ok_or_else(|| {
                    EngineError::Pipeline(
                        "bundle uses HMAC integrity but no password was configured".into(),
                    )
                })?;
                IntegritySpec::Hmac { password }
            }
            None => {
                return Err(EngineError::Metadata(
                    "integrity enabled without an algorithm".into(),
                ))
            }
        };
        IntegrityService::new(spec).verify(bundle_dir)?;
        Ok(())
    }

    /// Unwrap the symmetric key named by the sidecar and decrypt every
    /// payload artifact in place.
    async fn decrypt_artifacts(&self, sidecar: &MetadataSidecar, bundle_dir: &Path) -> Result<()> {
        let key_id = sidecar.security.key_id().ok_or_else(|| {
            EngineError::Metadata("security enabled but no key identity recorded".into())
        })?;
        let wrapped_name = sidecar
            .security
            .encryption_file
            .clone()
            .unwrap_or_else(|| format!("{key_id}.enc"));
        let wrapped = fs::read(bundle_dir.join(&wrapped_name))?;

        let engine = self.key_engine(sidecar).await?;
        let symmetric = engine.unwrap_key(&key_id, &wrapped).await?;

        for name in &sidecar.backup.files {
            let Some(plain_name) = name.strip_suffix(".enc") else {
                debug!(file = %name, "payload file is not encrypted, leaving as-is");
                continue;
            };
            let path = bundle_dir.join(name);
            let ciphertext = fs::read(&path)?;
            let plaintext = backy_security::decrypt(&symmetric, &ciphertext)?;
            fs::write(bundle_dir.join(plain_name), plaintext)?;
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn decompress_archive(
        &self,
        sidecar: &MetadataSidecar,
        bundle_dir: &Path,
    ) -> Result<PathBuf> {
        let kind = sidecar.compression.compression_type.ok_or_else(|| {
            EngineError::Metadata("compression enabled without a type".into())
        })?;
        let level = sidecar.compression.level.unwrap_or_default();

        let suffix = format!(".{}", kind.extension());
        let archive = fs::read_dir(bundle_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .map(|name| name.to_string_lossy().ends_with(&suffix))
                        .unwrap_or(false)
            })
            .ok_or_else(|| {
                EngineError::Pipeline(format!("no {suffix} archive found in the bundle"))
            })?;

        Ok(compressor_for(kind, level).decompress(&archive)?)
    }

    async fn replay_files(
        &self,
        tx: &mut Transaction<'_, MySql>,
        replayer: &Replayer,
        mode: RestoreMode,
        files: &[PathBuf],
    ) -> Result<usize> {
        let eligible = &self.config.database.features;
        let mut executed = 0usize;

        for file in files {
            let file_feature = feature_of_file_name(file);
            match mode {
                RestoreMode::File => {
                    if !eligible.contains(file_feature) {
                        debug!(file = %file.display(), "feature disabled, skipping file");
                        continue;
                    }
                    for statement in StatementParser::open(file)? {
                        replayer.execute(&mut **tx, &statement?).await?;
                        executed += 1;
                    }
                }
                RestoreMode::Backy => {
                    for chunk in ChunkReader::open(file)? {
                        let (feature, payload) = chunk?;
                        if !eligible.contains(feature) {
                            debug!(%feature, "feature disabled, skipping chunk");
                            continue;
                        }
                        let sql = bytes_to_str(payload)?;
                        replayer.execute(&mut **tx, &sql).await?;
                        executed += 1;
                    }
                }
            }
        }
        Ok(executed)
    }

    async fn key_engine(&self, sidecar: &MetadataSidecar) -> Result<KeyEngine> {
        let security_type = sidecar
            .security
            .security_type
            .unwrap_or(SecurityKind::Keystore);
        let provider = sidecar.security.provider.unwrap_or(KeyProvider::Local);
        let key_size = sidecar.security.key_size.unwrap_or(4096);

        let backend = match (security_type, provider) {
            (SecurityKind::Keystore, KeyProvider::Local) => {
                let store_path = self
                    .config
                    .keystore_path
                    .clone()
                    .or_else(default_keystore_path)
                    .ok_or_else(|| {
                        EngineError::Pipeline("no keystore path available".into())
                    })?;
                KeyBackend::Store(Box::new(LocalKeyStore::new(store_path)))
            }
            (SecurityKind::Kms, KeyProvider::Aws) => {
                KeyBackend::Kms(Box::new(AwsKms::from_env().await))
            }
            (security_type, provider) => {
                return Err(EngineError::Metadata(format!(
                    "unsupported key backend combination: {security_type:?} with {provider:?}"
                )));
            }
        };
        Ok(KeyEngine::new(backend, key_size))
    }
}

/// Payload files in emission order: `tables` first, `events` last, with the
/// single-file (`full`) payload naturally alone.
fn payload_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|name| {
                        let name = name.to_string_lossy();
                        name.ends_with("_backup.sql") || name.ends_with("_backup.backy")
                    })
                    .unwrap_or(false)
        })
        .collect();
    files.sort_by_key(|path| feature_order_index(feature_of_file_name(path)));
    Ok(files)
}

/// Which feature a per-feature payload file carries; `Full` for the
/// monolithic payload.
fn feature_of_file_name(path: &Path) -> Feature {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    for feature in Feature::ORDER {
        if name.contains(&format!("_{feature}_")) {
            return feature;
        }
    }
    Feature::Full
}

fn feature_order_index(feature: Feature) -> usize {
    Feature::ORDER
        .iter()
        .position(|f| *f == feature)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backy_core::{BackupConfig, CompressionKind, CompressionLevel};
    use backy_security::KeyStore;

    use crate::metadata::BackupFacts;

    fn restore_orchestrator(keystore: &Path, object_key: &str) -> RestoreOrchestrator {
        let config = backy_core::RestoreConfig::from_json(
            &serde_json::json!({
                "database": {
                    "host": "localhost",
                    "port": 3306,
                    "user": "root",
                    "password": "secret",
                    "db_name": "shop"
                },
                "storage": { "storage_type": "local", "path": "/tmp/backups" },
                "object_key": object_key,
                "keystore_path": keystore
            })
            .to_string(),
        )
        .unwrap();
        RestoreOrchestrator::new(config).unwrap()
    }

    /// Build a compressed, encrypted, integrity-protected bundle by hand and
    /// run the inverse stages the way the restore pipeline would.
    #[tokio::test]
    async fn inverse_stages_recover_the_payload() {
        let bundle = tempfile::tempdir().unwrap();
        let keys = tempfile::tempdir().unwrap();

        // Payload: one SQL file inside the staging directory, zipped.
        let staging = bundle.path().join("backup");
        fs::create_dir_all(&staging).unwrap();
        fs::write(
            staging.join("shop_20231001_120000_backup.sql"),
            b"CREATE DATABASE IF NOT EXISTS `shop`;\n\nUSE `shop`;\n\n",
        )
        .unwrap();
        compressor_for(CompressionKind::Zip, CompressionLevel::Balanced)
            .compress(&staging)
            .unwrap();

        // Envelope: wrap a fresh key against a local keystore and encrypt
        // the archive.
        let store = LocalKeyStore::new(keys.path());
        let pem = backy_security::keygen::generate_rsa_private_key_pem(2048).unwrap();
        store
            .save("backy_secret_key_1", pem.as_bytes())
            .await
            .unwrap();
        let engine = KeyEngine::new(KeyBackend::Store(Box::new(store)), 2048);
        let (symmetric, wrapped) = engine.wrap_fresh_key("backy_secret_key_1").await.unwrap();
        fs::write(bundle.path().join("backy_secret_key_1.enc"), &wrapped).unwrap();
        let archive = bundle.path().join("backup.zip");
        let ciphertext =
            backy_security::encrypt(&symmetric, &fs::read(&archive).unwrap()).unwrap();
        fs::write(bundle.path().join("backup.zip.enc"), ciphertext).unwrap();
        fs::remove_file(&archive).unwrap();

        // Manifest, then sidecar (which the manifest never lists).
        IntegrityService::new(IntegritySpec::Sha256)
            .build(bundle.path())
            .unwrap();
        let backup_config = BackupConfig::from_json(
            &serde_json::json!({
                "database": {
                    "host": "localhost",
                    "port": 3306,
                    "user": "root",
                    "password": "secret",
                    "db_name": "shop"
                },
                "storage": { "storage_type": "local", "path": "/tmp/backups" },
                "compression": { "enabled": true, "compression_type": "zip" },
                "security": { "enabled": true, "keystore_path": keys.path() },
                "integrity": { "enabled": true, "algorithm": "sha256" }
            })
            .to_string(),
        )
        .unwrap();
        let sidecar = MetadataSidecar::build(
            &backup_config,
            &BackupFacts {
                timestamp: "20231001_120000",
                db_version: "8.0.36",
                payload_files: vec![("backup.zip.enc".into(), 0)],
                key_id: Some("backy_secret_key_1".into()),
                object_key: "shop_20231001_120000",
            },
        );
        sidecar.write(bundle.path(), "20231001_120000").unwrap();

        // Inverse stages, driven by the sidecar.
        let orchestrator = restore_orchestrator(keys.path(), "shop_20231001_120000");
        let loaded = MetadataSidecar::load_from_dir(bundle.path()).unwrap();
        orchestrator
            .verify_integrity(&loaded, bundle.path())
            .unwrap();
        orchestrator
            .decrypt_artifacts(&loaded, bundle.path())
            .await
            .unwrap();
        assert!(bundle.path().join("backup.zip").is_file());

        let payload_root = orchestrator
            .decompress_archive(&loaded, bundle.path())
            .unwrap();
        assert_eq!(payload_root, bundle.path().join("backup"));
        let restored =
            fs::read_to_string(payload_root.join("shop_20231001_120000_backup.sql")).unwrap();
        assert!(restored.starts_with("CREATE DATABASE IF NOT EXISTS `shop`;"));
    }

    #[test]
    fn feature_is_parsed_out_of_payload_file_names() {
        assert_eq!(
            feature_of_file_name(Path::new("shop_tables_20231001_120000_backup.sql")),
            Feature::Tables
        );
        assert_eq!(
            feature_of_file_name(Path::new("shop_events_20231001_120000_backup.backy")),
            Feature::Events
        );
        assert_eq!(
            feature_of_file_name(Path::new("shop_20231001_120000_backup.sql")),
            Feature::Full
        );
    }

    #[test]
    fn payload_files_come_back_in_emission_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "shop_views_20231001_120000_backup.sql",
            "shop_tables_20231001_120000_backup.sql",
            "shop_data_20231001_120000_backup.sql",
            "shop_20231001_120000_metadata.sql.json",
            "integrity.sha256",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = payload_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "shop_tables_20231001_120000_backup.sql",
                "shop_data_20231001_120000_backup.sql",
                "shop_views_20231001_120000_backup.sql",
            ]
        );
    }
}

//! The backup pipeline: extract, frame, compress, encrypt, prove, describe,
//! upload.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use backy_compression::compressor_for;
use backy_core::{
    backup_timestamp, BackupConfig, BackupType, Feature, IntegrityAlgorithm, KeyProvider,
    SecurityKind, Statement, WorkingDir,
};
use backy_db::{BoxError, Extractor, MySqlSession, StatementSink};
use backy_format::ChunkWriter;
use backy_security::{
    AwsKms, IntegritySpec, IntegrityService, KeyBackend, KeyEngine, LocalKeyStore,
};
use backy_storage::create_storage_backend;

use crate::error::{EngineError, Result};
use crate::metadata::{BackupFacts, MetadataSidecar};

/// Outcome of a completed backup.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub object_key: String,
    pub timestamp: String,
    pub files: Vec<String>,
    pub total_size: u64,
}

/// Drives the pipeline
/// `Init → WorkingDir → Extract → Compress? → Encrypt? → Integrity? →
/// Metadata → Upload → Cleanup`. The optional stages are gated on config,
/// and the working directory is removed on every exit path.
pub struct BackupOrchestrator {
    config: BackupConfig,
}

impl BackupOrchestrator {
    pub fn new(config: BackupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub async fn run(&self) -> Result<BackupReport> {
        let timestamp = backup_timestamp();
        let workdir = WorkingDir::create(&self.config.database.db_name, &timestamp)
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("working-dir"))?;

        let result = self.run_pipeline(&workdir, &timestamp).await;
        match &result {
            Ok(report) => info!(key = %report.object_key, "backup completed"),
            Err(err) => error!(error = %err, "backup failed, cleaning up"),
        }
        workdir.remove();
        result
    }

    async fn run_pipeline(&self, workdir: &WorkingDir, timestamp: &str) -> Result<BackupReport> {
        let database = &self.config.database;

        // Extract.
        let mut session = MySqlSession::connect(database)
            .await
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("connect"))?;
        let db_version = session.version().to_string();

        let payload_dir = workdir.payload_dir()?;
        let extract_result = async {
            let mut sink = PayloadSink::new(
                payload_dir.clone(),
                database.db_name.clone(),
                timestamp.to_string(),
                database.backup_type,
            );
            Extractor::new(database.db_name.as_str())
                .backup(
                    &mut session,
                    &database.features,
                    database.multiple_files,
                    &mut sink,
                )
                .await?;
            sink.finish()
        }
        .await;
        session.close().await.ok();
        let payload_files = extract_result.map_err(EngineError::at_stage("extract"))?;
        if payload_files.is_empty() {
            return Err(EngineError::at_stage("extract")(EngineError::Pipeline(
                "no backup content was produced".into(),
            )));
        }

        // Compress, or flatten the staging directory into the bundle root.
        if let Some(kind) = self.config.compression_kind() {
            compressor_for(kind, self.config.compression.level)
                .compress(&payload_dir)
                .map_err(EngineError::from)
                .map_err(EngineError::at_stage("compress"))?;
        } else {
            for name in &payload_files {
                fs::rename(payload_dir.join(name), workdir.path().join(name))?;
            }
            fs::remove_dir_all(&payload_dir)?;
        }

        // Encrypt every payload artifact under a wrapped symmetric key.
        let mut key_id = None;
        if self.config.security.enabled {
            key_id = Some(
                self.encrypt_artifacts(workdir.path())
                    .await
                    .map_err(EngineError::at_stage("encrypt"))?,
            );
        }

        // Integrity manifest over everything present so far.
        if self.config.integrity.enabled {
            let spec = integrity_spec(&self.config)?;
            IntegrityService::new(spec)
                .build(workdir.path())
                .map_err(EngineError::from)
                .map_err(EngineError::at_stage("integrity"))?;
        }

        // Metadata sidecar, written last so the manifest never lists it.
        let object_key = dir_name(workdir.path())?;
        let artifacts = payload_artifacts(workdir.path(), key_id.as_deref())?;
        let sidecar = MetadataSidecar::build(
            &self.config,
            &BackupFacts {
                timestamp,
                db_version: &db_version,
                payload_files: artifacts.clone(),
                key_id: key_id.clone(),
                object_key: &object_key,
            },
        );
        sidecar
            .write(workdir.path(), timestamp)
            .map_err(EngineError::at_stage("metadata"))?;

        // Upload.
        let storage = create_storage_backend(&self.config.storage)
            .await
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("upload"))?;
        let object_key = storage
            .upload(workdir.path())
            .await
            .map_err(EngineError::from)
            .map_err(EngineError::at_stage("upload"))?;

        Ok(BackupReport {
            object_key,
            timestamp: timestamp.to_string(),
            total_size: artifacts.iter().map(|(_, size)| size).sum(),
            files: artifacts.into_iter().map(|(name, _)| name).collect(),
        })
    }

    /// Resolve the key, write the wrapped key file, and replace every
    /// payload artifact with its ciphertext. Returns the key identity.
    async fn encrypt_artifacts(&self, bundle_dir: &Path) -> Result<String> {
        let security = &self.config.security;
        let engine = self.key_engine().await?;
        let key_id = engine.resolve(&security.key_version).await?;

        let (symmetric, wrapped) = match &security.wrapped_key_file {
            Some(path) => {
                let wrapped = fs::read(path)?;
                let symmetric = engine.unwrap_key(&key_id, &wrapped).await?;
                (symmetric, wrapped)
            }
            None => engine.wrap_fresh_key(&key_id).await?,
        };
        fs::write(bundle_dir.join(format!("{key_id}.enc")), &wrapped)?;

        for (name, _) in payload_artifacts(bundle_dir, Some(&key_id))? {
            let path = bundle_dir.join(&name);
            let plaintext = fs::read(&path)?;
            let ciphertext = backy_security::encrypt(&symmetric, &plaintext)?;
            fs::write(bundle_dir.join(format!("{name}.enc")), ciphertext)?;
            fs::remove_file(&path)?;
        }
        Ok(key_id)
    }

    async fn key_engine(&self) -> Result<KeyEngine> {
        let security = &self.config.security;
        let backend = match (security.security_type, security.provider) {
            (SecurityKind::Keystore, KeyProvider::Local) => {
                let store_path = security
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
                return Err(EngineError::Pipeline(format!(
                    "unsupported key backend combination: {security_type:?} with {provider:?}"
                )));
            }
        };
        Ok(KeyEngine::new(backend, security.key_size))
    }
}

/// Integrity spec from the backup config; validation has already checked
/// that HMAC mode carries a password.
fn integrity_spec(config: &BackupConfig) -> Result<IntegritySpec> {
    match config.integrity.algorithm {
        Some(IntegrityAlgorithm::Sha256) => Ok(IntegritySpec::Sha256),
        Some(IntegrityAlgorithm::Hmac) => {
            let password = config.integrity.password.clone().ok_or_else(|| {
                EngineError::Pipeline("HMAC integrity requires a password".into())
            })?;
            Ok(IntegritySpec::Hmac { password })
        }
        None => Err(EngineError::Pipeline(
            "integrity enabled without an algorithm".into(),
        )),
    }
}

/// Default keystore directory next to the working-directory area.
pub(crate) fn default_keystore_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("backy").join("keys"))
}

pub(crate) fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| EngineError::Pipeline(format!("unnamed bundle path {}", path.display())))
}

/// Payload artifacts in the bundle root: every regular file except the
/// wrapped key, the integrity manifests and the metadata sidecar.
pub(crate) fn payload_artifacts(
    bundle_dir: &Path,
    key_id: Option<&str>,
) -> Result<Vec<(String, u64)>> {
    let key_file = key_id.map(|id| format!("{id}.enc"));
    let mut artifacts = Vec::new();
    for entry in fs::read_dir(bundle_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if key_file.as_deref() == Some(name.as_str())
            || name == "integrity.sha256"
            || name == "integrity.hmac"
            || name.contains("_metadata.")
        {
            continue;
        }
        artifacts.push((name, entry.metadata()?.len()));
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Writes extracted statements into payload files, one file per feature tag
/// in the order the extractor emits them.
struct PayloadSink {
    dir: PathBuf,
    db_name: String,
    timestamp: String,
    backup_type: BackupType,
    current: Option<(Feature, PayloadWriter)>,
    file_names: Vec<String>,
}

enum PayloadWriter {
    Sql(File),
    Backy(ChunkWriter),
}

impl PayloadSink {
    fn new(dir: PathBuf, db_name: String, timestamp: String, backup_type: BackupType) -> Self {
        Self {
            dir,
            db_name,
            timestamp,
            backup_type,
            current: None,
            file_names: Vec::new(),
        }
    }

    fn file_name(&self, feature: Feature) -> String {
        let ext = match self.backup_type {
            BackupType::Sql => "sql",
            BackupType::Backy => "backy",
        };
        match feature {
            Feature::Full => format!("{}_{}_backup.{ext}", self.db_name, self.timestamp),
            feature => format!(
                "{}_{feature}_{}_backup.{ext}",
                self.db_name, self.timestamp
            ),
        }
    }

    fn roll_to(&mut self, feature: Feature) -> std::result::Result<(), BoxError> {
        if matches!(&self.current, Some((open, _)) if *open == feature) {
            return Ok(());
        }
        self.close_current()?;
        let name = self.file_name(feature);
        let path = self.dir.join(&name);
        let writer = match self.backup_type {
            BackupType::Sql => PayloadWriter::Sql(File::create(&path).map_err(box_err)?),
            BackupType::Backy => PayloadWriter::Backy(ChunkWriter::create(&path).map_err(box_err)?),
        };
        self.file_names.push(name);
        self.current = Some((feature, writer));
        Ok(())
    }

    fn close_current(&mut self) -> std::result::Result<(), BoxError> {
        if let Some((_, writer)) = self.current.take() {
            match writer {
                PayloadWriter::Sql(mut file) => {
                    file.flush().map_err(box_err)?;
                    file.sync_all().map_err(box_err)?;
                }
                PayloadWriter::Backy(writer) => writer.finish().map_err(box_err)?,
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<String>> {
        self.close_current()
            .map_err(|err| EngineError::Pipeline(err.to_string()))?;
        Ok(self.file_names)
    }
}

impl StatementSink for PayloadSink {
    fn write(&mut self, statement: Statement) -> std::result::Result<(), BoxError> {
        self.roll_to(statement.feature)?;
        let (_, writer) = self.current.as_mut().expect("writer was just opened");
        match writer {
            PayloadWriter::Sql(file) => {
                file.write_all(statement.sql.as_bytes()).map_err(box_err)?;
                file.write_all(b"\n\n").map_err(box_err)?;
            }
            PayloadWriter::Backy(writer) => {
                writer
                    .write(statement.feature, statement.sql.as_bytes())
                    .map_err(box_err)?;
            }
        }
        Ok(())
    }
}

fn box_err<E: std::error::Error + Send + Sync + 'static>(err: E) -> BoxError {
    Box::new(err)
}

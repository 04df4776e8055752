use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

use backy_core::{BackupConfig, KeyProvider, SecurityKind};
use backy_security::{AwsKms, KeyBackend, KeyEngine, LocalKeyStore};

#[derive(Args)]
pub struct RotateArgs {
    /// Path to the JSON backup configuration naming the key backend
    #[arg(short, long, env = "BACKY_CONFIG")]
    config: PathBuf,
}

pub async fn execute(args: RotateArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let config = BackupConfig::from_json(&text).context("invalid backup configuration")?;
    let security = &config.security;

    let backend = match (security.security_type, security.provider) {
        (SecurityKind::Keystore, KeyProvider::Local) => {
            let store_path = security
                .keystore_path
                .clone()
                .context("keystore_path is required to rotate a local key")?;
            KeyBackend::Store(Box::new(LocalKeyStore::new(store_path)))
        }
        (SecurityKind::Kms, KeyProvider::Aws) => {
            KeyBackend::Kms(Box::new(AwsKms::from_env().await))
        }
        (security_type, provider) => anyhow::bail!(
            "unsupported key backend combination: {security_type:?} with {provider:?}"
        ),
    };

    let engine = KeyEngine::new(backend, security.key_size);
    let key_id = engine.rotate().await?;
    println!("Created key version {key_id}");
    Ok(())
}

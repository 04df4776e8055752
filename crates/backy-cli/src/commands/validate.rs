use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

use backy_core::BackupConfig;
use backy_storage::{create_storage_backend, StorageBackend};

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the JSON backup configuration
    #[arg(short, long, env = "BACKY_CONFIG")]
    config: PathBuf,
}

pub async fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let config = BackupConfig::from_json(&text).context("invalid backup configuration")?;
    println!("Configuration: ok");

    let storage = create_storage_backend(&config.storage).await?;
    storage
        .validate_credentials()
        .await
        .context("storage credentials rejected")?;
    println!("Storage credentials: ok");

    Ok(())
}

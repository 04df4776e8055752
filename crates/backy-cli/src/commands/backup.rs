use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

use backy_core::BackupConfig;
use backy_engine::BackupOrchestrator;

#[derive(Args)]
pub struct BackupArgs {
    /// Path to the JSON backup configuration
    #[arg(short, long, env = "BACKY_CONFIG")]
    config: PathBuf,
}

pub async fn execute(args: BackupArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let config = BackupConfig::from_json(&text).context("invalid backup configuration")?;

    let report = BackupOrchestrator::new(config)?.run().await?;

    println!("Backup uploaded as {}", report.object_key);
    println!(
        "  {} file(s), {} bytes, created {}",
        report.files.len(),
        report.total_size,
        report.timestamp
    );
    for file in &report.files {
        println!("  - {file}");
    }
    Ok(())
}

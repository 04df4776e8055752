use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

use backy_core::RestoreConfig;
use backy_engine::RestoreOrchestrator;

#[derive(Args)]
pub struct RestoreArgs {
    /// Path to the JSON restore configuration
    #[arg(short, long, env = "BACKY_CONFIG")]
    config: PathBuf,
}

pub async fn execute(args: RestoreArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let config = RestoreConfig::from_json(&text).context("invalid restore configuration")?;

    let report = RestoreOrchestrator::new(config)?.run().await?;

    println!(
        "Restored {} with {} statement(s) executed",
        report.object_key, report.statements_executed
    );
    Ok(())
}

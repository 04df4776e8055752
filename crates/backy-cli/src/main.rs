use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "backy")]
#[command(version, about = "Modular database backup and restore engine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backup bundle and upload it to storage
    Backup(commands::backup::BackupArgs),

    /// Download a bundle and replay it against a database
    Restore(commands::restore::RestoreArgs),

    /// Check a configuration and the credentials it points at
    Validate(commands::validate::ValidateArgs),

    /// Create the next asymmetric key version
    RotateKey(commands::rotate::RotateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("backy={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Backup(args) => commands::backup::execute(args).await,
        Commands::Restore(args) => commands::restore::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args).await,
        Commands::RotateKey(args) => commands::rotate::execute(args).await,
    }
}

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use feedrelay_core::scan::RunOptions;
use feedrelay_core::AppConfig;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "feedrelay")]
#[command(author, version, about = "Relay new feed entries to Bluesky")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (defaults to ~/.config/feedrelay/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log posts instead of publishing them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every feed once and publish new entries (default)
    Run {
        /// Prune the posted-entry ledger afterwards
        #[arg(long)]
        prune: bool,
    },
    /// Prune posted-entry records older than the retention window
    Prune,
    /// Show checkpoints, ledger size and sentinel state
    Status,
    /// Clear the stop sentinel left by a halted run
    Resume,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) if !path.exists() => bail!("Config file {} does not exist", path.display()),
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if cli.dry_run {
        config.publisher.dry_run = true;
    }

    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    logging::init(&config)?;

    match cli.command {
        Some(Commands::Run { prune }) => commands::run::run(config, RunOptions { prune }).await,
        None => commands::run::run(config, RunOptions::default()).await,
        Some(Commands::Prune) => commands::prune::run(&config).await,
        Some(Commands::Status) => commands::status::run(&config).await,
        Some(Commands::Resume) => commands::resume::run(&config),
    }
}

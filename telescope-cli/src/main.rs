//! Telescope CLI - inspect and manage the image cache from the command line.

mod commands;
mod error;

use std::path::PathBuf;

use clap::Parser;
use telescope::config::{config_file_path, CacheConfig, ConfigFile};
use telescope::logging::{default_log_dir, default_log_file, init_logging};
use telescope::shared;
use tracing::debug;

use commands::Command;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "telescope")]
#[command(version = telescope::VERSION)]
#[command(about = "Two-tier cache for remotely fetched images", long_about = None)]
struct Cli {
    /// Cache directory (overrides the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Config file path (default: <config dir>/telescope/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn load_config(&self) -> Result<CacheConfig, CliError> {
        let path = self.config.clone().unwrap_or_else(config_file_path);
        let mut config = ConfigFile::load_from(&path)?;
        if let Some(dir) = &self.cache_dir {
            config = config.with_root_dir(dir.clone());
        }
        debug!(config_file = %path.display(), dir = %config.root_dir.display(), "Configuration loaded");
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let level = if cli.verbose { "debug" } else { "warn" };
    let _logging_guard = init_logging(&default_log_dir(), default_log_file(), level)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let config = cli.load_config()?;
    let cache = shared::init(config).await.map_err(CliError::CacheOpen)?;

    let result = commands::execute(cache, cli.command).await;
    // Flush the index even when the command failed
    let flushed = shared::shutdown().await.map_err(CliError::Cache);
    result.and(flushed)
}

pub mod cli;
pub mod core;
pub mod providers;
pub mod sinks;

use crate::cli::snapshot::SnapshotOptions;
use crate::core::config::AppConfig;
use anyhow::Result;
use tracing::{debug, info};

/// Commands that need a loaded configuration.
#[derive(Debug, Clone)]
pub enum AppCommand {
    Snapshot(SnapshotOptions),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("emasnap starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Snapshot(options) => cli::snapshot::run(&config, options).await,
    }
}

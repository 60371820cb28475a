use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use emasnap::cli::snapshot::SnapshotOptions;
use emasnap::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Build the weekly EMA200 snapshot and export it
    Snapshot {
        /// Number of top coins to consider (overrides `coin_limit`)
        #[arg(short, long)]
        limit: Option<usize>,

        /// CSV file to write (overrides `sinks.csv.path`)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => emasnap::cli::setup::setup(),
        Some(Commands::Snapshot { limit, output }) => {
            let command = emasnap::AppCommand::Snapshot(SnapshotOptions { limit, output });
            emasnap::run_command(command, cli.config_path.as_deref()).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

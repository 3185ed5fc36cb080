//! sipsync CLI - log drinks from the terminal and sync them when online.

mod cli;
mod commands;
mod config_file;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, resolve_config_path, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::discard::run_discard;
use crate::commands::failed::run_failed;
use crate::commands::log::run_log;
use crate::commands::retry::run_retry;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sipsync=info,sipsync_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config)?;

    match cli.command {
        Commands::Config(command) => run_config(command, &config_path)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
        command => {
            let config = load_config(&config_path)?;
            let db_path = resolve_db_path(cli.db_path)?;
            match command {
                Commands::Log(command) => run_log(command, &config, &db_path).await?,
                Commands::Status { json } => run_status(json, &db_path).await?,
                Commands::Failed { kind, json } => {
                    run_failed(kind.map(Into::into), json, &db_path).await?;
                }
                Commands::Sync { json } => run_sync(json, &config, &db_path).await?,
                Commands::Retry { id } => run_retry(&id, &db_path).await?,
                Commands::Discard { id } => run_discard(&id, &db_path).await?,
                Commands::Watch => run_watch(&config, &db_path).await?,
                Commands::Config(_) | Commands::Completions { .. } => {}
            }
        }
    }

    Ok(())
}

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod db;
mod importer;
mod slack;
mod utils;

use cli::{Cli, Commands};
use config::Config;
use db::{DatabaseManager, HookRegistry, LoggingHooks};
use importer::Importer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    utils::logging::init_tracing(&config.logging);

    if matches!(cli.command, Commands::ValidateConfig) {
        info!(path = %cli.config.display(), "configuration is valid");
        println!("configuration is valid");
        return Ok(());
    }

    let hooks = Arc::new(HookRegistry::new(Arc::new(LoggingHooks)));
    let db = DatabaseManager::new(&config.database, hooks).await?;
    db.migrate().await?;
    info!(database = %config.database.sqlite_path(), "chat store ready");

    let importer = Importer::new(db, config.import.clone());
    match cli::execute(cli.command, &importer).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!("command failed: {:#}", e);
            Err(e)
        }
    }
}

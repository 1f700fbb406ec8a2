mod api;
mod cache;
mod classifier;
#[cfg(feature = "cli")]
mod cli;
mod config;
mod export;
mod fetcher;
mod logging;
mod models;
mod parser;
mod store;
mod sync;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::{Context, Result};
use config::Config;
use std::path::PathBuf;
use store::Store;
use tracing::info;
use ui::App;

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(feature = "cli")]
    let command = {
        use clap::Parser;
        cli::Cli::parse().command
    };

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    let _log_guard = logging::init(&config)?;
    info!(api = %config.api_base, db = %config.db_path.display(), "Starting");

    let client = api::ClassroomClient::new(config.api_base.clone(), config.access_token.clone())?;
    let store = Store::open(&config.db_path)
        .context(format!("Failed to open database {}", config.db_path.display()))?;

    #[cfg(feature = "cli")]
    {
        if let Some(command) = command {
            return cli::run(command, &client, &store, config.fetch).await;
        }
    }

    // Start TUI application
    let mut app = App::new(client, store, config.fetch, PathBuf::from("."));
    app.run().await?;

    Ok(())
}

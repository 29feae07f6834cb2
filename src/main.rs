mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use siphon_core::AppConfig;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    // Environment overrides (deployment knobs without editing the file).
    if let Ok(v) = std::env::var("DATABASE_URL") {
        if !v.is_empty() {
            config.database.postgres_url = Some(v);
        }
    }
    if let Ok(v) = std::env::var("SIPHON_TENANT") {
        if !v.is_empty() {
            config.general.tenant_id = Some(v);
        }
    }
    if let Ok(v) = std::env::var("BROWSER_WS_ENDPOINT") {
        if !v.is_empty() {
            config.browser.remote_endpoint = Some(v);
        }
    }
    if let Ok(v) = std::env::var("SIPHON_DATA_DIR") {
        if !v.is_empty() {
            config.general.data_dir = v;
        }
    }

    match cli.command {
        Commands::Extract {
            url,
            force_strategy,
            skip,
            no_browser,
            min_content_length,
            max_latency_ms,
            json,
        } => {
            commands::extract::run(
                config,
                url,
                force_strategy,
                skip,
                no_browser,
                min_content_length,
                max_latency_ms,
                json,
            )
            .await?;
        }
        Commands::Preview { url } => {
            commands::preview::run(config, url).await?;
        }
        Commands::Patterns { action } => {
            commands::patterns::run(config, action).await?;
        }
        Commands::Traces { domain, failures, limit } => {
            commands::traces::run(config, domain, failures, limit).await?;
        }
        Commands::Status => {
            commands::status::run(config).await?;
        }
    }

    Ok(())
}

mod bot;
mod config;
mod llm;
mod platform;
mod webhook;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Before logging init so RUST_LOG from .env applies
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tutorbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if dotenv.is_err() {
        warn!(".env not found, using process environment");
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.llm.model);
    info!("  Provider: {}", config.llm.base_url);
    info!("  Webhook: {}", config.telegram.webhook_url);
    info!("  Listen address: {}", config.telegram.listen_addr);
    if config.llm.api_key.is_none() {
        warn!("GROQ_API_KEY is not set; every message will get the fallback reply");
    }

    info!("Bot is starting...");
    bot::run(config).await?;

    Ok(())
}

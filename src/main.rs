mod bot;
mod card;
mod config;
mod dispatcher;
mod platform;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Bot;
use crate::card::CardClient;
use crate::config::{Config, ConfigError};
use crate::dispatcher::Dispatcher;
use crate::platform::discord::DiscordPlatform;

/// Exit code for any startup failure that is not a config problem
const BOT_START_FAILURE: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,arkham_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<ConfigError>()
                .map(ConfigError::exit_code)
                .unwrap_or(BOT_START_FAILURE);
            ExitCode::from(code)
        }
    }
}

async fn run() -> Result<()> {
    info!("Initializing the Arkham Horror LCG bot...");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)?;
    let card_api_url = config.card_api_url()?;

    info!("Configuration loaded successfully");
    info!("  Card API: {}", card_api_url);

    let cards = Arc::new(CardClient::new(card_api_url));
    let dispatcher = Arc::new(Dispatcher::new(cards));

    info!("Starting the bot...");
    let bot = Bot::instance();
    let completion = bot
        .run(&DiscordPlatform::new(), &config.token, dispatcher)
        .await
        .context("Failed to start the bot")?;

    if completion.await.is_err() {
        warn!("Bot stopped without confirming the session closed");
    }

    info!("Shutting down the bot...");
    Ok(())
}

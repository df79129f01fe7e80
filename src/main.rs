mod classifier;
mod config;
mod dispatch;
mod notification;
mod origin;
mod platform;
mod price;
mod reconciler;
mod relay;
mod scheduler;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::platform::telegram::TelegramTransport;
use crate::price::PriceOracle;
use crate::relay::Relay;
use crate::scheduler::Scheduler;
use crate::store::SubscriberStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,signal_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; any missing value stops us before handlers exist
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Source chats: {:?}", config.telegram.source_chats);
    info!(
        "  Classifier: {} ({} mode, keywords {:?})",
        config.classifier.instrument, config.classifier.mode, config.classifier.keywords
    );
    info!("  Database: {}", config.storage.database_path.display());

    let store = SubscriberStore::open(&config.storage.database_path)?;
    for id in &config.telegram.initial_subscribers {
        store.add(*id).await?;
    }
    info!("  Subscribers: {}", store.count().await?);

    let bot = Bot::new(&config.telegram.bot_token);
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let prices = Arc::new(PriceOracle::new(&config.price)?);
    let relay = Arc::new(Relay::new(
        &config,
        store,
        transport.clone(),
        transport,
        prices,
    )?);

    let scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(
        &scheduler,
        relay.reconciler(),
        config.reconciler.retention_hours,
    )
    .await?;
    scheduler.start().await?;

    info!("Relay is starting...");
    platform::telegram::run(relay, bot).await?;

    Ok(())
}

mod command;
mod commands;
mod config;
mod lanes;
mod message;
mod platform;
mod router;
mod service;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::lanes::LaneExecutor;
use crate::platform::telegram::{TelegramReceiver, TelegramSender};
use crate::platform::{InboundSink, PlatformReceiver, SenderMuxBuilder, StartupError};
use crate::router::Router;
use crate::service::{RepeatService, ServiceManager};
use crate::state::builtin::{LanguagePref, StatusPref};
use crate::state::{StateRegistry, StateService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Prefix: {}", config.prefix);
    info!("  Lanes: {}", config.lanes.count);
    info!("  State backend: {:?}", config.state.backend);

    if !config.any_platform_enabled() {
        return Err(StartupError::NoPlatformEnabled.into());
    }

    // State
    let store = state::open_store(&config.state)?;
    let states = Arc::new(StateService::new(Arc::clone(&store)));
    let mut registry = StateRegistry::new();
    registry.register(Arc::new(LanguagePref::new(config.language)));
    registry.register(Arc::new(StatusPref));
    let registry = Arc::new(registry);

    // Services
    let mut services = ServiceManager::new(store, config.services.disabled.clone());
    services.register(Arc::new(RepeatService::new()));
    let services = Arc::new(services);

    // Commands
    let commands = commands::builtin(&config, states, registry, Arc::clone(&services));
    let dispatcher = Arc::new(command::build_dispatcher(&commands));

    // Platforms
    let (sink, inbound) = InboundSink::channel(config.lanes.inbound_capacity);
    let mut receivers: Vec<Box<dyn PlatformReceiver>> = Vec::new();
    let mut senders = SenderMuxBuilder::new();

    if config.telegram.enabled {
        let bot = teloxide::Bot::new(&config.telegram.bot_token);
        senders = senders.register(Arc::new(TelegramSender::new(
            bot.clone(),
            tokio::runtime::Handle::current(),
        )));
        receivers.push(Box::new(TelegramReceiver::new(bot)));
    }

    let lanes = LaneExecutor::new(config.lanes.count)?;
    let router = Arc::new(
        Router::new(
            config.prefix.clone(),
            dispatcher,
            lanes,
            Arc::new(senders.build()),
        )
        .with_services(services),
    );

    let (stop_pump, pump_stopped) = oneshot::channel();
    let pump = tokio::spawn(platform::pump(inbound, Arc::clone(&router), pump_stopped));

    for receiver in receivers.iter_mut() {
        receiver.bind(sink.clone());
        receiver
            .start()
            .await
            .with_context(|| format!("Failed to start {} receiver", receiver.platform()))?;
    }
    drop(sink);

    info!("Bot is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down...");
    for receiver in receivers.iter_mut() {
        receiver.stop().await;
    }
    let _ = stop_pump.send(());
    if let Err(e) = pump.await {
        error!("Inbound pump failed: {}", e);
    }
    tokio::task::spawn_blocking(move || router.shutdown())
        .await
        .context("Failed to drain lanes")?;

    info!("Shutdown complete");
    Ok(())
}

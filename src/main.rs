mod admission;
mod api;
mod bot;
mod broadcast;
mod command;
mod config;
mod delivery;
mod health;
mod platform;
mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admission::AdmissionMode;
use crate::bot::AppState;
use crate::config::Config;
use crate::platform::whatsapp::WhatsAppBridge;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging: console plus daily files in the log directory
    std::fs::create_dir_all(&config.logging.directory).with_context(|| {
        format!(
            "Failed to create log directory: {}",
            config.logging.directory.display()
        )
    })?;
    let file_appender = tracing_appender::rolling::daily(&config.logging.directory, "relaybot.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    if let Err(e) = dotenv {
        info!(".env not loaded ({}), using process environment", e);
    }
    info!("Configuration loaded from: {}", config_path.display());
    info!("  Bot name: {}", config.bot.name);
    let mode = config.admission_mode();
    let allow_list = config.admin_allow_list();
    info!("  Response mode: {}", mode);
    info!("  Admin numbers: {}", allow_list.len());
    info!("  Broadcast recipients: {}", config.broadcast_recipients().len());
    info!("  WhatsApp bridge: {}", config.whatsapp.bridge_url);
    if mode == AdmissionMode::AdminOnly && allow_list.is_empty() {
        warn!("admin_only mode without ADMIN_NUMBERS: every message will be ignored");
    }
    if config.api.base_url.is_empty() {
        warn!("EXTERNAL_API_URL is not set; API-backed commands will answer with fallbacks");
    }

    // Health endpoint runs for the lifetime of the process
    let health_listener = health::bind(config.server.port).await?;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_listener).await {
            error!("Health server stopped: {:#}", e);
        }
    });

    info!("Initializing WhatsApp Web client...");
    let (bridge, events) =
        WhatsAppBridge::connect(&config.whatsapp.bridge_url, config.whatsapp.connect_attempts)
            .await?;

    let state = Arc::new(AppState::new(&config, mode, allow_list, bridge)?);

    info!("Bot is starting...");
    bot::run(state, events).await?;

    anyhow::bail!("WhatsApp bridge connection closed")
}

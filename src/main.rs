mod auth;
mod config;
mod error;
mod handlers;
mod health;
mod memory;
mod platform;
mod router;
mod scheduler;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::payment::PaymentFlow;
use crate::auth::AuthGate;
use crate::config::Config;
use crate::handlers::HandlerSet;
use crate::health::HealthProbe;
use crate::memory::SessionStore;
use crate::router::RoutingTable;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinegram=debug".into()),
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
    info!("  Payments enabled: {}", config.payments.enabled);
    info!("  Password auth: {}", config.password().is_some());
    info!(
        "  Session store: {}",
        config.sessions.database_path.display()
    );

    let sessions = SessionStore::open(&config.sessions.database_path)?;
    let payments = Arc::new(PaymentFlow::new(config.payments.clone(), sessions.clone()));
    let gate = Arc::new(AuthGate::new(
        sessions.clone(),
        Arc::clone(&payments),
        config.password().map(str::to_string),
    ));
    let router = Arc::new(RoutingTable::standard(
        gate,
        payments,
        HandlerSet::builtin()?,
    )?);
    info!("  Routes: {}", router.entries().count());

    let mut scheduler = Scheduler::new(sessions, &config.sessions).await?;
    scheduler.start().await?;

    // Advisory only; bounded by the probe timeout.
    match HealthProbe::new(&config.health.url, config.health.timeout()) {
        Ok(probe) => {
            probe.check_online().await;
        }
        Err(e) => warn!("Health probe unavailable: {:#}", e),
    }

    info!("Bot is starting...");
    let bot = teloxide::Bot::new(&config.telegram.bot_token);
    platform::telegram::run(bot, router).await?;

    scheduler.shutdown().await?;
    Ok(())
}

//! FlipExchange Service Binary
//!
//! Wires the oracle, gateway, ledger, and conversation engine together.
//! The chat transport connects to [`ExchangeEngine::handle`]; this binary
//! keeps the process alive and periodically logs ledger aggregates.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flipex_engine::{EngineConfig, ExchangeEngine};
use flipex_gateway::{CryptoPayClient, PaymentGateway};
use flipex_ledger::ExchangeStore;
use flipex_rates::{RateOracle, RateProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting FlipExchange");

    // Load configuration
    let config = EngineConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    // The payment API doubles as the live rate source.
    let client = Arc::new(CryptoPayClient::new(
        config.gateway.api_url.clone(),
        config.gateway.token.clone(),
    )?);
    let provider: Arc<dyn RateProvider> = client.clone();
    let gateway: Arc<dyn PaymentGateway> = client;

    let oracle = Arc::new(RateOracle::new(provider, config.oracle_config()));
    let store = ExchangeStore::connect(&config.database_url).await?;

    let engine = Arc::new(ExchangeEngine::new(config, oracle, gateway, store));

    info!("FlipExchange running");

    // Keep running until shutdown, logging ledger aggregates for the
    // observational health surface.
    let mut stats_interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = stats_interval.tick() => {
                match engine.stats().await {
                    Ok(stats) => info!(
                        users = stats.users,
                        total = stats.total,
                        completed = stats.completed,
                        pending = stats.pending,
                        "Ledger aggregates"
                    ),
                    Err(e) => error!(error = %e, "Failed to read ledger aggregates"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("FlipExchange shutdown complete");
    Ok(())
}

//! # Palaver Server
//!
//! Real-time group-chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! palaver
//!
//! # Run with environment variables
//! PALAVER_PORT=8080 PALAVER_HOST=0.0.0.0 palaver
//! ```
//!
//! Configuration is also read from `palaver.toml` when present.

mod config;
mod handlers;
mod metrics;
mod token;

use anyhow::Result;
use palaver_core::ChatCore;
use palaver_store::MemoryStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palaver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Palaver server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Assemble the realtime core around the in-process store
    let store = Arc::new(MemoryStore::new());
    let verifier = Arc::new(token::BearerTokenVerifier::new());
    let core = Arc::new(ChatCore::with_history_limit(
        store,
        verifier,
        config.limits.history_limit,
    ));

    // Start the server
    handlers::run_server(core, config).await?;

    Ok(())
}

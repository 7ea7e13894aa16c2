//! Webhook Gateway - Main Application Entry Point
//!
//! A trust gateway between external alert senders (charting tools, signal
//! services) and an order execution engine. Every inbound webhook is
//! authenticated with an HMAC signature, checked for freshness, rate limited,
//! checked against the credential's risk policy, and recorded in an audit log
//! before an order is handed off.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Storage**: PostgreSQL with sqlx, or an in-memory store for development
//! - **Webhook Authentication**: HMAC-SHA256 over a canonical message
//! - **Secrets at Rest**: AES-256-GCM under a master key
//! - **Dashboard Authentication**: account key with SHA-256 hashing
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Build the credential vault from the master key
//! 3. Open storage (and run migrations when PostgreSQL is configured)
//! 4. Build the rate limiter, executor and gateway
//! 5. Spawn the expired-window sweeper
//! 6. Start the HTTP server on the configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod security;
mod services;
mod state;
mod store;

use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::Config;
use crate::models::account_key::AccountKey;
use crate::security::vault::{CredentialVault, MasterKey, lookup_hash};
use crate::services::executor::{HttpOrderExecutor, OrderExecutor, PaperExecutor};
use crate::services::gateway::WebhookGateway;
use crate::services::rate_limiter::RateLimiter;
use crate::state::AppState;
use crate::store::{WebhookStore, memory::MemoryStore, postgres::PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let master_key = MasterKey::from_base64(&config.master_key)?;
    let vault = Arc::new(CredentialVault::new(&master_key)?);
    drop(master_key);

    let store = open_store(&config).await?;

    let limiter = Arc::new(RateLimiter::new(store.clone(), config.rate_limits()));

    let executor: Arc<dyn OrderExecutor> = match &config.executor_url {
        Some(url) => {
            tracing::info!(url = %url, "Forwarding orders to execution engine");
            Arc::new(HttpOrderExecutor::new(
                url.clone(),
                std::time::Duration::from_secs(config.executor_timeout_secs),
            )?)
        }
        None => {
            tracing::warn!("EXECUTOR_URL not set, orders will be paper-filled");
            Arc::new(PaperExecutor)
        }
    };

    let gateway = Arc::new(WebhookGateway::new(
        store.clone(),
        vault.clone(),
        limiter.clone(),
        executor,
        config.replay_window(),
    ));

    spawn_window_sweeper(limiter.clone(), config.window_sweep_interval_secs);

    let app = routes::build_router(AppState {
        store,
        vault,
        limiter,
        gateway,
    });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// PostgreSQL when `DATABASE_URL` is set, the in-memory store otherwise.
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn WebhookStore>> {
    if let Some(database_url) = &config.database_url {
        let pool = db::create_pool(database_url).await?;
        tracing::info!("Database pool created");

        db::run_migrations(&pool).await?;
        tracing::info!("Database migrations complete");

        return Ok(Arc::new(PgStore::new(pool)));
    }

    tracing::warn!("DATABASE_URL not set, using in-memory storage (data is lost on restart)");
    let store = MemoryStore::new();

    if let Some(key) = &config.dev_account_key {
        let account_id = config.dev_account_id.unwrap_or_else(Uuid::new_v4);
        store.insert_account_key(AccountKey {
            id: Uuid::new_v4(),
            account_id,
            key_hash: lookup_hash(key),
            label: "development".to_string(),
            created_at: Utc::now(),
            is_active: true,
        });
        tracing::info!(account_id = %account_id, "Development account key registered");
    }

    Ok(Arc::new(store))
}

fn spawn_window_sweeper(limiter: Arc<RateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            match limiter.sweep(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Expired rate windows purged"),
                Err(e) => tracing::error!("Rate window sweep failed: {}", e),
            }
        }
    });
}

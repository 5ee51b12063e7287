//! Media Convert Gateway - Main Application Entry Point
//!
//! A REST API that converts uploaded media files with an external transcoder,
//! fronted by API-key authentication and a per-key daily request quota.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: SQLite with sqlx (async queries)
//! - **Authentication**: API key with SHA-256 hashing
//! - **Quota**: per-key, per-day counters updated by one atomic conditional upsert
//! - **Retention**: background task purging usage rows older than the retention window
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Provision the bootstrap admin key, if configured
//! 4. Spawn the retention sweeper
//! 5. Serve HTTP until Ctrl-C, then stop the sweeper and close the pool

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::models::api_key::{NewApiKey, Permissions};
use crate::services::credential_store::hash_api_key;
use crate::services::retention::RetentionSweeper;
use crate::services::usage_ledger::UsageLedger;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = AppState::new(pool.clone(), &config);
    state.converter.ensure_dirs().await?;

    if let Some(raw_key) = config.bootstrap_admin_key.as_deref() {
        let added = state
            .credentials
            .insert_if_absent(&NewApiKey {
                hashed_key: hash_api_key(raw_key),
                user_id: None,
                permissions: [Permissions::CONVERT, Permissions::ADMIN].into_iter().collect(),
                rate_limit: None,
            })
            .await?;
        tracing::info!(added, "Bootstrap admin key checked");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = RetentionSweeper::new(
        UsageLedger::new(pool.clone()),
        config.usage_retention_days,
        config.sweep_time(),
    )
    .spawn(shutdown_rx);
    tracing::info!(
        retention_days = config.usage_retention_days,
        run_at = %config.sweep_time(),
        "Usage retention sweeper started"
    );

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    // Receiver may already be gone if the sweeper task ended early.
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "Retention sweeper task failed");
    }
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

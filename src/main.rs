mod chat;
mod config;
mod crypto;
mod entities;
mod gate;
mod http;
mod queue;
mod rpc;
mod session;
mod signature;
mod state;
mod store;

use std::sync::Arc;
use std::time::Duration;

use crate::chat::CompletionClient;
use crate::config::ApiConfig;
use crate::queue::QueueClient;
use crate::rpc::EvmRpcClient;
use crate::state::{ApiCache, AppState, Signers};
use anyhow::{Context, Result};
use axum::Router;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ApiConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let primary_rpc = EvmRpcClient::new(&config.chains.primary)
        .context("Failed to initialize primary-chain RPC client")?;
    let legacy_rpc = EvmRpcClient::new(&config.chains.legacy)
        .context("Failed to initialize legacy-chain RPC client")?;

    let queue = QueueClient::new(config.queue.clone())
        .context("Failed to initialize queue client")?;
    let completions = CompletionClient::new(
        &config.chat.completion_url,
        &config.chat.api_key,
        &config.chat.model,
        config.chat.max_tokens,
    )
    .context("Failed to initialize completion client")?;
    let signers =
        Arc::new(Signers::from_config(&config).context("Failed to load signing keys")?);

    let cache = Arc::new(ApiCache::new(&config.cache));
    let app_state = AppState::new(
        database,
        cache,
        primary_rpc,
        legacy_rpc,
        queue,
        completions,
        signers,
        Arc::new(config.clone()),
    );

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Sigil migration API listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error")?;

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn connect_database(config: &ApiConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    assert!(
        config.database.max_connections >= config.database.min_connections.unwrap_or(1),
        "Max connections must be >= min connections"
    );
    assert!(
        config.database.max_connections <= 128,
        "Connection pool oversized"
    );

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}

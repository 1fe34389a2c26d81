// src/main.rs - Tasks API with one-time CSRF tokens
mod config;
mod csrf;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod storage;
mod utils;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Environment};
use crate::csrf::{Clock, CsrfProtection, SqliteTokenStore, SystemClock, TokenStore};
use crate::db::Database;
use crate::middleware::rate_limit::RateLimiter;
use crate::routes::create_router;
use crate::services::pokemon::PokeApiClient;
use crate::services::token_sweeper::TokenSweeper;
use crate::storage::tasks::TaskStore;

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub csrf_protection: Arc<CsrfProtection>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tasks: TaskStore,
    pub pokemon: PokeApiClient,
}

impl AppState {
    /// Wire the shared components around one database and clock.
    pub fn build(config: Config, db: Database, clock: Arc<dyn Clock>) -> Result<Self, reqwest::Error> {
        let store: Arc<dyn TokenStore> = Arc::new(SqliteTokenStore::new(db.pool().clone()));
        let csrf_protection = Arc::new(CsrfProtection::new(store, clock, &config.csrf));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max,
            config.rate_limit_window,
        ));
        let pokemon = PokeApiClient::new(&config.poke_api_base)?;

        Ok(Self {
            config,
            db,
            csrf_protection,
            rate_limiter,
            tasks: TaskStore::new(),
            pokemon,
        })
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    if config.environment == Environment::Production {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    tracing::info!(
        environment = %config.environment,
        api_prefix = %config.api_prefix(),
        "Starting server"
    );
    tracing::debug!(csrf = ?config.csrf, "CSRF settings");

    if config.ephemeral_secret {
        tracing::warn!("CSRF_SECRET is not set; using a random secret, tokens will not survive a restart");
    }

    tracing::info!(database_url = %config.database_url, "Connecting to database");
    let db = Database::new(&config.database_url)
        .await
        .context("failed to open token database")?;
    db.migrate().await.context("failed to run migrations")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let addr = config.server_addr()?;
    let state = Arc::new(AppState::build(config, db, clock.clone())?);

    // Background tasks
    let sweeper = TokenSweeper::new(
        state.csrf_protection.store(),
        clock,
        state.config.csrf.token_expiry,
        state.config.csrf.sweep_interval,
    );
    tokio::spawn(sweeper.start());
    tokio::spawn(state.rate_limiter.clone().start_cleanup());

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

//! Anomaly gateway -- validates detected anomaly events, runs them through an
//! analysis engine and returns (and records) a structured root-cause analysis.

pub mod api;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod storage;
pub mod validate;

use anyhow::{Context, Result};
use config::{GatewayConfig, LogFormat, LoggingConfig};
use engine::RulesEngine;
use orchestrator::Orchestrator;
use std::sync::Arc;
use storage::SqliteStore;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second install (tests, embedding) is not an error.
    let _ = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Wire the SQLite store, the rules engine and the orchestrator into router state.
pub fn build_state(config: GatewayConfig) -> Result<api::state::AppState> {
    tracing::info!(db_path = %config.storage.db_path, "Initializing database");
    let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);

    let engine = RulesEngine::new(config.engine.model_name.clone()).with_baselines(store.clone());
    let orchestrator = Orchestrator::new(Arc::new(engine), store.clone(), config.storage.persistence);

    Ok(api::state::AppState {
        orchestrator: Arc::new(orchestrator),
        store,
        config: Arc::new(config),
    })
}

/// Start the gateway HTTP server and run until it stops.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let persistence = config.storage.persistence;
    let app = api::router(build_state(config)?);

    tracing::info!(%addr, ?persistence, "anomaly gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

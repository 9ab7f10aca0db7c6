//! # custody-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the custody ledger.
//! Binds to configurable port (default 8080).

use custody_api::state::{AppConfig, AppState};
use custody_engine::CoordinatorConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let auth_token = std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());
    if auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, submission routes are unauthenticated");
    }
    let config = AppConfig { port, auth_token };
    let coordinator_config = CoordinatorConfig::from_env();

    let backend = custody_backend::select_backend().map_err(|e| {
        tracing::error!("Confirmation backend configuration failed: {e}");
        e
    })?;
    tracing::info!(backend = backend.name(), timeout = ?coordinator_config.confirm_timeout, "confirmation backend ready");

    // Optional: absent DATABASE_URL means in-memory only.
    let db_pool = custody_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let recorder = PrometheusBuilder::new().install_recorder()?;

    let state = AppState::with_backend(config, backend, coordinator_config, db_pool)
        .with_metrics(recorder);

    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        anyhow::anyhow!(e)
    })?;

    let app = custody_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Custody API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

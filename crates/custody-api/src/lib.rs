//! # custody-api — Query/Verify Gateway
//!
//! The HTTP face of the custody ledger. Submitters write through the
//! submission coordinator; everyone else reads and verifies.
//!
//! ## API Surface
//!
//! | Prefix                                  | Module                        | Auth   |
//! |-----------------------------------------|-------------------------------|--------|
//! | `POST /v1/evidence`                     | [`routes::evidence`]          | bearer |
//! | `POST /v1/evidence/{id}/events`         | [`routes::evidence`]          | bearer |
//! | `/v1/submissions/*`, `/v1/confirmations`| [`routes::submissions`]       | bearer |
//! | `GET /v1/evidence/{id}/chain`           | [`routes::verification`]      | public |
//! | `GET /v1/evidence/{id}/verification`    | [`routes::verification`]      | public |
//! | `/v1/identifiers/*`                     | [`routes::identifiers`]       | public |
//! | `/health/*`, `/metrics`, `/openapi.json`| here, [`openapi`]             | public |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware (submission routes only) → Handler
//! ```

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;

pub use error::AppError;
pub use state::{AppConfig, AppState};

/// Assemble the full application router.
///
/// Health probes, `/metrics`, the OpenAPI document and the verification
/// routes are mounted outside the auth middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let submission = Router::new()
        .merge(routes::evidence::router())
        .merge(routes::submissions::router())
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    let public = Router::new()
        .merge(routes::verification::router())
        .merge(routes::identifiers::router())
        .merge(openapi::router());

    let api = Router::new()
        .merge(submission)
        .merge(public)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state);

    Router::new().merge(ops).merge(api)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe.
///
/// 200 "ready" unless a configured database fails to answer, which is 503.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}

/// GET /metrics: Prometheus scrape endpoint.
///
/// Ledger gauges are refreshed on each scrape (pull model).
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    metrics::gauge!("custody_evidence_chains").set(state.store.len() as f64);
    let events: usize = state.store.snapshot().iter().map(|c| c.len()).sum();
    metrics::gauge!("custody_recorded_events").set(events as f64);

    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`metrics`]: Prometheus request metrics via the `metrics` facade.
//!
//! Request tracing uses `tower_http::trace::TraceLayer` directly.

pub mod metrics;

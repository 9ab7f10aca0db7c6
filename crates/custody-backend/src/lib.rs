//! # custody-backend — Confirmation Backends
//!
//! Implementations of [`custody_engine::ConfirmationBackend`]:
//!
//! - [`HttpConfirmationBackend`] posts each event to an external attestation
//!   service and takes the reference it returns.
//! - [`LocalAttestor`] signs the event digest with a local Ed25519 key. Used
//!   for single-node deployments and tests.
//!
//! [`select_backend`] picks one from the environment.

pub mod config;
pub mod http;
pub mod local;

use std::sync::Arc;

pub use config::{BackendConfig, ConfigError};
pub use http::HttpConfirmationBackend;
pub use local::{verify_attestation, LocalAttestor, REFERENCE_PREFIX};

use custody_engine::{ConfirmationBackend, DisconnectedBackend};

/// Build the backend configured in the environment.
///
/// `CUSTODY_BACKEND_URL` selects the HTTP backend, otherwise
/// `CUSTODY_ATTESTOR_SEED` selects the local attestor. With neither set every
/// confirmation fails as unavailable.
pub fn select_backend() -> Result<Arc<dyn ConfirmationBackend>, ConfigError> {
    if std::env::var_os("CUSTODY_BACKEND_URL").is_some() {
        let config = BackendConfig::from_env()?;
        tracing::info!(url = %config.base_url, "using HTTP confirmation backend");
        return Ok(Arc::new(HttpConfirmationBackend::new(config)?));
    }
    if let Ok(seed) = std::env::var("CUSTODY_ATTESTOR_SEED") {
        let attestor = LocalAttestor::from_hex_seed(&seed)?;
        tracing::info!(public_key = %attestor.public_key_hex(), "using local attestor");
        return Ok(Arc::new(attestor));
    }
    tracing::warn!("no confirmation backend configured; submissions will fail");
    Ok(Arc::new(DisconnectedBackend))
}

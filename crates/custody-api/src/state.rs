//! # Application State
//!
//! Shared state for the Axum application: the ledger, the submission
//! coordinator that writes to it, the read-only verifier, and the optional
//! Postgres pool that journals every appended event.

use std::sync::Arc;

use custody_engine::{
    ConfirmationBackend, CoordinatorConfig, DisconnectedBackend, LedgerJournal, LedgerStore,
    NoopJournal, SubmissionCoordinator, VerificationEngine,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use crate::db::custody_events::{self, PgJournal};

/// Server configuration.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Bearer token for the submission routes. `None` disables auth.
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LedgerStore>,
    pub coordinator: SubmissionCoordinator,
    pub verifier: VerificationEngine,
    pub db_pool: Option<PgPool>,
    /// Prometheus render handle; absent when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    pub config: AppConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("chains", &self.store.len())
            .field("coordinator", &self.coordinator)
            .field("db_pool", &self.db_pool.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    /// In-memory state with no confirmation backend. Every submission that
    /// passes validation ends as `CONFIRMATION_FAILED`.
    pub fn new() -> Self {
        Self::with_backend(
            AppConfig::default(),
            Arc::new(DisconnectedBackend),
            CoordinatorConfig::default(),
            None,
        )
    }

    /// Build state around a backend. When a pool is given, appended events
    /// are journaled to Postgres.
    pub fn with_backend(
        config: AppConfig,
        backend: Arc<dyn ConfirmationBackend>,
        coordinator_config: CoordinatorConfig,
        db_pool: Option<PgPool>,
    ) -> Self {
        let store = Arc::new(LedgerStore::new());
        let journal: Arc<dyn LedgerJournal> = match &db_pool {
            Some(pool) => Arc::new(PgJournal::new(pool.clone())),
            None => Arc::new(NoopJournal),
        };
        let coordinator = SubmissionCoordinator::new(
            Arc::clone(&store),
            backend,
            journal,
            coordinator_config,
        );
        let verifier = VerificationEngine::new(Arc::clone(&store));
        Self {
            store,
            coordinator,
            verifier,
            db_pool,
            metrics: None,
            config,
        }
    }

    /// Attach a Prometheus handle for the `/metrics` route.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Rebuild the in-memory ledger from the journal table.
    ///
    /// Every stored chain is integrity-checked before it is imported; a
    /// corrupt chain stops startup. Returns the number of chains loaded.
    pub async fn hydrate_from_db(&self) -> Result<usize, String> {
        let Some(pool) = &self.db_pool else {
            return Ok(0);
        };
        let rows = custody_events::load_all(pool)
            .await
            .map_err(|e| format!("failed to load custody events: {e}"))?;
        let event_count = rows.len();
        let chains = custody_events::assemble_chains(rows)?;
        let chain_count = chains.len();
        for chain in chains {
            let evidence_id = chain.evidence_id().clone();
            self.store
                .import_chain(chain)
                .map_err(|e| format!("failed to import chain {evidence_id}: {e}"))?;
        }
        tracing::info!(chains = chain_count, events = event_count, "ledger hydrated from database");
        Ok(chain_count)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_token() {
        let config = AppConfig {
            port: 8080,
            auth_token: Some("super-secret".into()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn hydrate_without_pool_is_noop() {
        let state = AppState::new();
        assert_eq!(state.hydrate_from_db().await.unwrap(), 0);
        assert!(state.store.is_empty());
    }

    #[test]
    fn new_state_uses_disconnected_backend() {
        let state = AppState::new();
        assert_eq!(state.coordinator.backend_name(), "disconnected");
    }
}

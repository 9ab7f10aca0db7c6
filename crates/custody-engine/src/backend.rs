//! # Confirmation Backend Boundary
//!
//! The durability backend attests that an event occurred and hands back an
//! opaque reference (a transaction hash, a signature, a receipt id). The
//! engine treats it as a capability: it does not know which network or
//! settlement model sits behind it.
//!
//! Concrete backends live in `custody-backend`. This module defines the
//! trait, the request the backend receives, and the failure taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use custody_core::{ContentDigest, EventBody, EventType, EvidenceId, ExternalReference, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Backend failures. All are terminal for the submission that hit them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No backend reachable: nothing configured, connection refused, 5xx.
    #[error("confirmation backend unavailable: {0}")]
    Unavailable(String),

    /// The backend declined to attest the event.
    #[error("confirmation explicitly rejected: {0}")]
    ExplicitRejection(String),

    #[error("confirmation did not complete within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl BackendError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "BACKEND_UNAVAILABLE",
            Self::ExplicitRejection(_) => "BACKEND_REJECTED",
            Self::Timeout(_) => "BACKEND_TIMEOUT",
        }
    }
}

/// What a backend is asked to attest: the exact body the ledger will record
/// and its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub submission_id: Uuid,
    pub evidence_id: EvidenceId,
    pub sequence_index: u64,
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub prev_digest: ContentDigest,
    pub event_digest: ContentDigest,
}

impl ConfirmationRequest {
    pub fn new(submission_id: Uuid, body: EventBody, event_digest: ContentDigest) -> Self {
        Self {
            submission_id,
            evidence_id: body.evidence_id,
            sequence_index: body.sequence_index,
            event_type: body.event_type,
            timestamp: body.timestamp,
            actor_id: body.actor_id,
            details: body.details,
            prev_digest: body.prev_digest,
            event_digest,
        }
    }
}

/// Durability backend capability.
#[async_trait]
pub trait ConfirmationBackend: Send + Sync {
    /// Short name for logs and health output.
    fn name(&self) -> &str;

    /// Attest the event. May take arbitrarily long; the coordinator bounds it.
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ExternalReference, BackendError>;

    /// Check that `reference` attests exactly `request`, for confirmations
    /// that arrive out of band instead of through [`confirm`](Self::confirm).
    /// A reference the backend does not vouch for is an `ExplicitRejection`.
    async fn check(
        &self,
        request: &ConfirmationRequest,
        reference: &ExternalReference,
    ) -> Result<(), BackendError>;
}

/// Backend used when nothing is configured. Every confirmation fails with
/// `Unavailable`, the way a browser without a wallet provider would.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedBackend;

#[async_trait]
impl ConfirmationBackend for DisconnectedBackend {
    fn name(&self) -> &str {
        "disconnected"
    }

    async fn confirm(&self, _request: &ConfirmationRequest) -> Result<ExternalReference, BackendError> {
        Err(BackendError::Unavailable(
            "no confirmation backend is configured".into(),
        ))
    }

    async fn check(
        &self,
        _request: &ConfirmationRequest,
        _reference: &ExternalReference,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unavailable(
            "no confirmation backend is configured".into(),
        ))
    }
}

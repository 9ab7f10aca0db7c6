//! # Verification Engine
//!
//! Read-only. Derives per-event and whole-chain verification results from a
//! ledger snapshot. Every digest and hash link is recomputed on each call;
//! a chain that fails those checks is reported as an [`IntegrityError`],
//! never folded into a `BROKEN` status.
//!
//! Results depend only on the events themselves: no clock reads, no
//! randomness.

use std::sync::Arc;

use custody_core::{
    ChainExport, ChainStatus, ContentDigest, CustodyChain, CustodyEvent, EventStatus, EventType,
    EvidenceId, ExternalReference, IntegrityError, Timestamp,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::LedgerStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("evidence {evidence_id} not found")]
    NotFound { evidence_id: String },

    #[error("evidence {evidence_id} has no event #{sequence_index}")]
    EventNotFound {
        evidence_id: String,
        sequence_index: u64,
    },

    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityError),
}

impl VerifyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::EventNotFound { .. } => "EVENT_NOT_FOUND",
            Self::Integrity(_) => "INTEGRITY_ERROR",
        }
    }
}

/// Whole-chain verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    pub evidence_id: EvidenceId,
    pub status: ChainStatus,
    pub event_count: usize,
    /// First event whose status is not Verified.
    pub first_non_verified_index: Option<u64>,
    /// First Rejected or Failed event.
    pub first_failing_index: Option<u64>,
    pub head_digest: ContentDigest,
    pub reason: String,
}

/// Single-event verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventVerificationResult {
    pub evidence_id: EvidenceId,
    pub sequence_index: u64,
    pub event_type: EventType,
    pub status: EventStatus,
    pub external_reference: Option<ExternalReference>,
    pub event_digest: ContentDigest,
    pub timestamp: Timestamp,
    pub actor_id: String,
    pub reason: String,
}

/// Verification over the ledger store.
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    store: Arc<LedgerStore>,
}

impl VerificationEngine {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    pub fn verify_chain(&self, evidence_id: &EvidenceId) -> Result<ChainVerificationResult, VerifyError> {
        let chain = self.checked_chain(evidence_id)?;
        Ok(summarize(&chain))
    }

    pub fn verify_event(
        &self,
        evidence_id: &EvidenceId,
        sequence_index: u64,
    ) -> Result<EventVerificationResult, VerifyError> {
        let chain = self.checked_chain(evidence_id)?;
        let event = chain
            .get(sequence_index)
            .ok_or_else(|| VerifyError::EventNotFound {
                evidence_id: evidence_id.to_string(),
                sequence_index,
            })?;
        Ok(describe(event))
    }

    fn checked_chain(&self, evidence_id: &EvidenceId) -> Result<CustodyChain, VerifyError> {
        let snapshot = self
            .store
            .get_chain(evidence_id)
            .ok_or_else(|| VerifyError::NotFound {
                evidence_id: evidence_id.to_string(),
            })?;
        recheck(evidence_id, snapshot.events().to_vec())
    }
}

/// Verify a chain that did not come from the local store.
pub fn verify_exported(export: ChainExport) -> Result<ChainVerificationResult, VerifyError> {
    let evidence_id = export.evidence_id.clone();
    let chain = recheck(&evidence_id, export.events)?;
    Ok(summarize(&chain))
}

/// Per-event results for every event of an exported chain.
pub fn describe_exported(export: ChainExport) -> Result<Vec<EventVerificationResult>, VerifyError> {
    let evidence_id = export.evidence_id.clone();
    let chain = recheck(&evidence_id, export.events)?;
    Ok(chain.events().iter().map(describe).collect())
}

fn recheck(evidence_id: &EvidenceId, events: Vec<CustodyEvent>) -> Result<CustodyChain, VerifyError> {
    CustodyChain::from_events(evidence_id.clone(), events).map_err(|e| {
        tracing::error!(
            evidence_id = %evidence_id,
            code = e.code(),
            error = %e,
            "custody chain failed integrity check"
        );
        VerifyError::Integrity(e)
    })
}

fn summarize(chain: &CustodyChain) -> ChainVerificationResult {
    let status = chain.status();
    let first_non_verified = chain.first_non_verified();
    let first_failing = chain.first_failing();
    let reason = match (status, first_failing, first_non_verified) {
        (ChainStatus::Broken, Some(event), _) => format!(
            "event #{} ({}) is {}",
            event.sequence_index, event.event_type, event.status
        ),
        (ChainStatus::Pending, _, Some(event)) => format!(
            "event #{} ({}) is awaiting confirmation",
            event.sequence_index, event.event_type
        ),
        _ => format!("all {} events verified", chain.len()),
    };
    ChainVerificationResult {
        evidence_id: chain.evidence_id().clone(),
        status,
        event_count: chain.len(),
        first_non_verified_index: first_non_verified.map(|e| e.sequence_index),
        first_failing_index: first_failing.map(|e| e.sequence_index),
        head_digest: chain.head_digest(),
        reason,
    }
}

fn describe(event: &CustodyEvent) -> EventVerificationResult {
    let reason = match (&event.status, &event.external_reference) {
        (EventStatus::Verified, Some(reference)) => format!("confirmed by {reference}"),
        (EventStatus::Verified, None) => "confirmed".to_string(),
        (EventStatus::Pending, _) => "awaiting confirmation".to_string(),
        (EventStatus::Rejected, _) => "confirmation was explicitly rejected".to_string(),
        (EventStatus::Failed, _) => "confirmation failed or timed out".to_string(),
    };
    EventVerificationResult {
        evidence_id: event.evidence_id.clone(),
        sequence_index: event.sequence_index,
        event_type: event.event_type,
        status: event.status,
        external_reference: event.external_reference.clone(),
        event_digest: event.event_digest,
        timestamp: event.timestamp,
        actor_id: event.actor_id.clone(),
        reason,
    }
}

//! # Ledger Store
//!
//! Append-only, per-identifier storage of custody chains. The authoritative
//! state of the engine.
//!
//! ## Concurrency
//!
//! Each identifier owns a slot with an append gate. An append takes the gate
//! with a non-blocking `try_lock`, so a second append racing on the same
//! identifier fails fast with `ConcurrentAppendConflict` instead of queueing.
//! Appends on different identifiers touch different slots and never contend.
//!
//! Reads clone an `Arc<CustodyChain>` out of the slot. A new chain value is
//! built off to the side and swapped in as a whole, so readers see a chain
//! either before or after an append, never a partially written event.
//!
//! ## Idempotence
//!
//! Every slot indexes the external references of its events. Appending the
//! same event again under a reference already recorded for that identifier
//! returns the existing index and writes nothing. A different event under a
//! recorded reference is a `DuplicateReference` error.

use std::collections::HashMap;
use std::sync::Arc;

use custody_core::{
    ContentDigest, CustodyChain, CustodyEvent, EventBody, EventStatus, EventType, EvidenceId,
    ExternalReference, IntegrityError, StatusError, Timestamp, ValidationError,
};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::validator::{check_ordering, ValidatedEvent};

/// Ledger store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("another append for {evidence_id} is in flight")]
    ConcurrentAppendConflict { evidence_id: String },

    #[error("the chain for {evidence_id} moved to index {actual} while index {expected} was being confirmed")]
    HeadMoved {
        evidence_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("evidence {evidence_id} has no chain and the event is not an intake event")]
    UnknownEvidence { evidence_id: String },

    #[error("evidence {evidence_id} not found")]
    NotFound { evidence_id: String },

    #[error("evidence {evidence_id} has no event #{sequence_index}")]
    EventNotFound {
        evidence_id: String,
        sequence_index: u64,
    },

    #[error("evidence {evidence_id} already has a chain")]
    AlreadyExists { evidence_id: String },

    #[error("reference {reference} is already recorded for event #{sequence_index} of {evidence_id}")]
    DuplicateReference {
        evidence_id: String,
        reference: String,
        sequence_index: u64,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConcurrentAppendConflict { .. } => "CONCURRENT_APPEND_CONFLICT",
            Self::HeadMoved { .. } => "CHAIN_HEAD_MOVED",
            Self::UnknownEvidence { .. } => "UNKNOWN_EVIDENCE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::EventNotFound { .. } => "EVENT_NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::DuplicateReference { .. } => "DUPLICATE_REFERENCE",
            Self::Validation(e) => e.code(),
            Self::Status(e) => e.code(),
            Self::Integrity(e) => e.code(),
        }
    }

    /// True for errors caused by another writer; the caller may retry.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentAppendConflict { .. } | Self::HeadMoved { .. }
        )
    }
}

/// Everything the store needs to record one event. The store assigns the
/// sequence index and hash link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub actor_id: String,
    pub details: Option<String>,
    pub status: EventStatus,
    pub external_reference: Option<ExternalReference>,
    /// When set, the append fails with `HeadMoved` unless this is the next index.
    pub expected_index: Option<u64>,
}

impl NewEvent {
    /// A Verified event built from a validated candidate.
    pub fn confirmed(event: &ValidatedEvent, reference: ExternalReference) -> Self {
        Self {
            event_type: event.event_type,
            timestamp: event.timestamp,
            actor_id: event.actor_id.clone(),
            details: event.details.clone(),
            status: EventStatus::Verified,
            external_reference: Some(reference),
            expected_index: None,
        }
    }

    pub fn expecting_index(mut self, index: u64) -> Self {
        self.expected_index = Some(index);
        self
    }

    /// Whether `recorded` is this event: same type, time, actor and details.
    pub fn describes(&self, recorded: &CustodyEvent) -> bool {
        recorded.event_type == self.event_type
            && recorded.timestamp == self.timestamp
            && recorded.actor_id == self.actor_id
            && recorded.details == self.details
    }
}

/// Result of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub sequence_index: u64,
    pub event_digest: ContentDigest,
    /// False when the external reference was already recorded.
    pub newly_appended: bool,
}

#[derive(Debug)]
struct Slot {
    gate: Mutex<()>,
    state: RwLock<SlotState>,
}

#[derive(Debug)]
struct SlotState {
    chain: Arc<CustodyChain>,
    references: HashMap<ExternalReference, u64>,
}

impl Slot {
    fn new(chain: CustodyChain) -> Result<Self, LedgerError> {
        let references = index_references(&chain)?;
        Ok(Self {
            gate: Mutex::new(()),
            state: RwLock::new(SlotState {
                chain: Arc::new(chain),
                references,
            }),
        })
    }

    fn chain(&self) -> Arc<CustodyChain> {
        Arc::clone(&self.state.read().chain)
    }
}

fn index_references(chain: &CustodyChain) -> Result<HashMap<ExternalReference, u64>, LedgerError> {
    let mut references = HashMap::new();
    for event in chain.events() {
        if let Some(reference) = &event.external_reference {
            if let Some(existing) = references.insert(reference.clone(), event.sequence_index) {
                return Err(LedgerError::DuplicateReference {
                    evidence_id: chain.evidence_id().to_string(),
                    reference: reference.to_string(),
                    sequence_index: existing,
                });
            }
        }
    }
    Ok(references)
}

/// Body of the event that would be appended next to `prior`.
pub(crate) fn next_body(
    evidence_id: &EvidenceId,
    prior: Option<&CustodyChain>,
    event_type: EventType,
    timestamp: Timestamp,
    actor_id: &str,
    details: Option<&str>,
) -> EventBody {
    EventBody {
        evidence_id: evidence_id.clone(),
        sequence_index: prior.map_or(0, CustodyChain::next_index),
        event_type,
        timestamp,
        actor_id: actor_id.to_string(),
        details: details.map(str::to_string),
        prev_digest: prior.map_or(ContentDigest::ZERO, CustodyChain::head_digest),
    }
}

/// In-memory ledger of custody chains.
#[derive(Debug, Default)]
pub struct LedgerStore {
    slots: RwLock<HashMap<EvidenceId, Arc<Slot>>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, evidence_id: &EvidenceId) -> Option<Arc<Slot>> {
        self.slots.read().get(evidence_id).cloned()
    }

    /// Append an event and return its sequence index.
    pub fn append(&self, evidence_id: &EvidenceId, event: NewEvent) -> Result<u64, LedgerError> {
        self.append_confirmed(evidence_id, event)
            .map(|receipt| receipt.sequence_index)
    }

    /// Append an event, returning the existing index when its external
    /// reference is already recorded for `evidence_id`.
    pub fn append_confirmed(
        &self,
        evidence_id: &EvidenceId,
        event: NewEvent,
    ) -> Result<AppendReceipt, LedgerError> {
        match self.slot(evidence_id) {
            Some(slot) => self.append_to(evidence_id, &slot, event),
            None => self.append_intake(evidence_id, event),
        }
    }

    fn append_intake(
        &self,
        evidence_id: &EvidenceId,
        event: NewEvent,
    ) -> Result<AppendReceipt, LedgerError> {
        if !event.event_type.is_intake() {
            return Err(LedgerError::UnknownEvidence {
                evidence_id: evidence_id.to_string(),
            });
        }
        check_expected(evidence_id, &event, 0)?;
        let recorded = seal(evidence_id, None, &event)?;
        let receipt = AppendReceipt {
            sequence_index: 0,
            event_digest: recorded.event_digest,
            newly_appended: true,
        };
        let chain = CustodyChain::from_events(evidence_id.clone(), vec![recorded])?;
        let slot = Arc::new(Slot::new(chain)?);

        let mut slots = self.slots.write();
        if let Some(existing) = slots.get(evidence_id).cloned() {
            // Lost the race to create the chain; retry against it.
            drop(slots);
            return self.append_to(evidence_id, &existing, event);
        }
        slots.insert(evidence_id.clone(), slot);
        drop(slots);

        record_append(evidence_id, &receipt);
        Ok(receipt)
    }

    fn append_to(
        &self,
        evidence_id: &EvidenceId,
        slot: &Slot,
        event: NewEvent,
    ) -> Result<AppendReceipt, LedgerError> {
        let _gate = slot
            .gate
            .try_lock()
            .ok_or_else(|| LedgerError::ConcurrentAppendConflict {
                evidence_id: evidence_id.to_string(),
            })?;

        let chain = slot.chain();
        if let Some(reference) = &event.external_reference {
            let recorded = slot.state.read().references.get(reference).copied();
            if let Some(sequence_index) = recorded {
                return match chain.get(sequence_index) {
                    Some(existing) if event.describes(existing) => Ok(AppendReceipt {
                        sequence_index,
                        event_digest: existing.event_digest,
                        newly_appended: false,
                    }),
                    _ => Err(LedgerError::DuplicateReference {
                        evidence_id: evidence_id.to_string(),
                        reference: reference.to_string(),
                        sequence_index,
                    }),
                };
            }
        }

        check_expected(evidence_id, &event, chain.next_index())?;
        check_ordering(evidence_id, event.event_type, event.timestamp, Some(&chain))?;

        let recorded = seal(evidence_id, Some(&chain), &event)?;
        let receipt = AppendReceipt {
            sequence_index: recorded.sequence_index,
            event_digest: recorded.event_digest,
            newly_appended: true,
        };
        let extended = chain.extended(recorded)?;

        let mut state = slot.state.write();
        if let Some(reference) = event.external_reference {
            state.references.insert(reference, receipt.sequence_index);
        }
        state.chain = Arc::new(extended);
        drop(state);

        record_append(evidence_id, &receipt);
        Ok(receipt)
    }

    /// Move a Pending event to a terminal status.
    ///
    /// The coordinator only ever appends settled events; this serves imports
    /// of externally settled outcomes and tests that need Pending events
    /// resolved after the fact.
    pub fn settle(
        &self,
        evidence_id: &EvidenceId,
        sequence_index: u64,
        outcome: EventStatus,
        reference: Option<ExternalReference>,
    ) -> Result<CustodyEvent, LedgerError> {
        let slot = self.slot(evidence_id).ok_or_else(|| LedgerError::NotFound {
            evidence_id: evidence_id.to_string(),
        })?;
        let _gate = slot
            .gate
            .try_lock()
            .ok_or_else(|| LedgerError::ConcurrentAppendConflict {
                evidence_id: evidence_id.to_string(),
            })?;

        let chain = slot.chain();
        let current = chain
            .get(sequence_index)
            .ok_or_else(|| LedgerError::EventNotFound {
                evidence_id: evidence_id.to_string(),
                sequence_index,
            })?;
        if let Some(reference) = &reference {
            if let Some(&existing) = slot.state.read().references.get(reference) {
                return Err(LedgerError::DuplicateReference {
                    evidence_id: evidence_id.to_string(),
                    reference: reference.to_string(),
                    sequence_index: existing,
                });
            }
        }
        let settled = current.settled(outcome, reference)?;
        let updated = chain.with_replaced(settled.clone())?;

        let mut state = slot.state.write();
        if let Some(reference) = &settled.external_reference {
            state.references.insert(reference.clone(), sequence_index);
        }
        state.chain = Arc::new(updated);
        drop(state);

        tracing::info!(
            evidence_id = %evidence_id,
            sequence_index,
            status = %settled.status,
            "custody event settled"
        );
        Ok(settled)
    }

    /// Load a complete chain, e.g. when hydrating from durable storage.
    pub fn import_chain(&self, chain: CustodyChain) -> Result<(), LedgerError> {
        let evidence_id = chain.evidence_id().clone();
        let slot = Arc::new(Slot::new(chain)?);
        let mut slots = self.slots.write();
        if slots.contains_key(&evidence_id) {
            return Err(LedgerError::AlreadyExists {
                evidence_id: evidence_id.to_string(),
            });
        }
        slots.insert(evidence_id, slot);
        Ok(())
    }

    pub fn get_chain(&self, evidence_id: &EvidenceId) -> Option<Arc<CustodyChain>> {
        self.slot(evidence_id).map(|slot| slot.chain())
    }

    pub fn exists(&self, evidence_id: &EvidenceId) -> bool {
        self.slots.read().contains_key(evidence_id)
    }

    /// Index of the event carrying `reference`, if recorded.
    pub fn find_reference(
        &self,
        evidence_id: &EvidenceId,
        reference: &ExternalReference,
    ) -> Option<u64> {
        let slot = self.slot(evidence_id)?;
        let index = slot.state.read().references.get(reference).copied();
        index
    }

    /// All chains, ordered by identifier.
    pub fn snapshot(&self) -> Vec<Arc<CustodyChain>> {
        let slots: Vec<Arc<Slot>> = self.slots.read().values().cloned().collect();
        let mut chains: Vec<Arc<CustodyChain>> = slots.iter().map(|s| s.chain()).collect();
        chains.sort_by(|a, b| a.evidence_id().cmp(b.evidence_id()));
        chains
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_expected(evidence_id: &EvidenceId, event: &NewEvent, actual: u64) -> Result<(), LedgerError> {
    match event.expected_index {
        Some(expected) if expected != actual => Err(LedgerError::HeadMoved {
            evidence_id: evidence_id.to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

fn seal(
    evidence_id: &EvidenceId,
    prior: Option<&CustodyChain>,
    event: &NewEvent,
) -> Result<CustodyEvent, LedgerError> {
    let body = next_body(
        evidence_id,
        prior,
        event.event_type,
        event.timestamp,
        &event.actor_id,
        event.details.as_deref(),
    );
    let sequence_index = body.sequence_index;
    CustodyEvent::seal(body, event.status, event.external_reference.clone()).map_err(|e| {
        LedgerError::Integrity(IntegrityError::Unhashable {
            evidence_id: evidence_id.to_string(),
            sequence_index,
            reason: e.to_string(),
        })
    })
}

fn record_append(evidence_id: &EvidenceId, receipt: &AppendReceipt) {
    metrics::counter!("custody_ledger_appends_total").increment(1);
    tracing::info!(
        evidence_id = %evidence_id,
        sequence_index = receipt.sequence_index,
        event_digest = %receipt.event_digest,
        "custody event appended"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: &[u8]) -> EvidenceId {
        EvidenceId::from_content(tag)
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn new_event(event_type: EventType, at: &str, reference: Option<&str>) -> NewEvent {
        NewEvent {
            event_type,
            timestamp: ts(at),
            actor_id: "Officer_01".into(),
            details: None,
            status: if reference.is_some() {
                EventStatus::Verified
            } else {
                EventStatus::Pending
            },
            external_reference: reference.map(|r| ExternalReference::new(r).unwrap()),
            expected_index: None,
        }
    }

    #[test]
    fn intake_then_events_get_contiguous_indices() {
        let store = LedgerStore::new();
        let e = id(b"a");
        assert_eq!(
            store
                .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .append(
                    &e,
                    new_event(EventType::ReceivedForTesting, "2025-10-21T14:05:12Z", Some("tx-1"))
                )
                .unwrap(),
            1
        );
        let chain = store.get_chain(&e).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.events()[1].prev_digest, chain.events()[0].event_digest);
        assert!(store.exists(&e));
        assert!(!store.exists(&id(b"b")));
    }

    #[test]
    fn non_intake_on_unknown_evidence_rejected() {
        let store = LedgerStore::new();
        let err = store
            .append(&id(b"a"), new_event(EventType::Transferred, "2025-10-20T10:12:34Z", Some("tx")))
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_EVIDENCE");
        assert!(store.is_empty());
    }

    #[test]
    fn second_intake_rejected() {
        let store = LedgerStore::new();
        let e = id(b"a");
        store
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        let err = store
            .append(&e, new_event(EventType::Submitted, "2025-10-21T10:12:34Z", Some("tx-1")))
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_INTAKE");
    }

    #[test]
    fn regression_rejected_without_mutation() {
        let store = LedgerStore::new();
        let e = id(b"a");
        store
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        let before = store.get_chain(&e).unwrap();
        let err = store
            .append(&e, new_event(EventType::Stored, "2025-10-19T00:00:00Z", Some("tx-1")))
            .unwrap_err();
        assert_eq!(err.code(), "TIMESTAMP_REGRESSION");
        assert_eq!(*store.get_chain(&e).unwrap(), *before);
    }

    #[test]
    fn duplicate_reference_is_idempotent() {
        let store = LedgerStore::new();
        let e = id(b"a");
        store
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        let first = store
            .append_confirmed(&e, new_event(EventType::Stored, "2025-10-21T00:00:00Z", Some("tx-1")))
            .unwrap();
        let again = store
            .append_confirmed(&e, new_event(EventType::Stored, "2025-10-21T00:00:00Z", Some("tx-1")))
            .unwrap();
        assert!(first.newly_appended);
        assert!(!again.newly_appended);
        assert_eq!(again.sequence_index, 1);
        assert_eq!(again.event_digest, first.event_digest);
        assert_eq!(store.get_chain(&e).unwrap().len(), 2);

        let intake_replay = store
            .append_confirmed(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        assert_eq!(intake_replay.sequence_index, 0);
        assert!(!intake_replay.newly_appended);
    }

    #[test]
    fn reused_reference_for_different_event_rejected() {
        let store = LedgerStore::new();
        let e = id(b"a");
        store
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        let err = store
            .append(&e, new_event(EventType::Stored, "2025-10-21T00:00:00Z", Some("tx-0")))
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_REFERENCE");
        assert_eq!(store.get_chain(&e).unwrap().len(), 1);
    }

    #[test]
    fn held_gate_yields_conflict() {
        let store = LedgerStore::new();
        let e = id(b"a");
        store
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        let slot = store.slot(&e).unwrap();
        let _held = slot.gate.lock();
        let err = store
            .append(&e, new_event(EventType::Stored, "2025-10-21T00:00:00Z", Some("tx-1")))
            .unwrap_err();
        assert_eq!(err.code(), "CONCURRENT_APPEND_CONFLICT");
        assert!(err.is_contention());

        // Other identifiers are unaffected.
        store
            .append(&id(b"b"), new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
    }

    #[test]
    fn expected_index_guards_against_moved_head() {
        let store = LedgerStore::new();
        let e = id(b"a");
        store
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        let err = store
            .append(
                &e,
                new_event(EventType::Stored, "2025-10-21T00:00:00Z", Some("tx-1")).expecting_index(2),
            )
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::HeadMoved {
                evidence_id: e.to_string(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn settle_moves_pending_once() {
        let store = LedgerStore::new();
        let e = id(b"a");
        store
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        store
            .append(&e, new_event(EventType::Analyzed, "2025-10-22T00:00:00Z", None))
            .unwrap();
        let digest = store.get_chain(&e).unwrap().events()[1].event_digest;

        let settled = store
            .settle(&e, 1, EventStatus::Verified, Some(ExternalReference::new("tx-1").unwrap()))
            .unwrap();
        assert_eq!(settled.status, EventStatus::Verified);
        assert_eq!(settled.event_digest, digest);
        assert_eq!(
            store.find_reference(&e, &ExternalReference::new("tx-1").unwrap()),
            Some(1)
        );

        let err = store.settle(&e, 1, EventStatus::Failed, None).unwrap_err();
        assert_eq!(err.code(), "STATUS_ALREADY_TERMINAL");
        let err = store.settle(&e, 7, EventStatus::Failed, None).unwrap_err();
        assert_eq!(err.code(), "EVENT_NOT_FOUND");
    }

    #[test]
    fn import_rejects_existing_chain() {
        let source = LedgerStore::new();
        let e = id(b"a");
        source
            .append(&e, new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx-0")))
            .unwrap();
        let chain = (*source.get_chain(&e).unwrap()).clone();

        let target = LedgerStore::new();
        target.import_chain(chain.clone()).unwrap();
        assert_eq!(target.get_chain(&e).unwrap().len(), 1);
        assert_eq!(
            target.import_chain(chain).unwrap_err().code(),
            "ALREADY_EXISTS"
        );
    }

    #[test]
    fn snapshot_is_sorted() {
        let store = LedgerStore::new();
        for tag in [b"c", b"a", b"b"] {
            store
                .append(&id(tag), new_event(EventType::Submitted, "2025-10-20T10:12:34Z", Some("tx")))
                .unwrap();
        }
        let ids: Vec<EvidenceId> = store
            .snapshot()
            .iter()
            .map(|c| c.evidence_id().clone())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(store.snapshot().len(), 3);
        assert_eq!(store.len(), 3);
    }
}

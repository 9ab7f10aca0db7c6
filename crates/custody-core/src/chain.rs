//! # Custody Chains
//!
//! [`CustodyChain`] is the ordered, non-empty sequence of events for one
//! evidence identifier. Every constructor runs the structural checks, so a
//! value of this type always satisfies:
//!
//! 1. sequence indices are `0..n` in order;
//! 2. every event names the chain's evidence identifier;
//! 3. event 0 is the intake event and no later event is;
//! 4. timestamps never decrease;
//! 5. each `prev_digest` equals the previous `event_digest` (zeros at 0);
//! 6. each `event_digest` matches its recomputed body digest;
//! 7. Verified events carry an external reference, Pending events do not.
//!
//! Violations are [`IntegrityError`]s: storage corruption or a forged
//! export, never an ordinary verification failure.

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::error::IntegrityError;
use crate::event::{CustodyEvent, EventStatus};
use crate::identifier::EvidenceId;

/// Overall verification status of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainStatus {
    /// Every event is Verified.
    Verified,
    /// At least one event is Rejected or Failed.
    Broken,
    /// Otherwise.
    Pending,
}

impl ChainStatus {
    /// Fold event statuses into a chain status.
    ///
    /// A failure anywhere wins over pending events; an empty input is Pending.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = EventStatus>,
    {
        let mut any = false;
        let mut all_verified = true;
        for status in statuses {
            any = true;
            if status.is_failure() {
                return Self::Broken;
            }
            if status != EventStatus::Verified {
                all_verified = false;
            }
        }
        if any && all_verified {
            Self::Verified
        } else {
            Self::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "VERIFIED",
            Self::Broken => "BROKEN",
            Self::Pending => "PENDING",
        }
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An integrity-checked chain of custody events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustodyChain {
    evidence_id: EvidenceId,
    events: Vec<CustodyEvent>,
}

impl CustodyChain {
    /// Build a chain from a full event list.
    pub fn from_events(
        evidence_id: EvidenceId,
        events: Vec<CustodyEvent>,
    ) -> Result<Self, IntegrityError> {
        if events.is_empty() {
            return Err(IntegrityError::EmptyChain {
                evidence_id: evidence_id.to_string(),
            });
        }
        let mut prev: Option<&CustodyEvent> = None;
        for (position, event) in events.iter().enumerate() {
            check_event(&evidence_id, position, prev, event)?;
            prev = Some(event);
        }
        Ok(Self {
            evidence_id,
            events,
        })
    }

    /// A copy of this chain with `event` appended.
    ///
    /// Only the new event is checked; the existing prefix already holds.
    pub fn extended(&self, event: CustodyEvent) -> Result<Self, IntegrityError> {
        check_event(&self.evidence_id, self.events.len(), self.events.last(), &event)?;
        let mut events = Vec::with_capacity(self.events.len() + 1);
        events.extend_from_slice(&self.events);
        events.push(event);
        Ok(Self {
            evidence_id: self.evidence_id.clone(),
            events,
        })
    }

    /// A copy with the event at `sequence_index` replaced by `event`.
    ///
    /// Used to record a status change. The replacement must hash to the same
    /// digest, so links and ordering are untouched.
    pub fn with_replaced(&self, event: CustodyEvent) -> Result<Self, IntegrityError> {
        let position = usize::try_from(event.sequence_index)
            .ok()
            .filter(|p| *p < self.events.len())
            .ok_or_else(|| IntegrityError::NonContiguousIndex {
                evidence_id: self.evidence_id.to_string(),
                position: self.events.len(),
                found: event.sequence_index,
            })?;
        if self.events[position].event_digest != event.event_digest {
            return Err(IntegrityError::DigestMismatch {
                evidence_id: self.evidence_id.to_string(),
                sequence_index: event.sequence_index,
            });
        }
        let prev = position.checked_sub(1).map(|p| &self.events[p]);
        check_event(&self.evidence_id, position, prev, &event)?;
        let mut events = self.events.clone();
        events[position] = event;
        Ok(Self {
            evidence_id: self.evidence_id.clone(),
            events,
        })
    }

    pub fn evidence_id(&self) -> &EvidenceId {
        &self.evidence_id
    }

    pub fn events(&self) -> &[CustodyEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always false: chains are never empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, sequence_index: u64) -> Option<&CustodyEvent> {
        usize::try_from(sequence_index)
            .ok()
            .and_then(|i| self.events.get(i))
    }

    pub fn last(&self) -> &CustodyEvent {
        // Non-empty by construction.
        &self.events[self.events.len() - 1]
    }

    /// Index the next appended event will receive.
    pub fn next_index(&self) -> u64 {
        self.events.len() as u64
    }

    /// Digest of the last event.
    pub fn head_digest(&self) -> ContentDigest {
        self.last().event_digest
    }

    pub fn status(&self) -> ChainStatus {
        ChainStatus::from_statuses(self.events.iter().map(|e| e.status))
    }

    /// First event that is not Verified.
    pub fn first_non_verified(&self) -> Option<&CustodyEvent> {
        self.events
            .iter()
            .find(|e| e.status != EventStatus::Verified)
    }

    /// First Rejected or Failed event.
    pub fn first_failing(&self) -> Option<&CustodyEvent> {
        self.events.iter().find(|e| e.status.is_failure())
    }

    /// Serializable copy for exporting.
    pub fn to_export(&self) -> ChainExport {
        ChainExport {
            evidence_id: self.evidence_id.clone(),
            events: self.events.clone(),
        }
    }

    pub fn into_events(self) -> Vec<CustodyEvent> {
        self.events
    }
}

/// A chain as it travels between systems: unchecked until
/// [`ChainExport::into_chain`] is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainExport {
    pub evidence_id: EvidenceId,
    pub events: Vec<CustodyEvent>,
}

impl ChainExport {
    pub fn into_chain(self) -> Result<CustodyChain, IntegrityError> {
        CustodyChain::from_events(self.evidence_id, self.events)
    }
}

fn check_event(
    evidence_id: &EvidenceId,
    position: usize,
    prev: Option<&CustodyEvent>,
    event: &CustodyEvent,
) -> Result<(), IntegrityError> {
    let chain = || evidence_id.to_string();
    let seq = event.sequence_index;

    if seq != position as u64 {
        return Err(IntegrityError::NonContiguousIndex {
            evidence_id: chain(),
            position,
            found: seq,
        });
    }
    if &event.evidence_id != evidence_id {
        return Err(IntegrityError::ForeignEvent {
            evidence_id: chain(),
            sequence_index: seq,
            found: event.evidence_id.to_string(),
        });
    }
    match prev {
        None => {
            if !event.event_type.is_intake() {
                return Err(IntegrityError::MissingIntake {
                    evidence_id: chain(),
                    event_type: event.event_type.to_string(),
                });
            }
            if !event.prev_digest.is_zero() {
                return Err(IntegrityError::BrokenLink {
                    evidence_id: chain(),
                    sequence_index: seq,
                });
            }
        }
        Some(prev) => {
            if event.event_type.is_intake() {
                return Err(IntegrityError::RepeatedIntake {
                    evidence_id: chain(),
                    sequence_index: seq,
                });
            }
            if event.timestamp < prev.timestamp {
                return Err(IntegrityError::TimestampRegression {
                    evidence_id: chain(),
                    sequence_index: seq,
                });
            }
            if event.prev_digest != prev.event_digest {
                return Err(IntegrityError::BrokenLink {
                    evidence_id: chain(),
                    sequence_index: seq,
                });
            }
        }
    }
    let computed = event
        .compute_digest()
        .map_err(|e| IntegrityError::Unhashable {
            evidence_id: chain(),
            sequence_index: seq,
            reason: e.to_string(),
        })?;
    if computed != event.event_digest {
        return Err(IntegrityError::DigestMismatch {
            evidence_id: chain(),
            sequence_index: seq,
        });
    }
    match (event.status, &event.external_reference) {
        (EventStatus::Verified, None) => Err(IntegrityError::MissingReference {
            evidence_id: chain(),
            sequence_index: seq,
            status: event.status,
        }),
        (EventStatus::Pending, Some(_)) => Err(IntegrityError::UnexpectedReference {
            evidence_id: chain(),
            sequence_index: seq,
        }),
        _ => Ok(()),
    }
}

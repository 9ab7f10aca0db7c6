//! # Custody Events
//!
//! A custody event is one state-changing action taken on an evidence item:
//! intake, hand-off to a lab, transfer to a prosecutor, disposal.
//!
//! Two shapes exist. [`CandidateEvent`] is what a caller submits: raw
//! strings, not yet checked. [`CustodyEvent`] is what the ledger records:
//! typed fields, a ledger-assigned sequence index, a verification status,
//! and a hash link to its predecessor.
//!
//! ## Hash link
//!
//! `event_digest = SHA-256(JCS(EventBody))`. The body covers every field
//! that identifies or orders the event, plus the predecessor's digest. It
//! excludes `status` and `external_reference`, the only fields the status
//! state machine may still set after an event is written.

use serde::{Deserialize, Deserializer, Serialize};

use crate::canonical::CanonicalBytes;
use crate::digest::{sha256_digest, ContentDigest};
use crate::error::{CanonicalizationError, ReferenceError, StatusError};
use crate::identifier::EvidenceId;
use crate::temporal::Timestamp;

/// The kind of action an event records.
///
/// Closed enumeration. New kinds are added here, never accepted as free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Submitted,
    ReceivedForTesting,
    Analyzed,
    Transferred,
    Stored,
    CheckedOut,
    Returned,
    Released,
    Disposed,
}

/// The event type every chain starts with.
pub const INTAKE_EVENT_TYPE: EventType = EventType::Submitted;

impl EventType {
    pub const ALL: [EventType; 9] = [
        Self::Submitted,
        Self::ReceivedForTesting,
        Self::Analyzed,
        Self::Transferred,
        Self::Stored,
        Self::CheckedOut,
        Self::Returned,
        Self::Released,
        Self::Disposed,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::ReceivedForTesting => "RECEIVED_FOR_TESTING",
            Self::Analyzed => "ANALYZED",
            Self::Transferred => "TRANSFERRED",
            Self::Stored => "STORED",
            Self::CheckedOut => "CHECKED_OUT",
            Self::Returned => "RETURNED",
            Self::Released => "RELEASED",
            Self::Disposed => "DISPOSED",
        }
    }

    /// Human-readable label for timelines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::ReceivedForTesting => "Received for testing",
            Self::Analyzed => "Analyzed",
            Self::Transferred => "Transferred",
            Self::Stored => "Stored",
            Self::CheckedOut => "Checked out",
            Self::Returned => "Returned",
            Self::Released => "Released",
            Self::Disposed => "Disposed",
        }
    }

    pub fn is_intake(&self) -> bool {
        *self == INTAKE_EVENT_TYPE
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    /// Accepts the wire name (`RECEIVED_FOR_TESTING`) or the label
    /// (`Received for testing`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| s.to_string())
    }
}

/// Verification status of one recorded event.
///
/// ```text
/// Pending --(confirmation succeeds)--> Verified
/// Pending --(explicit rejection)-----> Rejected
/// Pending --(timeout / fatal error)--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Pending,
    Verified,
    Rejected,
    Failed,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Rejected | Self::Failed)
    }

    /// The only way to move a status forward.
    pub fn transition(self, to: EventStatus) -> Result<EventStatus, StatusError> {
        if self.is_terminal() {
            return Err(StatusError::AlreadyTerminal { from: self, to });
        }
        if to == Self::Pending {
            return Err(StatusError::BackToPending);
        }
        Ok(to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to a confirmation record in the durability backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExternalReference(String);

impl ExternalReference {
    pub fn new(value: impl Into<String>) -> Result<Self, ReferenceError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ReferenceError::Empty);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ExternalReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// An unvalidated event as submitted by a caller.
///
/// Fields stay as strings so the validator can report exactly which rule
/// the input broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub evidence_id: String,
    pub event_type: String,
    pub actor_id: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Callers should leave this empty; the ledger assigns indices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u64>,
}

impl CandidateEvent {
    pub fn new(
        evidence_id: impl Into<String>,
        event_type: impl Into<String>,
        actor_id: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            evidence_id: evidence_id.into(),
            event_type: event_type.into(),
            actor_id: actor_id.into(),
            timestamp,
            details: None,
            sequence_index: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_sequence_index(mut self, index: u64) -> Self {
        self.sequence_index = Some(index);
        self
    }
}

/// The hashed part of a recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventBody {
    pub evidence_id: EvidenceId,
    pub sequence_index: u64,
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub actor_id: String,
    pub details: Option<String>,
    pub prev_digest: ContentDigest,
}

impl EventBody {
    pub fn digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }
}

/// A recorded custody event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEvent {
    pub sequence_index: u64,
    pub evidence_id: EvidenceId,
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<ExternalReference>,
    pub prev_digest: ContentDigest,
    pub event_digest: ContentDigest,
}

impl CustodyEvent {
    /// Compute the digest of `body` and attach status and reference.
    pub fn seal(
        body: EventBody,
        status: EventStatus,
        external_reference: Option<ExternalReference>,
    ) -> Result<Self, CanonicalizationError> {
        let event_digest = body.digest()?;
        Ok(Self {
            sequence_index: body.sequence_index,
            evidence_id: body.evidence_id,
            event_type: body.event_type,
            timestamp: body.timestamp,
            actor_id: body.actor_id,
            details: body.details,
            status,
            external_reference,
            prev_digest: body.prev_digest,
            event_digest,
        })
    }

    pub fn body(&self) -> EventBody {
        EventBody {
            evidence_id: self.evidence_id.clone(),
            sequence_index: self.sequence_index,
            event_type: self.event_type,
            timestamp: self.timestamp,
            actor_id: self.actor_id.clone(),
            details: self.details.clone(),
            prev_digest: self.prev_digest,
        }
    }

    /// Recompute the digest from the event's own fields.
    pub fn compute_digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        self.body().digest()
    }

    /// A copy of this event with its status moved to `outcome`.
    ///
    /// A Verified outcome needs a reference; other outcomes keep the one
    /// supplied, if any.
    pub fn settled(
        &self,
        outcome: EventStatus,
        reference: Option<ExternalReference>,
    ) -> Result<Self, StatusError> {
        let status = self.status.transition(outcome)?;
        if status == EventStatus::Verified && reference.is_none() {
            return Err(StatusError::MissingReference);
        }
        Ok(Self {
            status,
            external_reference: reference,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> EventBody {
        EventBody {
            evidence_id: EvidenceId::from_content(b"knife"),
            sequence_index: 0,
            event_type: EventType::Submitted,
            timestamp: Timestamp::parse("2025-10-20T10:12:34Z").unwrap(),
            actor_id: "Officer_01".into(),
            details: Some("Collected at scene".into()),
            prev_digest: ContentDigest::ZERO,
        }
    }

    #[test]
    fn event_type_parses_wire_names_and_labels() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>(), Ok(t));
            assert_eq!(t.label().parse::<EventType>(), Ok(t));
        }
        assert_eq!("received-for-testing".parse::<EventType>(), Ok(EventType::ReceivedForTesting));
        assert_eq!("Teleported".parse::<EventType>(), Err("Teleported".to_string()));
        assert!("".parse::<EventType>().is_err());
    }

    #[test]
    fn event_type_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&EventType::CheckedOut).unwrap(),
            "\"CHECKED_OUT\""
        );
        assert!(INTAKE_EVENT_TYPE.is_intake());
        assert!(!EventType::Disposed.is_intake());
    }

    #[test]
    fn pending_moves_to_any_terminal_state() {
        for to in [EventStatus::Verified, EventStatus::Rejected, EventStatus::Failed] {
            assert_eq!(EventStatus::Pending.transition(to), Ok(to));
        }
    }

    #[test]
    fn terminal_states_never_move() {
        for from in [EventStatus::Verified, EventStatus::Rejected, EventStatus::Failed] {
            for to in [
                EventStatus::Pending,
                EventStatus::Verified,
                EventStatus::Rejected,
                EventStatus::Failed,
            ] {
                assert_eq!(
                    from.transition(to),
                    Err(StatusError::AlreadyTerminal { from, to })
                );
            }
        }
    }

    #[test]
    fn pending_cannot_stay_pending() {
        assert_eq!(
            EventStatus::Pending.transition(EventStatus::Pending),
            Err(StatusError::BackToPending)
        );
    }

    #[test]
    fn external_reference_rejects_blank() {
        assert_eq!(ExternalReference::new("  "), Err(ReferenceError::Empty));
        assert_eq!(ExternalReference::new("0xabc").unwrap().as_str(), "0xabc");
        assert!(serde_json::from_str::<ExternalReference>("\"\"").is_err());
    }

    #[test]
    fn digest_excludes_status_and_reference() {
        let pending = CustodyEvent::seal(body(), EventStatus::Pending, None).unwrap();
        let verified = CustodyEvent::seal(
            body(),
            EventStatus::Verified,
            Some(ExternalReference::new("tx-1").unwrap()),
        )
        .unwrap();
        assert_eq!(pending.event_digest, verified.event_digest);
        assert_eq!(pending.compute_digest().unwrap(), pending.event_digest);
    }

    #[test]
    fn digest_covers_body_fields() {
        let base = body().digest().unwrap();
        let mut b = body();
        b.actor_id = "Officer_02".into();
        assert_ne!(b.digest().unwrap(), base);
        let mut b = body();
        b.details = None;
        assert_ne!(b.digest().unwrap(), base);
        let mut b = body();
        b.prev_digest = crate::sha256_raw(b"other");
        assert_ne!(b.digest().unwrap(), base);
    }

    #[test]
    fn settled_applies_the_state_machine() {
        let pending = CustodyEvent::seal(body(), EventStatus::Pending, None).unwrap();
        let reference = ExternalReference::new("tx-9").unwrap();

        let verified = pending
            .settled(EventStatus::Verified, Some(reference.clone()))
            .unwrap();
        assert_eq!(verified.status, EventStatus::Verified);
        assert_eq!(verified.external_reference, Some(reference.clone()));
        assert_eq!(verified.event_digest, pending.event_digest);

        assert_eq!(
            pending.settled(EventStatus::Verified, None),
            Err(StatusError::MissingReference)
        );
        assert!(pending.settled(EventStatus::Failed, None).is_ok());
        assert!(matches!(
            verified.settled(EventStatus::Rejected, None),
            Err(StatusError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn candidate_builder() {
        let c = CandidateEvent::new("0xaa", "SUBMITTED", "Officer_01", Timestamp::now())
            .with_details("bag 17")
            .with_sequence_index(0);
        assert_eq!(c.details.as_deref(), Some("bag 17"));
        assert_eq!(c.sequence_index, Some(0));
    }
}

//! # Event Validator
//!
//! The single synchronous gate a candidate event passes before anything is
//! sent to the confirmation backend. No I/O.
//!
//! Rules, in order; the first failure is reported:
//!
//! 1. the evidence identifier is well-formed;
//! 2. the event type is a known [`EventType`];
//! 3. the actor id is non-empty;
//! 4. against a non-empty chain the timestamp is not earlier than the last
//!    event's and the event is not a second intake; against an empty chain
//!    the event is the intake event;
//! 5. a caller-supplied sequence index, if any, is the next index.
//!
//! Equal timestamps pass rule 4. Events sharing a timestamp are ordered by
//! append order.

use custody_core::{
    CandidateEvent, CustodyChain, EventType, EvidenceId, Timestamp, ValidationError,
};

/// A candidate that passed every rule, with its fields typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEvent {
    pub evidence_id: EvidenceId,
    pub event_type: EventType,
    pub actor_id: String,
    pub timestamp: Timestamp,
    pub details: Option<String>,
}

pub type ValidationResult = Result<ValidatedEvent, ValidationError>;

/// Check `candidate` against the chain it would extend.
///
/// `prior` is `None` when the identifier has no chain yet. The caller is
/// responsible for passing the chain of the candidate's own identifier.
pub fn validate(candidate: &CandidateEvent, prior: Option<&CustodyChain>) -> ValidationResult {
    let evidence_id = EvidenceId::parse(&candidate.evidence_id).map_err(|e| {
        ValidationError::MalformedIdentifier {
            value: candidate.evidence_id.clone(),
            detail: e.to_string(),
        }
    })?;

    let event_type: EventType =
        candidate
            .event_type
            .parse()
            .map_err(|value| ValidationError::UnknownEventType { value })?;

    if candidate.actor_id.trim().is_empty() {
        return Err(ValidationError::MissingActor);
    }

    check_ordering(&evidence_id, event_type, candidate.timestamp, prior)?;

    if let Some(supplied) = candidate.sequence_index {
        let expected = prior.map_or(0, CustodyChain::next_index);
        if supplied != expected {
            return Err(ValidationError::SequenceIndexMismatch { supplied, expected });
        }
    }

    Ok(ValidatedEvent {
        evidence_id,
        event_type,
        actor_id: candidate.actor_id.clone(),
        timestamp: candidate.timestamp,
        details: candidate.details.clone(),
    })
}

/// Rule 4 on its own. The ledger store re-applies it under its append lock.
pub fn check_ordering(
    evidence_id: &EvidenceId,
    event_type: EventType,
    timestamp: Timestamp,
    prior: Option<&CustodyChain>,
) -> Result<(), ValidationError> {
    match prior {
        None => {
            if !event_type.is_intake() {
                return Err(ValidationError::InvalidFirstEvent {
                    event_type: event_type.to_string(),
                });
            }
        }
        Some(chain) => {
            let last = chain.last().timestamp;
            if timestamp < last {
                return Err(ValidationError::TimestampRegression {
                    last,
                    attempted: timestamp,
                });
            }
            if event_type.is_intake() {
                return Err(ValidationError::DuplicateIntake {
                    evidence_id: evidence_id.to_string(),
                });
            }
        }
    }
    Ok(())
}

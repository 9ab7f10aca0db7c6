//! # Error Taxonomy
//!
//! All errors use `thiserror`. Every error that reaches a caller carries a
//! stable, upper-snake reason code from `code()` next to its `Display`
//! message, so UIs and scripts can branch on the code while people read the
//! message.
//!
//! - [`ValidationError`]: a candidate event broke a structural or ordering
//!   rule. Recoverable locally, never retried automatically.
//! - [`IntegrityError`]: a stored chain violates its own invariants. This is
//!   corruption, not a legitimately rejected event, and is reported apart
//!   from a `BROKEN` verification result.
//! - [`StatusError`]: an attempted event-status transition is not allowed.
//! - [`IdentifierError`], [`TimestampError`], [`ReferenceError`],
//!   [`CanonicalizationError`]: parsing and encoding failures of the
//!   primitive types.

use thiserror::Error;

use crate::event::EventStatus;
use crate::temporal::Timestamp;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Floats are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Why a string is not a well-formed evidence identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier must start with the version tag \"0x\"")]
    MissingVersionTag,

    #[error("identifier must have {expected} hex characters after the version tag, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("identifier contains {found:?} at position {position}; only lowercase hex is allowed")]
    InvalidCharacter { position: usize, found: char },
}

/// An intake manifest exceeds the intake form limits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("case id must not be empty")]
    MissingCaseId,

    #[error("description must not be empty")]
    MissingDescription,

    #[error("at least one attachment is required")]
    NoAttachments,

    #[error("at most {max} attachments are accepted, got {actual}")]
    TooManyAttachments { max: usize, actual: usize },

    #[error("attachment {file_name:?} is {size_bytes} bytes, over the per-file limit")]
    AttachmentTooLarge { file_name: String, size_bytes: u64 },

    #[error("attachment {file_name:?} has unsupported media type {media_type:?}")]
    UnsupportedMediaType {
        file_name: String,
        media_type: String,
    },
}

impl ManifestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCaseId => "MISSING_CASE_ID",
            Self::MissingDescription => "MISSING_DESCRIPTION",
            Self::NoAttachments => "NO_ATTACHMENTS",
            Self::TooManyAttachments { .. } => "TOO_MANY_ATTACHMENTS",
            Self::AttachmentTooLarge { .. } => "ATTACHMENT_TOO_LARGE",
            Self::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
        }
    }
}

/// Timestamp parsing failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp must be UTC with a Z suffix, got {0:?}")]
    NotUtc(String),

    #[error("invalid RFC 3339 timestamp {input:?}: {reason}")]
    Invalid { input: String, reason: String },

    #[error("unix timestamp {0} is out of range")]
    OutOfRange(i64),
}

/// An external reference must identify something.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("external reference must not be empty")]
    Empty,
}

/// A candidate custody event was rejected before reaching the backend.
///
/// Variants are listed in evaluation order; the validator reports the first
/// rule that fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed evidence identifier {value:?}: {detail}")]
    MalformedIdentifier { value: String, detail: String },

    #[error("unknown event type {value:?}")]
    UnknownEventType { value: String },

    #[error("actor id must not be empty")]
    MissingActor,

    #[error("timestamp {attempted} precedes the last recorded event at {last}")]
    TimestampRegression { last: Timestamp, attempted: Timestamp },

    #[error("the first event of a chain must be SUBMITTED, got {event_type}")]
    InvalidFirstEvent { event_type: String },

    #[error("evidence {evidence_id} already has an intake event")]
    DuplicateIntake { evidence_id: String },

    #[error("sequence index {supplied} was supplied but the next index is {expected}")]
    SequenceIndexMismatch { supplied: u64, expected: u64 },
}

impl ValidationError {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier { .. } => "MALFORMED_IDENTIFIER",
            Self::UnknownEventType { .. } => "UNKNOWN_EVENT_TYPE",
            Self::MissingActor => "MISSING_ACTOR",
            Self::TimestampRegression { .. } => "TIMESTAMP_REGRESSION",
            Self::InvalidFirstEvent { .. } => "INVALID_FIRST_EVENT",
            Self::DuplicateIntake { .. } => "DUPLICATE_INTAKE",
            Self::SequenceIndexMismatch { .. } => "SEQUENCE_INDEX_MISMATCH",
        }
    }
}

/// An event-status transition outside the Pending → terminal state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("event status {from} is terminal; cannot move to {to}")]
    AlreadyTerminal { from: EventStatus, to: EventStatus },

    #[error("events cannot return to PENDING")]
    BackToPending,

    #[error("a VERIFIED event requires an external reference")]
    MissingReference,
}

impl StatusError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyTerminal { .. } => "STATUS_ALREADY_TERMINAL",
            Self::BackToPending => "STATUS_BACK_TO_PENDING",
            Self::MissingReference => "STATUS_MISSING_REFERENCE",
        }
    }
}

/// A stored or imported chain violates a structural invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("chain for {evidence_id} has no events")]
    EmptyChain { evidence_id: String },

    #[error("chain for {evidence_id}: position {position} holds sequence index {found}")]
    NonContiguousIndex {
        evidence_id: String,
        position: usize,
        found: u64,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} belongs to {found}")]
    ForeignEvent {
        evidence_id: String,
        sequence_index: u64,
        found: String,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} is earlier than its predecessor")]
    TimestampRegression {
        evidence_id: String,
        sequence_index: u64,
    },

    #[error("chain for {evidence_id}: first event is {event_type}, not SUBMITTED")]
    MissingIntake {
        evidence_id: String,
        event_type: String,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} is an intake event after position 0")]
    RepeatedIntake {
        evidence_id: String,
        sequence_index: u64,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} does not link to its predecessor")]
    BrokenLink {
        evidence_id: String,
        sequence_index: u64,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} digest does not match its content")]
    DigestMismatch {
        evidence_id: String,
        sequence_index: u64,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} is {status} without an external reference")]
    MissingReference {
        evidence_id: String,
        sequence_index: u64,
        status: EventStatus,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} is PENDING but carries an external reference")]
    UnexpectedReference {
        evidence_id: String,
        sequence_index: u64,
    },

    #[error("chain for {evidence_id}: event #{sequence_index} could not be canonicalized: {reason}")]
    Unhashable {
        evidence_id: String,
        sequence_index: u64,
        reason: String,
    },
}

impl IntegrityError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyChain { .. } => "EMPTY_CHAIN",
            Self::NonContiguousIndex { .. } => "NON_CONTIGUOUS_INDEX",
            Self::ForeignEvent { .. } => "FOREIGN_EVENT",
            Self::TimestampRegression { .. } => "STORED_TIMESTAMP_REGRESSION",
            Self::MissingIntake { .. } => "MISSING_INTAKE",
            Self::RepeatedIntake { .. } => "REPEATED_INTAKE",
            Self::BrokenLink { .. } => "BROKEN_LINK",
            Self::DigestMismatch { .. } => "DIGEST_MISMATCH",
            Self::MissingReference { .. } => "MISSING_REFERENCE",
            Self::UnexpectedReference { .. } => "UNEXPECTED_REFERENCE",
            Self::Unhashable { .. } => "UNHASHABLE_EVENT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_codes_are_stable() {
        let cases = [
            (
                ValidationError::MalformedIdentifier {
                    value: "0x12".into(),
                    detail: "short".into(),
                },
                "MALFORMED_IDENTIFIER",
            ),
            (
                ValidationError::UnknownEventType { value: "LOST".into() },
                "UNKNOWN_EVENT_TYPE",
            ),
            (ValidationError::MissingActor, "MISSING_ACTOR"),
            (
                ValidationError::InvalidFirstEvent {
                    event_type: "TRANSFERRED".into(),
                },
                "INVALID_FIRST_EVENT",
            ),
            (
                ValidationError::SequenceIndexMismatch {
                    supplied: 4,
                    expected: 2,
                },
                "SEQUENCE_INDEX_MISMATCH",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn regression_message_names_both_instants() {
        let err = ValidationError::TimestampRegression {
            last: Timestamp::parse("2025-10-21T14:05:12Z").unwrap(),
            attempted: Timestamp::parse("2025-10-20T09:00:00Z").unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2025-10-21T14:05:12Z"));
        assert!(msg.contains("2025-10-20T09:00:00Z"));
        assert_eq!(err.code(), "TIMESTAMP_REGRESSION");
    }

    #[test]
    fn integrity_codes_are_distinct_from_validation_codes() {
        let err = IntegrityError::TimestampRegression {
            evidence_id: "0xab".into(),
            sequence_index: 2,
        };
        assert_ne!(err.code(), "TIMESTAMP_REGRESSION");
        assert_eq!(
            IntegrityError::BrokenLink {
                evidence_id: "0xab".into(),
                sequence_index: 1
            }
            .code(),
            "BROKEN_LINK"
        );
    }
}

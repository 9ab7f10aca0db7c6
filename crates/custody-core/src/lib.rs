//! # custody-core — Foundational Types for the Custody Ledger
//!
//! Every other crate in the workspace depends on `custody-core`; it depends
//! on nothing internal. It defines the vocabulary of the ledger: what an
//! evidence identifier looks like, what a custody event carries, how a chain
//! of events is shaped, and which failures can be reported about them.
//!
//! ## Key Design Principles
//!
//! 1. **Validated newtypes for identifiers.** `EvidenceId` can only be built
//!    through [`EvidenceId::parse`] or one of the derivation functions. There
//!    is no way to hold a malformed identifier past the parsing boundary.
//!
//! 2. **`CanonicalBytes` for every digest.** Identifier derivation and event
//!    hash links both hash RFC 8785 canonical JSON, so the same logical input
//!    yields the same digest on every platform.
//!
//! 3. **One status enum.** [`EventStatus`] is the single authority for an
//!    event's verification state. Callers never infer status from other fields.
//!
//! 4. **UTC-only timestamps.** [`Timestamp`] rejects non-`Z` inputs and
//!    truncates to seconds, matching the canonicalization rules.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `custody-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod chain;
pub mod digest;
pub mod error;
pub mod event;
pub mod identifier;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use chain::{ChainExport, ChainStatus, CustodyChain};
pub use digest::{sha256_digest, sha256_raw, ContentDigest};
pub use error::{
    CanonicalizationError, IdentifierError, IntegrityError, ManifestError, ReferenceError,
    StatusError, TimestampError, ValidationError,
};
pub use event::{
    CandidateEvent, CustodyEvent, EventBody, EventStatus, EventType, ExternalReference,
    INTAKE_EVENT_TYPE,
};
pub use identifier::{validate_identifier, AttachmentDigest, EvidenceId, IntakeManifest};
pub use temporal::Timestamp;

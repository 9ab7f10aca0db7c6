//! # custody-engine — Custody Ledger Engine
//!
//! Everything that decides what enters the ledger and what the ledger says
//! about itself:
//!
//! - [`validator`]: the synchronous gate for candidate events.
//! - [`store`]: the append-only, per-identifier ledger.
//! - [`verify`]: read-only chain and event verification.
//! - [`backend`]: the confirmation backend boundary.
//! - [`coordinator`]: the asynchronous submission pipeline.
//! - [`journal`]: durable copy of appended events.
//!
//! The presentation layers (`custody-api`, `custody-cli`) call only
//! `submit`, `get_chain`, `verify_chain` and `verify_event`, plus the
//! replay entry point for backend notifications.

pub mod backend;
pub mod coordinator;
pub mod journal;
pub mod store;
pub mod validator;
pub mod verify;

pub use backend::{BackendError, ConfirmationBackend, ConfirmationRequest, DisconnectedBackend};
pub use coordinator::{
    CoordinatorConfig, ReplayError, SubmissionCoordinator, SubmissionHandle, SubmissionSnapshot,
    SubmissionState, DEFAULT_CONFIRM_TIMEOUT, DEFAULT_SUBMISSION_HISTORY,
};
pub use journal::{JournalError, LedgerJournal, NoopJournal};
pub use store::{AppendReceipt, LedgerError, LedgerStore, NewEvent};
pub use validator::{validate, ValidatedEvent, ValidationResult};
pub use verify::{
    describe_exported, verify_exported, ChainVerificationResult, EventVerificationResult,
    VerificationEngine, VerifyError,
};

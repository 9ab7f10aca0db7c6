//! Ledger journal: durable copy of appended events.
//!
//! The coordinator forwards every newly appended event here. A journal
//! failure is logged and counted but does not fail the submission: the
//! event is already in the ledger and confirmed by the backend.

use async_trait::async_trait;
use custody_core::CustodyEvent;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("journal write failed: {0}")]
pub struct JournalError(pub String);

#[async_trait]
pub trait LedgerJournal: Send + Sync {
    async fn record(&self, event: &CustodyEvent) -> Result<(), JournalError>;
}

/// Journal for in-memory deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJournal;

#[async_trait]
impl LedgerJournal for NoopJournal {
    async fn record(&self, _event: &CustodyEvent) -> Result<(), JournalError> {
        Ok(())
    }
}

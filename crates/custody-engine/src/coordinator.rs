//! # Submission Coordinator
//!
//! Drives a candidate event from submission to a durably recorded event:
//!
//! ```text
//! Validating ──► AwaitingConfirmation ──► Appended
//!     │                   │
//!     ▼                   ├──► ConfirmationFailed
//!  Rejected               └──► AppendConflict
//! ```
//!
//! Validation runs synchronously inside [`SubmissionCoordinator::submit`];
//! a rejected candidate never reaches the backend. Accepted candidates run
//! in a spawned task, so dropping the [`SubmissionHandle`] does not cancel
//! an in-flight confirmation: if it later succeeds, the event is appended.
//!
//! ## Lanes
//!
//! Submissions for one evidence identifier take turns on a per-identifier
//! lane (`tokio::sync::Mutex`). The candidate is re-validated once its turn
//! comes, against the chain as it is then, and the backend is asked to
//! attest the exact body (index, hash link, digest) that will be recorded.
//! Different identifiers use different lanes.
//!
//! ## Failure
//!
//! Every failure is terminal for that submission. The coordinator never
//! retries a backend call: a retry could repeat a user-facing side effect
//! such as a signing prompt. Callers resubmit a new candidate instead.
//!
//! ## Replayed confirmations
//!
//! A reference delivered out of band is appended only after the backend
//! [`check`](ConfirmationBackend::check)s that it attests the exact body
//! that would be recorded next.
//!
//! ## Registry
//!
//! Snapshots stay pollable by id. Once more than
//! [`CoordinatorConfig::submission_history`] are tracked, the oldest
//! terminal ones are dropped; in-flight submissions are never dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use custody_core::{
    CandidateEvent, ContentDigest, CustodyEvent, EventStatus, EventType, EvidenceId,
    ExternalReference, IntegrityError, Timestamp, ValidationError,
};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::backend::{BackendError, ConfirmationBackend, ConfirmationRequest};
use crate::journal::LedgerJournal;
use crate::store::{next_body, AppendReceipt, LedgerError, LedgerStore, NewEvent};
use crate::validator::{validate, ValidatedEvent};

/// Default bound on a single backend confirmation.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of submissions kept pollable.
pub const DEFAULT_SUBMISSION_HISTORY: usize = 10_000;

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub confirm_timeout: Duration,
    /// Submissions kept pollable before the oldest terminal ones are dropped.
    pub submission_history: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            submission_history: DEFAULT_SUBMISSION_HISTORY,
        }
    }
}

impl CoordinatorConfig {
    /// Reads `CUSTODY_CONFIRM_TIMEOUT_SECS` (default 30) and
    /// `CUSTODY_SUBMISSION_HISTORY` (default 10 000). Zero is ignored.
    pub fn from_env() -> Self {
        let secs = positive_env("CUSTODY_CONFIRM_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_CONFIRM_TIMEOUT.as_secs());
        let history = positive_env("CUSTODY_SUBMISSION_HISTORY")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_SUBMISSION_HISTORY);
        Self {
            confirm_timeout: Duration::from_secs(secs),
            submission_history: history,
        }
    }
}

fn positive_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|n| *n > 0)
}

/// Why a replayed confirmation was not recorded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The backend does not vouch for the reference, or could not be asked.
    #[error("reference {reference} was not confirmed: {error}")]
    Unconfirmed {
        reference: ExternalReference,
        error: BackendError,
    },
}

impl ReplayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.code(),
            Self::Unconfirmed {
                error: BackendError::ExplicitRejection(_),
                ..
            } => "UNCONFIRMED_REFERENCE",
            Self::Unconfirmed { error, .. } => error.code(),
        }
    }
}

/// Where a submission is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Validating,
    /// The backend has been asked to attest the event at `sequence_index`.
    AwaitingConfirmation {
        sequence_index: u64,
        event_digest: ContentDigest,
    },
    Appended {
        sequence_index: u64,
        external_reference: ExternalReference,
        event_digest: ContentDigest,
    },
    Rejected {
        reason: ValidationError,
    },
    ConfirmationFailed {
        error: BackendError,
    },
    /// Confirmed by the backend but not appended: another writer moved the
    /// chain. The reference can be replayed once the conflict is resolved.
    AppendConflict {
        external_reference: ExternalReference,
        error: LedgerError,
    },
    /// The ledger refused the event before it reached the backend.
    Aborted {
        error: LedgerError,
    },
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Validating | Self::AwaitingConfirmation { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Validating => "VALIDATING",
            Self::AwaitingConfirmation { .. } => "AWAITING_CONFIRMATION",
            Self::Appended { .. } => "APPENDED",
            Self::Rejected { .. } => "REJECTED",
            Self::ConfirmationFailed { .. } => "CONFIRMATION_FAILED",
            Self::AppendConflict { .. } => "APPEND_CONFLICT",
            Self::Aborted { .. } => "ABORTED",
        }
    }

    /// Stable reason code of a failed submission.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Rejected { reason } => Some(reason.code()),
            Self::ConfirmationFailed { error } => Some(error.code()),
            Self::AppendConflict { error, .. } | Self::Aborted { error } => Some(error.code()),
            _ => None,
        }
    }

    /// Human-readable failure message.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Rejected { reason } => Some(reason.to_string()),
            Self::ConfirmationFailed { error } => Some(error.to_string()),
            Self::AppendConflict { error, .. } | Self::Aborted { error } => Some(error.to_string()),
            _ => None,
        }
    }

    /// Event status this state settles the submission to.
    fn settled_status(&self) -> Option<EventStatus> {
        match self {
            Self::Validating | Self::AwaitingConfirmation { .. } => None,
            Self::Appended { .. } => Some(EventStatus::Verified),
            Self::Rejected { .. } => Some(EventStatus::Rejected),
            Self::ConfirmationFailed {
                error: BackendError::ExplicitRejection(_),
            } => Some(EventStatus::Rejected),
            Self::ConfirmationFailed { .. } | Self::AppendConflict { .. } | Self::Aborted { .. } => {
                Some(EventStatus::Failed)
            }
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            Self::Appended { .. } => "appended",
            Self::Rejected { .. } => "rejected",
            Self::ConfirmationFailed { .. } => "confirmation_failed",
            Self::AppendConflict { .. } => "append_conflict",
            Self::Aborted { .. } => "aborted",
            Self::Validating | Self::AwaitingConfirmation { .. } => "in_flight",
        }
    }
}

/// Point-in-time view of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSnapshot {
    pub id: Uuid,
    /// As submitted; may be malformed for rejected submissions.
    pub evidence_id: String,
    pub event_type: String,
    /// Status of the event this submission tried to record.
    pub status: EventStatus,
    pub state: SubmissionState,
    pub submitted_at: Timestamp,
}

/// Caller's view of a submission in progress.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    id: Uuid,
    rx: watch::Receiver<SubmissionSnapshot>,
}

impl SubmissionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SubmissionState {
        self.rx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> SubmissionSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for a terminal state.
    pub async fn outcome(&mut self) -> SubmissionState {
        let terminal = self
            .rx
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|s| s.state.clone());
        match terminal {
            Ok(state) => state,
            Err(_) => self.rx.borrow().state.clone(),
        }
    }
}

/// Orchestrates validation, confirmation, and append.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCoordinator")
            .field("backend", &self.inner.backend.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

struct Inner {
    store: Arc<LedgerStore>,
    backend: Arc<dyn ConfirmationBackend>,
    journal: Arc<dyn LedgerJournal>,
    config: CoordinatorConfig,
    lanes: Mutex<HashMap<EvidenceId, Arc<tokio::sync::Mutex<()>>>>,
    submissions: RwLock<Registry>,
}

/// Pollable submissions in arrival order.
#[derive(Default)]
struct Registry {
    entries: HashMap<Uuid, watch::Receiver<SubmissionSnapshot>>,
    order: VecDeque<Uuid>,
}

impl Registry {
    fn insert(&mut self, id: Uuid, rx: watch::Receiver<SubmissionSnapshot>, capacity: usize) {
        self.entries.insert(id, rx);
        self.order.push_back(id);

        // Each tracked id is looked at most once per insert.
        let mut budget = self.order.len();
        while self.entries.len() > capacity && budget > 0 {
            budget -= 1;
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            let in_flight = self
                .entries
                .get(&oldest)
                .is_some_and(|rx| !rx.borrow().state.is_terminal());
            if in_flight {
                self.order.push_back(oldest);
            } else {
                self.entries.remove(&oldest);
            }
        }
    }
}

impl SubmissionCoordinator {
    pub fn new(
        store: Arc<LedgerStore>,
        backend: Arc<dyn ConfirmationBackend>,
        journal: Arc<dyn LedgerJournal>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                journal,
                config,
                lanes: Mutex::new(HashMap::new()),
                submissions: RwLock::new(Registry::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.inner.store
    }

    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Submit a candidate event. Must be called inside a Tokio runtime.
    ///
    /// A candidate failing validation comes back already `Rejected`, and
    /// the backend is not called.
    pub fn submit(&self, candidate: CandidateEvent) -> SubmissionHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = watch::channel(SubmissionSnapshot {
            id,
            evidence_id: candidate.evidence_id.clone(),
            event_type: candidate.event_type.clone(),
            status: EventStatus::Pending,
            state: SubmissionState::Validating,
            submitted_at: Timestamp::now(),
        });
        let prior = EvidenceId::parse(&candidate.evidence_id)
            .ok()
            .and_then(|e| self.inner.store.get_chain(&e));
        match validate(&candidate, prior.as_deref()) {
            Err(reason) => {
                tracing::info!(
                    submission_id = %id,
                    evidence_id = %candidate.evidence_id,
                    code = reason.code(),
                    "submission rejected"
                );
                finish(&tx, SubmissionState::Rejected { reason });
                self.inner.track(id, rx.clone());
            }
            Ok(validated) => {
                tracing::debug!(submission_id = %id, evidence_id = %validated.evidence_id, "submission accepted");
                self.inner.track(id, rx.clone());
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    inner.run(id, validated.evidence_id, candidate, tx).await;
                });
            }
        }
        SubmissionHandle { id, rx }
    }

    /// Latest snapshot of a submission made through this coordinator.
    pub fn submission(&self, id: Uuid) -> Option<SubmissionSnapshot> {
        self.inner
            .submissions
            .read()
            .entries
            .get(&id)
            .map(|rx| rx.borrow().clone())
    }

    /// Number of submissions currently pollable.
    pub fn tracked_submissions(&self) -> usize {
        self.inner.submissions.read().entries.len()
    }

    /// Record a confirmation that arrived out of band: a duplicated or
    /// retried backend notification.
    ///
    /// Idempotent on `(evidence_id, reference)`: a reference already in the
    /// ledger returns its existing index and writes nothing. A new reference
    /// is appended only if the backend confirms it attests the event that
    /// would be recorded next.
    pub async fn replay_confirmation(
        &self,
        candidate: CandidateEvent,
        reference: ExternalReference,
    ) -> Result<AppendReceipt, ReplayError> {
        let evidence_id = EvidenceId::parse(&candidate.evidence_id).map_err(|e| {
            LedgerError::from(ValidationError::MalformedIdentifier {
                value: candidate.evidence_id.clone(),
                detail: e.to_string(),
            })
        })?;
        let lane = self.inner.lane(&evidence_id);
        let turn = lane.lock().await;
        let result = self.inner.replay(&evidence_id, &candidate, reference).await;
        drop(turn);
        self.inner.release_lane(&evidence_id, lane);

        let label = match &result {
            Ok(receipt) if receipt.newly_appended => "appended",
            Ok(_) => "duplicate",
            Err(ReplayError::Unconfirmed { .. }) => "unconfirmed",
            Err(ReplayError::Ledger(_)) => "error",
        };
        metrics::counter!("custody_confirmation_replays_total", "result" => label).increment(1);
        result
    }
}

impl Inner {
    fn track(&self, id: Uuid, rx: watch::Receiver<SubmissionSnapshot>) {
        self.submissions
            .write()
            .insert(id, rx, self.config.submission_history);
    }

    fn lane(&self, evidence_id: &EvidenceId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.lanes
                .lock()
                .entry(evidence_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drop the lane once nobody else holds or waits on it.
    fn release_lane(&self, evidence_id: &EvidenceId, lane: Arc<tokio::sync::Mutex<()>>) {
        let mut lanes = self.lanes.lock();
        // One reference in the map, one here.
        if Arc::strong_count(&lane) == 2 {
            lanes.remove(evidence_id);
        }
    }

    async fn run(
        self: Arc<Self>,
        id: Uuid,
        evidence_id: EvidenceId,
        candidate: CandidateEvent,
        tx: watch::Sender<SubmissionSnapshot>,
    ) {
        let lane = self.lane(&evidence_id);
        let turn = lane.lock().await;
        let state = self.confirm_and_append(id, &evidence_id, &candidate, &tx).await;
        drop(turn);
        self.release_lane(&evidence_id, lane);
        finish(&tx, state);
    }

    async fn confirm_and_append(
        &self,
        id: Uuid,
        evidence_id: &EvidenceId,
        candidate: &CandidateEvent,
        tx: &watch::Sender<SubmissionSnapshot>,
    ) -> SubmissionState {
        let prior = self.store.get_chain(evidence_id);
        let validated: ValidatedEvent = match validate(candidate, prior.as_deref()) {
            Ok(v) => v,
            Err(reason) => {
                tracing::info!(submission_id = %id, code = reason.code(), "submission rejected on its turn");
                return SubmissionState::Rejected { reason };
            }
        };

        let body = next_body(
            evidence_id,
            prior.as_deref(),
            validated.event_type,
            validated.timestamp,
            &validated.actor_id,
            validated.details.as_deref(),
        );
        let sequence_index = body.sequence_index;
        let event_digest = match body.digest() {
            Ok(d) => d,
            Err(e) => {
                return SubmissionState::Aborted {
                    error: LedgerError::Integrity(IntegrityError::Unhashable {
                        evidence_id: evidence_id.to_string(),
                        sequence_index,
                        reason: e.to_string(),
                    }),
                };
            }
        };
        tx.send_modify(|s| {
            s.state = SubmissionState::AwaitingConfirmation {
                sequence_index,
                event_digest,
            }
        });

        let request = ConfirmationRequest::new(id, body, event_digest);
        let timeout = self.config.confirm_timeout;
        let reference = match tokio::time::timeout(timeout, self.backend.confirm(&request)).await {
            Ok(Ok(reference)) => reference,
            Ok(Err(error)) => {
                tracing::warn!(
                    submission_id = %id,
                    backend = self.backend.name(),
                    code = error.code(),
                    error = %error,
                    "confirmation failed"
                );
                return SubmissionState::ConfirmationFailed { error };
            }
            Err(_) => {
                tracing::warn!(
                    submission_id = %id,
                    backend = self.backend.name(),
                    timeout_secs = timeout.as_secs(),
                    "confirmation timed out"
                );
                return SubmissionState::ConfirmationFailed {
                    error: BackendError::Timeout(timeout),
                };
            }
        };

        let event = NewEvent::confirmed(&validated, reference.clone()).expecting_index(sequence_index);
        match self.store.append_confirmed(evidence_id, event) {
            Ok(receipt) => {
                if receipt.newly_appended {
                    self.journal(evidence_id, receipt.sequence_index).await;
                }
                SubmissionState::Appended {
                    sequence_index: receipt.sequence_index,
                    external_reference: reference,
                    event_digest: receipt.event_digest,
                }
            }
            Err(error) => {
                tracing::error!(
                    submission_id = %id,
                    evidence_id = %evidence_id,
                    external_reference = %reference,
                    code = error.code(),
                    error = %error,
                    "confirmed event could not be appended"
                );
                SubmissionState::AppendConflict {
                    external_reference: reference,
                    error,
                }
            }
        }
    }

    async fn replay(
        &self,
        evidence_id: &EvidenceId,
        candidate: &CandidateEvent,
        reference: ExternalReference,
    ) -> Result<AppendReceipt, ReplayError> {
        if let Some(sequence_index) = self.store.find_reference(evidence_id, &reference) {
            let existing = self
                .store
                .get_chain(evidence_id)
                .and_then(|c| c.get(sequence_index).cloned());
            return match existing {
                Some(event) if candidate_matches(candidate, &event) => {
                    tracing::debug!(evidence_id = %evidence_id, sequence_index, "confirmation already recorded");
                    Ok(AppendReceipt {
                        sequence_index,
                        event_digest: event.event_digest,
                        newly_appended: false,
                    })
                }
                _ => Err(LedgerError::DuplicateReference {
                    evidence_id: evidence_id.to_string(),
                    reference: reference.to_string(),
                    sequence_index,
                }
                .into()),
            };
        }
        let prior = self.store.get_chain(evidence_id);
        let validated = validate(candidate, prior.as_deref()).map_err(LedgerError::from)?;

        let body = next_body(
            evidence_id,
            prior.as_deref(),
            validated.event_type,
            validated.timestamp,
            &validated.actor_id,
            validated.details.as_deref(),
        );
        let sequence_index = body.sequence_index;
        let event_digest = body.digest().map_err(|e| {
            LedgerError::Integrity(IntegrityError::Unhashable {
                evidence_id: evidence_id.to_string(),
                sequence_index,
                reason: e.to_string(),
            })
        })?;
        let request = ConfirmationRequest::new(Uuid::new_v4(), body, event_digest);
        let timeout = self.config.confirm_timeout;
        let checked = match tokio::time::timeout(timeout, self.backend.check(&request, &reference)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(timeout)),
        };
        if let Err(error) = checked {
            tracing::warn!(
                evidence_id = %evidence_id,
                sequence_index,
                external_reference = %reference,
                backend = self.backend.name(),
                code = error.code(),
                "replayed reference not confirmed"
            );
            return Err(ReplayError::Unconfirmed { reference, error });
        }

        let event = NewEvent::confirmed(&validated, reference).expecting_index(sequence_index);
        let receipt = self.store.append_confirmed(evidence_id, event)?;
        if receipt.newly_appended {
            self.journal(evidence_id, receipt.sequence_index).await;
        }
        Ok(receipt)
    }

    async fn journal(&self, evidence_id: &EvidenceId, sequence_index: u64) {
        let Some(event) = self
            .store
            .get_chain(evidence_id)
            .and_then(|c| c.get(sequence_index).cloned())
        else {
            return;
        };
        if let Err(e) = self.journal.record(&event).await {
            metrics::counter!("custody_journal_failures_total").increment(1);
            tracing::error!(
                evidence_id = %evidence_id,
                sequence_index,
                error = %e,
                "failed to journal appended event"
            );
        }
    }
}

fn candidate_matches(candidate: &CandidateEvent, recorded: &CustodyEvent) -> bool {
    candidate.event_type.parse::<EventType>().ok() == Some(recorded.event_type)
        && candidate.timestamp == recorded.timestamp
        && candidate.actor_id == recorded.actor_id
        && candidate.details == recorded.details
}

fn finish(tx: &watch::Sender<SubmissionSnapshot>, state: SubmissionState) {
    metrics::counter!("custody_submissions_total", "outcome" => state.outcome_label()).increment(1);
    let settled = state.settled_status();
    tx.send_modify(|snapshot| {
        if let Some(to) = settled {
            match snapshot.status.transition(to) {
                Ok(status) => snapshot.status = status,
                Err(e) => tracing::warn!(submission_id = %snapshot.id, error = %e, "status already settled"),
            }
        }
        snapshot.state = state;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DisconnectedBackend;
    use crate::journal::NoopJournal;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ConfirmationBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn confirm(&self, request: &ConfirmationRequest) -> Result<ExternalReference, BackendError> {
            ExternalReference::new(format!("tx-{}", request.event_digest))
                .map_err(|e| BackendError::Unavailable(e.to_string()))
        }

        async fn check(
            &self,
            request: &ConfirmationRequest,
            reference: &ExternalReference,
        ) -> Result<(), BackendError> {
            if reference.as_str() == format!("tx-{}", request.event_digest) {
                Ok(())
            } else {
                Err(BackendError::ExplicitRejection("not issued here".into()))
            }
        }
    }

    /// Never answers.
    struct Stalled;

    #[async_trait]
    impl ConfirmationBackend for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn confirm(&self, _request: &ConfirmationRequest) -> Result<ExternalReference, BackendError> {
            std::future::pending().await
        }

        async fn check(
            &self,
            _request: &ConfirmationRequest,
            _reference: &ExternalReference,
        ) -> Result<(), BackendError> {
            std::future::pending().await
        }
    }

    fn coordinator(backend: Arc<dyn ConfirmationBackend>) -> SubmissionCoordinator {
        coordinator_keeping(backend, DEFAULT_SUBMISSION_HISTORY)
    }

    fn coordinator_keeping(
        backend: Arc<dyn ConfirmationBackend>,
        submission_history: usize,
    ) -> SubmissionCoordinator {
        SubmissionCoordinator::new(
            Arc::new(LedgerStore::new()),
            backend,
            Arc::new(NoopJournal),
            CoordinatorConfig {
                submission_history,
                ..CoordinatorConfig::default()
            },
        )
    }

    fn malformed() -> CandidateEvent {
        CandidateEvent::new("not-an-id", "SUBMITTED", "Officer_01", Timestamp::now())
    }

    fn intake(e: &EvidenceId) -> CandidateEvent {
        CandidateEvent::new(
            e.to_string(),
            "SUBMITTED",
            "Officer_01",
            Timestamp::parse("2025-10-20T10:12:34Z").unwrap(),
        )
    }

    #[tokio::test]
    async fn appended_submission_is_verified() {
        let c = coordinator(Arc::new(Echo));
        let e = EvidenceId::from_content(b"a");
        let mut handle = c.submit(intake(&e));
        let state = handle.outcome().await;
        assert!(matches!(state, SubmissionState::Appended { sequence_index: 0, .. }));
        let snapshot = c.submission(handle.id()).unwrap();
        assert_eq!(snapshot.status, EventStatus::Verified);
        assert_eq!(c.store().get_chain(&e).unwrap().events()[0].event_type, EventType::Submitted);
    }

    #[tokio::test]
    async fn rejection_is_immediate() {
        let c = coordinator(Arc::new(Echo));
        let handle = c.submit(CandidateEvent::new(
            "not-an-id",
            "SUBMITTED",
            "Officer_01",
            Timestamp::now(),
        ));
        assert_eq!(handle.state().name(), "REJECTED");
        assert_eq!(handle.state().reason_code(), Some("MALFORMED_IDENTIFIER"));
        assert_eq!(handle.snapshot().status, EventStatus::Rejected);
    }

    #[tokio::test]
    async fn unavailable_backend_fails_without_append() {
        let c = coordinator(Arc::new(DisconnectedBackend));
        let e = EvidenceId::from_content(b"a");
        let mut handle = c.submit(intake(&e));
        let state = handle.outcome().await;
        assert_eq!(state.reason_code(), Some("BACKEND_UNAVAILABLE"));
        assert_eq!(handle.snapshot().status, EventStatus::Failed);
        assert!(!c.store().exists(&e));
    }

    #[tokio::test]
    async fn registry_keeps_only_recent_terminal_submissions() {
        let c = coordinator_keeping(Arc::new(Echo), 3);
        let ids: Vec<Uuid> = (0..50).map(|_| c.submit(malformed()).id()).collect();

        assert_eq!(c.tracked_submissions(), 3);
        assert!(c.submission(ids[0]).is_none());
        assert!(c.submission(ids[46]).is_none());
        for id in &ids[47..] {
            assert_eq!(c.submission(*id).unwrap().state.name(), "REJECTED");
        }
    }

    #[tokio::test]
    async fn registry_never_drops_in_flight_submissions() {
        let c = coordinator_keeping(Arc::new(Stalled), 1);
        let e = EvidenceId::from_content(b"a");
        let pending = c.submit(intake(&e));
        for _ in 0..10 {
            c.submit(malformed());
        }
        let snapshot = c.submission(pending.id()).unwrap();
        assert!(!snapshot.state.is_terminal());
        assert_eq!(c.tracked_submissions(), 1);
    }

    #[tokio::test]
    async fn replayed_reference_must_be_confirmed() {
        let c = coordinator(Arc::new(Echo));
        let e = EvidenceId::from_content(b"a");
        c.submit(intake(&e)).outcome().await;

        let disposal = CandidateEvent::new(
            e.to_string(),
            "DISPOSED",
            "Nobody",
            Timestamp::parse("2025-10-21T10:00:00Z").unwrap(),
        );
        let forged = ExternalReference::new("made-up-by-caller").unwrap();
        let err = c.replay_confirmation(disposal.clone(), forged).await.unwrap_err();
        assert_eq!(err.code(), "UNCONFIRMED_REFERENCE");
        assert_eq!(c.store().get_chain(&e).unwrap().len(), 1);

        let chain = c.store().get_chain(&e).unwrap();
        let body = next_body(
            &e,
            Some(&*chain),
            EventType::Disposed,
            disposal.timestamp,
            "Nobody",
            None,
        );
        let issued = ExternalReference::new(format!("tx-{}", body.digest().unwrap())).unwrap();
        let receipt = c.replay_confirmation(disposal, issued).await.unwrap();
        assert!(receipt.newly_appended);
        assert_eq!(receipt.sequence_index, 1);
    }

    #[tokio::test]
    async fn replay_without_backend_is_unavailable() {
        let c = coordinator(Arc::new(DisconnectedBackend));
        let e = EvidenceId::from_content(b"a");
        let reference = ExternalReference::new("0xfeed").unwrap();
        let err = c.replay_confirmation(intake(&e), reference).await.unwrap_err();
        assert_eq!(err.code(), "BACKEND_UNAVAILABLE");
        assert!(!c.store().exists(&e));
    }

    #[test]
    fn config_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.confirm_timeout, Duration::from_secs(30));
        assert_eq!(config.submission_history, 10_000);
    }

    #[test]
    fn terminal_states() {
        assert!(!SubmissionState::Validating.is_terminal());
        assert!(SubmissionState::Rejected {
            reason: ValidationError::MissingActor
        }
        .is_terminal());
        assert_eq!(
            SubmissionState::ConfirmationFailed {
                error: BackendError::ExplicitRejection("declined".into())
            }
            .settled_status(),
            Some(EventStatus::Rejected)
        );
    }
}

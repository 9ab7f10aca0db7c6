//! End-to-end submission scenarios through the coordinator.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use custody_core::{
    CandidateEvent, ChainStatus, ContentDigest, EventBody, EventStatus, EventType, EvidenceId,
    ExternalReference, Timestamp,
};
use custody_engine::{
    BackendError, ConfirmationBackend, ConfirmationRequest, CoordinatorConfig, JournalError,
    LedgerJournal, LedgerStore, NoopJournal, SubmissionCoordinator, SubmissionHandle,
    SubmissionState, VerificationEngine,
};
use tokio::sync::Semaphore;

fn issued(digest: &ContentDigest) -> ExternalReference {
    ExternalReference::new(format!("0x{digest}")).unwrap()
}

fn check_issued(
    request: &ConfirmationRequest,
    reference: &ExternalReference,
) -> Result<(), BackendError> {
    if *reference == issued(&request.event_digest) {
        Ok(())
    } else {
        Err(BackendError::ExplicitRejection("unknown reference".into()))
    }
}

/// Confirms with a reference derived from the event digest.
struct Instant;

#[async_trait]
impl ConfirmationBackend for Instant {
    fn name(&self) -> &str {
        "instant"
    }

    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ExternalReference, BackendError> {
        Ok(issued(&request.event_digest))
    }

    async fn check(
        &self,
        request: &ConfirmationRequest,
        reference: &ExternalReference,
    ) -> Result<(), BackendError> {
        check_issued(request, reference)
    }
}

/// Never answers.
struct Silent;

#[async_trait]
impl ConfirmationBackend for Silent {
    fn name(&self) -> &str {
        "silent"
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

/// Answers after the test releases a permit. Events for `held` wait; others
/// pass straight through.
struct Gated {
    permits: Semaphore,
    held: Option<EvidenceId>,
}

impl Gated {
    fn new(held: Option<EvidenceId>) -> Self {
        Self {
            permits: Semaphore::new(0),
            held,
        }
    }
}

#[async_trait]
impl ConfirmationBackend for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ExternalReference, BackendError> {
        let must_wait = self
            .held
            .as_ref()
            .map_or(true, |held| *held == request.evidence_id);
        if must_wait {
            let permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| BackendError::Unavailable(e.to_string()))?;
            permit.forget();
        }
        Ok(issued(&request.event_digest))
    }

    async fn check(
        &self,
        request: &ConfirmationRequest,
        reference: &ExternalReference,
    ) -> Result<(), BackendError> {
        check_issued(request, reference)
    }
}

/// Declines everything, like a user refusing a signing prompt.
struct Declining;

#[async_trait]
impl ConfirmationBackend for Declining {
    fn name(&self) -> &str {
        "declining"
    }

    async fn confirm(&self, _request: &ConfirmationRequest) -> Result<ExternalReference, BackendError> {
        Err(BackendError::ExplicitRejection("user denied transaction signature".into()))
    }

    async fn check(
        &self,
        _request: &ConfirmationRequest,
        _reference: &ExternalReference,
    ) -> Result<(), BackendError> {
        Err(BackendError::ExplicitRejection("nothing was ever signed".into()))
    }
}

struct FailingJournal;

#[async_trait]
impl LedgerJournal for FailingJournal {
    async fn record(&self, _event: &custody_core::CustodyEvent) -> Result<(), JournalError> {
        Err(JournalError("database offline".into()))
    }
}

fn coordinator_with(
    backend: Arc<dyn ConfirmationBackend>,
    timeout: Duration,
) -> SubmissionCoordinator {
    SubmissionCoordinator::new(
        Arc::new(LedgerStore::new()),
        backend,
        Arc::new(NoopJournal),
        CoordinatorConfig {
            confirm_timeout: timeout,
            ..CoordinatorConfig::default()
        },
    )
}

fn fresh_id() -> EvidenceId {
    EvidenceId::parse(&format!("0x{}", "aa".repeat(32))).unwrap()
}

fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

const T0: &str = "2025-10-20T10:12:34Z";

fn event(e: &EvidenceId, event_type: &str, at: &str) -> CandidateEvent {
    CandidateEvent::new(e.to_string(), event_type, "Officer_01", ts(at))
}

async fn wait_until_awaiting(handle: &SubmissionHandle) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !matches!(handle.state(), SubmissionState::AwaitingConfirmation { .. }) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("submission never reached AwaitingConfirmation");
}

#[tokio::test]
async fn intake_goes_from_pending_to_verified() {
    let backend = Arc::new(Gated::new(None));
    let c = coordinator_with(backend.clone(), Duration::from_secs(5));
    let e = fresh_id();

    let mut handle = c.submit(event(&e, "SUBMITTED", T0));
    wait_until_awaiting(&handle).await;
    assert_eq!(handle.snapshot().status, EventStatus::Pending);
    assert!(!c.store().exists(&e));

    backend.permits.add_permits(1);
    match handle.outcome().await {
        SubmissionState::Appended { sequence_index, .. } => assert_eq!(sequence_index, 0),
        other => panic!("expected Appended, got {other:?}"),
    }
    assert_eq!(handle.snapshot().status, EventStatus::Verified);

    let chain = c.store().get_chain(&e).unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.events()[0].status, EventStatus::Verified);
    assert_eq!(chain.events()[0].actor_id, "Officer_01");
}

#[tokio::test]
async fn earlier_second_event_is_rejected_immediately() {
    let c = coordinator_with(Arc::new(Instant), Duration::from_secs(5));
    let e = fresh_id();
    let mut intake = c.submit(event(&e, "SUBMITTED", T0));
    assert!(matches!(intake.outcome().await, SubmissionState::Appended { .. }));
    let before = c.store().get_chain(&e).unwrap();

    let handle = c.submit(event(&e, "RECEIVED_FOR_TESTING", "2025-10-20T10:12:33Z"));
    let state = handle.state();
    assert_eq!(state.name(), "REJECTED");
    assert_eq!(state.reason_code(), Some("TIMESTAMP_REGRESSION"));
    assert_eq!(*c.store().get_chain(&e).unwrap(), *before);
}

#[tokio::test]
async fn silent_backend_times_out_without_ledger_entry() {
    let e = fresh_id();
    let store = Arc::new(LedgerStore::new());

    let ok = SubmissionCoordinator::new(
        store.clone(),
        Arc::new(Instant),
        Arc::new(NoopJournal),
        CoordinatorConfig::default(),
    );
    assert!(matches!(
        ok.submit(event(&e, "SUBMITTED", T0)).outcome().await,
        SubmissionState::Appended { .. }
    ));

    let silent = SubmissionCoordinator::new(
        store.clone(),
        Arc::new(Silent),
        Arc::new(NoopJournal),
        CoordinatorConfig {
            confirm_timeout: Duration::from_millis(50),
            ..CoordinatorConfig::default()
        },
    );
    let mut handle = silent.submit(event(&e, "TRANSFERRED", "2025-10-25T09:22:01Z"));
    let state = handle.outcome().await;
    assert_eq!(state.name(), "CONFIRMATION_FAILED");
    assert_eq!(state.reason_code(), Some("BACKEND_TIMEOUT"));
    assert_eq!(handle.snapshot().status, EventStatus::Failed);
    assert_eq!(store.get_chain(&e).unwrap().len(), 1);
}

#[tokio::test]
async fn explicit_rejection_settles_as_rejected() {
    let c = coordinator_with(Arc::new(Declining), Duration::from_secs(5));
    let e = fresh_id();
    let mut handle = c.submit(event(&e, "SUBMITTED", T0));
    let state = handle.outcome().await;
    assert_eq!(state.reason_code(), Some("BACKEND_REJECTED"));
    assert_eq!(handle.snapshot().status, EventStatus::Rejected);
    assert!(!c.store().exists(&e));
}

#[tokio::test]
async fn rejected_middle_event_breaks_verification() {
    let store = Arc::new(LedgerStore::new());
    let c = SubmissionCoordinator::new(
        store.clone(),
        Arc::new(Instant),
        Arc::new(NoopJournal),
        CoordinatorConfig::default(),
    );
    let e = fresh_id();
    c.submit(event(&e, "SUBMITTED", T0)).outcome().await;

    // An event recorded while its confirmation was outstanding, then declined.
    store
        .append(
            &e,
            custody_engine::NewEvent {
                event_type: custody_core::EventType::ReceivedForTesting,
                timestamp: ts("2025-10-21T14:05:12Z"),
                actor_id: "Lab_07".into(),
                details: None,
                status: EventStatus::Pending,
                external_reference: None,
                expected_index: None,
            },
        )
        .unwrap();
    store.settle(&e, 1, EventStatus::Rejected, None).unwrap();

    c.submit(event(&e, "TRANSFERRED", "2025-10-25T09:22:01Z"))
        .outcome()
        .await;

    let result = VerificationEngine::new(store).verify_chain(&e).unwrap();
    assert_eq!(result.event_count, 3);
    assert_eq!(result.status, ChainStatus::Broken);
    assert_eq!(result.first_failing_index, Some(1));
}

#[tokio::test]
async fn replayed_confirmation_appends_once() {
    let c = coordinator_with(Arc::new(Instant), Duration::from_secs(5));
    let e = fresh_id();
    c.submit(event(&e, "SUBMITTED", T0)).outcome().await;

    let candidate = event(&e, "STORED", "2025-10-22T08:00:00Z");
    let forged = ExternalReference::new("0xfeedface").unwrap();
    let err = c
        .replay_confirmation(candidate.clone(), forged)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UNCONFIRMED_REFERENCE");
    assert_eq!(c.store().get_chain(&e).unwrap().len(), 1);

    let head = c.store().get_chain(&e).unwrap().head_digest();
    let body = EventBody {
        evidence_id: e.clone(),
        sequence_index: 1,
        event_type: EventType::Stored,
        timestamp: ts("2025-10-22T08:00:00Z"),
        actor_id: "Officer_01".into(),
        details: None,
        prev_digest: head,
    };
    let reference = issued(&body.digest().unwrap());
    let first = c
        .replay_confirmation(candidate.clone(), reference.clone())
        .await
        .unwrap();
    let second = c
        .replay_confirmation(candidate.clone(), reference.clone())
        .await
        .unwrap();
    assert!(first.newly_appended);
    assert!(!second.newly_appended);
    assert_eq!(first.sequence_index, second.sequence_index);
    assert_eq!(c.store().get_chain(&e).unwrap().len(), 2);

    let other = event(&e, "DISPOSED", "2025-10-23T08:00:00Z");
    let err = c.replay_confirmation(other, reference).await.unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_REFERENCE");
    assert_eq!(c.store().get_chain(&e).unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_submissions_never_share_an_index() {
    let c = coordinator_with(Arc::new(Instant), Duration::from_secs(5));
    let e = fresh_id();
    c.submit(event(&e, "SUBMITTED", T0)).outcome().await;

    let mut handles: Vec<SubmissionHandle> = (0..16)
        .map(|i| {
            c.submit(
                event(&e, "CHECKED_OUT", "2025-10-21T00:00:00Z")
                    .with_details(format!("request {i}")),
            )
        })
        .collect();

    let mut indices = HashSet::new();
    for handle in &mut handles {
        match handle.outcome().await {
            SubmissionState::Appended { sequence_index, .. } => {
                assert!(indices.insert(sequence_index), "index {sequence_index} reused");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(indices, (1..=16).collect::<HashSet<u64>>());

    let chain = c.store().get_chain(&e).unwrap();
    assert_eq!(chain.len(), 17);
}

#[tokio::test]
async fn different_identifiers_do_not_block_each_other() {
    let a = EvidenceId::from_content(b"held");
    let b = EvidenceId::from_content(b"free");
    let backend = Arc::new(Gated::new(Some(a.clone())));
    let c = coordinator_with(backend.clone(), Duration::from_secs(10));

    let mut held = c.submit(event(&a, "SUBMITTED", T0));
    wait_until_awaiting(&held).await;

    let mut free = c.submit(event(&b, "SUBMITTED", T0));
    let state = tokio::time::timeout(Duration::from_secs(2), free.outcome())
        .await
        .expect("submission for another identifier was blocked");
    assert!(matches!(state, SubmissionState::Appended { .. }));
    assert!(matches!(held.state(), SubmissionState::AwaitingConfirmation { .. }));

    backend.permits.add_permits(1);
    assert!(matches!(held.outcome().await, SubmissionState::Appended { .. }));
}

#[tokio::test]
async fn dropped_handle_still_appends() {
    let backend = Arc::new(Gated::new(None));
    let c = coordinator_with(backend.clone(), Duration::from_secs(5));
    let e = fresh_id();

    let handle = c.submit(event(&e, "SUBMITTED", T0));
    let id = handle.id();
    wait_until_awaiting(&handle).await;
    drop(handle);

    backend.permits.add_permits(1);
    let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = c.submission(id).unwrap();
            if snapshot.state.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("submission never settled");
    assert!(matches!(snapshot.state, SubmissionState::Appended { .. }));
    assert_eq!(snapshot.status, EventStatus::Verified);
    assert!(c.store().exists(&e));
}

#[tokio::test]
async fn journal_failure_does_not_fail_submission() {
    let c = SubmissionCoordinator::new(
        Arc::new(LedgerStore::new()),
        Arc::new(Instant),
        Arc::new(FailingJournal),
        CoordinatorConfig::default(),
    );
    let e = fresh_id();
    let state = c.submit(event(&e, "SUBMITTED", T0)).outcome().await;
    assert!(matches!(state, SubmissionState::Appended { .. }));
    assert!(c.store().exists(&e));
}

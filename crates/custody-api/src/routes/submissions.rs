//! # Submission Routes
//!
//! Polling of in-flight submissions and replay of backend confirmations
//! that arrived out of band.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use custody_core::{CandidateEvent, ExternalReference, Timestamp};
use custody_engine::{SubmissionHandle, SubmissionSnapshot, SubmissionState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::extract_json;
use crate::state::AppState;

/// Slack on top of the confirmation timeout before `?wait=true` gives up
/// and returns the in-flight snapshot.
const WAIT_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Where a submission stands.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmissionView {
    pub submission_id: Uuid,
    pub evidence_id: String,
    pub event_type: String,
    /// VALIDATING, AWAITING_CONFIRMATION, APPENDED, REJECTED,
    /// CONFIRMATION_FAILED, APPEND_CONFLICT or ABORTED.
    pub state: String,
    /// Status of the event this submission tried to record.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub submitted_at: String,
}

impl From<SubmissionSnapshot> for SubmissionView {
    fn from(snapshot: SubmissionSnapshot) -> Self {
        let (sequence_index, event_digest, external_reference) = match &snapshot.state {
            SubmissionState::AwaitingConfirmation {
                sequence_index,
                event_digest,
            } => (Some(*sequence_index), Some(event_digest.to_hex()), None),
            SubmissionState::Appended {
                sequence_index,
                external_reference,
                event_digest,
            } => (
                Some(*sequence_index),
                Some(event_digest.to_hex()),
                Some(external_reference.to_string()),
            ),
            SubmissionState::AppendConflict {
                external_reference, ..
            } => (None, None, Some(external_reference.to_string())),
            _ => (None, None, None),
        };
        Self {
            submission_id: snapshot.id,
            evidence_id: snapshot.evidence_id,
            event_type: snapshot.event_type,
            state: snapshot.state.name().to_string(),
            status: snapshot.status.as_str().to_string(),
            sequence_index,
            event_digest,
            external_reference,
            reason_code: snapshot.state.reason_code().map(str::to_string),
            message: snapshot.state.message(),
            submitted_at: snapshot.submitted_at.to_string(),
        }
    }
}

/// Turn a fresh submission into an HTTP response.
///
/// - rejected by the validator: 422 with the reason code
/// - `wait = false`: 202 with the current snapshot
/// - `wait = true`: 201 once appended, 200 for any other terminal outcome,
///   202 if the outcome is not known within the confirmation bound
pub(crate) async fn respond(
    state: &AppState,
    mut handle: SubmissionHandle,
    wait: bool,
) -> Result<(StatusCode, Json<SubmissionView>), AppError> {
    if let SubmissionState::Rejected { reason } = handle.state() {
        return Err(AppError::Rejected {
            code: reason.code(),
            message: reason.to_string(),
            details: Some(serde_json::json!({ "submission_id": handle.id() })),
        });
    }
    if !wait {
        return Ok((StatusCode::ACCEPTED, Json(handle.snapshot().into())));
    }

    let bound = state.coordinator.config().confirm_timeout + WAIT_GRACE;
    let status = match tokio::time::timeout(bound, handle.outcome()).await {
        Ok(SubmissionState::Appended { .. }) => StatusCode::CREATED,
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(handle.snapshot().into())))
}

/// A backend confirmation delivered out of band.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmationReplayRequest {
    pub evidence_id: String,
    pub event_type: String,
    pub actor_id: String,
    #[schema(value_type = String, example = "2025-10-20T10:12:34Z")]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub details: Option<String>,
    pub external_reference: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmationReplayResponse {
    pub evidence_id: String,
    pub sequence_index: u64,
    pub event_digest: String,
    /// False when the reference was already recorded.
    pub newly_appended: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/submissions/{submission_id}", get(get_submission))
        .route("/v1/confirmations", post(replay_confirmation))
}

/// GET /v1/submissions/{submission_id}
#[utoipa::path(
    get,
    path = "/v1/submissions/{submission_id}",
    params(("submission_id" = String, Path, description = "Submission UUID")),
    responses(
        (status = 200, description = "Current submission state", body = SubmissionView),
        (status = 400, description = "Not a UUID", body = ErrorBody),
        (status = 404, description = "Unknown submission", body = ErrorBody),
    ),
    tag = "submissions"
)]
pub async fn get_submission(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionView>, AppError> {
    let id = Uuid::parse_str(&submission_id)
        .map_err(|e| AppError::BadRequest(format!("invalid submission id: {e}")))?;
    let snapshot = state
        .coordinator
        .submission(id)
        .ok_or_else(|| AppError::NotFound {
            code: "SUBMISSION_NOT_FOUND",
            message: format!("submission {id} not found"),
        })?;
    Ok(Json(snapshot.into()))
}

/// POST /v1/confirmations
///
/// Idempotent on `(evidence_id, external_reference)`. A reference not yet on
/// the chain is appended only once the backend vouches for it.
#[utoipa::path(
    post,
    path = "/v1/confirmations",
    request_body = ConfirmationReplayRequest,
    responses(
        (status = 201, description = "Confirmation recorded", body = ConfirmationReplayResponse),
        (status = 200, description = "Reference already recorded", body = ConfirmationReplayResponse),
        (status = 409, description = "Conflicts with the current chain", body = ErrorBody),
        (status = 422, description = "Candidate failed validation or the reference is unconfirmed", body = ErrorBody),
        (status = 503, description = "Confirmation backend could not be asked", body = ErrorBody),
    ),
    tag = "submissions"
)]
pub async fn replay_confirmation(
    State(state): State<AppState>,
    body: Result<Json<ConfirmationReplayRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ConfirmationReplayResponse>), AppError> {
    let req = extract_json(body)?;
    let reference = ExternalReference::new(req.external_reference)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let evidence_id = req.evidence_id.clone();
    let candidate = CandidateEvent {
        evidence_id: req.evidence_id,
        event_type: req.event_type,
        actor_id: req.actor_id,
        timestamp: req.timestamp,
        details: req.details,
        sequence_index: None,
    };

    let receipt = state
        .coordinator
        .replay_confirmation(candidate, reference)
        .await?;
    let status = if receipt.newly_appended {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ConfirmationReplayResponse {
            evidence_id,
            sequence_index: receipt.sequence_index,
            event_digest: receipt.event_digest.to_hex(),
            newly_appended: receipt.newly_appended,
        }),
    ))
}

//! # Evidence Submission Routes
//!
//! Intake of new evidence and submission of custody events. Both routes go
//! through the submission coordinator; neither writes to the ledger
//! directly.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use custody_core::{CandidateEvent, EvidenceId, IntakeManifest, Timestamp, INTAKE_EVENT_TYPE};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_json, extract_validated_json, parse_evidence_id, Validate};
use crate::routes::submissions::{respond, SubmissionView};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct WaitQuery {
    /// Hold the response until the submission reaches a terminal state.
    #[serde(default)]
    pub wait: bool,
}

/// Intake: take evidence into custody.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntakeRequest {
    /// Case id, description, optional location, collection time and
    /// attachment digests. The evidence identifier is derived from it.
    #[schema(value_type = Object)]
    pub manifest: IntakeManifest,
    pub actor_id: String,
    /// Defaults to the time the request is received.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "2025-10-20T10:12:34Z")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub details: Option<String>,
}

impl Validate for IntakeRequest {
    fn validate(&self) -> Result<(), AppError> {
        self.manifest.check()?;
        Ok(())
    }
}

/// A custody event for an existing chain.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EventRequest {
    #[schema(example = "TRANSFERRED")]
    pub event_type: String,
    pub actor_id: String,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "2025-10-20T10:12:34Z")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub details: Option<String>,
    /// Normally omitted. When present it must be the next index.
    #[serde(default)]
    pub sequence_index: Option<u64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/evidence", post(submit_intake))
        .route("/v1/evidence/{evidence_id}/events", post(submit_event))
}

/// POST /v1/evidence
#[utoipa::path(
    post,
    path = "/v1/evidence",
    params(WaitQuery),
    request_body = IntakeRequest,
    responses(
        (status = 201, description = "Intake confirmed and appended", body = SubmissionView),
        (status = 202, description = "Intake accepted, confirmation in progress", body = SubmissionView),
        (status = 200, description = "Intake finished without being appended", body = SubmissionView),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 422, description = "Manifest or event rejected", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "evidence"
)]
pub async fn submit_intake(
    State(state): State<AppState>,
    Query(query): Query<WaitQuery>,
    body: Result<Json<IntakeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionView>), AppError> {
    let req = extract_validated_json(body)?;
    let evidence_id = EvidenceId::derive(&req.manifest)
        .map_err(|e| AppError::Internal(format!("manifest canonicalization failed: {e}")))?;

    let mut candidate = CandidateEvent::new(
        evidence_id.as_str(),
        INTAKE_EVENT_TYPE.as_str(),
        req.actor_id,
        req.timestamp.unwrap_or_else(Timestamp::now),
    );
    candidate.details = req.details;

    tracing::info!(evidence_id = %evidence_id, case_id = %req.manifest.case_id, "intake submitted");
    let handle = state.coordinator.submit(candidate);
    respond(&state, handle, query.wait).await
}

/// POST /v1/evidence/{evidence_id}/events
#[utoipa::path(
    post,
    path = "/v1/evidence/{evidence_id}/events",
    params(
        ("evidence_id" = String, Path, description = "Evidence identifier (0x + 64 hex)"),
        WaitQuery,
    ),
    request_body = EventRequest,
    responses(
        (status = 201, description = "Event confirmed and appended", body = SubmissionView),
        (status = 202, description = "Event accepted, confirmation in progress", body = SubmissionView),
        (status = 200, description = "Event finished without being appended", body = SubmissionView),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 422, description = "Event rejected by validation", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "evidence"
)]
pub async fn submit_event(
    State(state): State<AppState>,
    Path(evidence_id): Path<String>,
    Query(query): Query<WaitQuery>,
    body: Result<Json<EventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionView>), AppError> {
    let evidence_id = parse_evidence_id(&evidence_id)?;
    let req = extract_json(body)?;

    let candidate = CandidateEvent {
        evidence_id: evidence_id.to_string(),
        event_type: req.event_type,
        actor_id: req.actor_id,
        timestamp: req.timestamp.unwrap_or_else(Timestamp::now),
        details: req.details,
        sequence_index: req.sequence_index,
    };
    let handle = state.coordinator.submit(candidate);
    respond(&state, handle, query.wait).await
}

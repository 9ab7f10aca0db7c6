//! # Public Chain Retrieval & Verification
//!
//! Read-only routes for anyone holding an evidence identifier. No
//! credentials are required: verification reveals only what the chain
//! already commits to.
//!
//! A chain whose stored form fails its integrity check is a 500
//! `INTEGRITY_ERROR`; a chain with a rejected or failed event is a normal
//! 200 response with status `BROKEN`.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use custody_core::{CustodyEvent, EvidenceId};
use custody_engine::{ChainVerificationResult, EventVerificationResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody};
use crate::extractors::parse_evidence_id;
use crate::state::AppState;

/// A chain as recorded. Accepted by `custody verify` unchanged.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    #[schema(value_type = String)]
    pub evidence_id: EvidenceId,
    /// VERIFIED, PENDING or BROKEN.
    pub status: String,
    pub head_digest: String,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<CustodyEvent>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChainVerificationView {
    pub evidence_id: String,
    pub status: String,
    pub event_count: usize,
    pub first_non_verified_index: Option<u64>,
    pub first_failing_index: Option<u64>,
    pub head_digest: String,
    pub reason: String,
}

impl From<ChainVerificationResult> for ChainVerificationView {
    fn from(r: ChainVerificationResult) -> Self {
        Self {
            evidence_id: r.evidence_id.to_string(),
            status: r.status.as_str().to_string(),
            event_count: r.event_count,
            first_non_verified_index: r.first_non_verified_index,
            first_failing_index: r.first_failing_index,
            head_digest: r.head_digest.to_hex(),
            reason: r.reason,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventVerificationView {
    pub evidence_id: String,
    pub sequence_index: u64,
    pub event_type: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub event_digest: String,
    pub timestamp: String,
    pub actor_id: String,
    pub reason: String,
}

impl From<EventVerificationResult> for EventVerificationView {
    fn from(r: EventVerificationResult) -> Self {
        Self {
            evidence_id: r.evidence_id.to_string(),
            sequence_index: r.sequence_index,
            event_type: r.event_type.as_str().to_string(),
            status: r.status.as_str().to_string(),
            external_reference: r.external_reference.map(|x| x.to_string()),
            event_digest: r.event_digest.to_hex(),
            timestamp: r.timestamp.to_string(),
            actor_id: r.actor_id,
            reason: r.reason,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/evidence/{evidence_id}/chain", get(get_chain))
        .route("/v1/evidence/{evidence_id}/verification", get(verify_chain))
        .route(
            "/v1/evidence/{evidence_id}/events/{sequence_index}/verification",
            get(verify_event),
        )
}

/// GET /v1/evidence/{evidence_id}/chain
#[utoipa::path(
    get,
    path = "/v1/evidence/{evidence_id}/chain",
    params(("evidence_id" = String, Path, description = "Evidence identifier (0x + 64 hex)")),
    responses(
        (status = 200, description = "Recorded chain", body = ChainResponse),
        (status = 404, description = "No chain for this identifier", body = ErrorBody),
        (status = 422, description = "Malformed identifier", body = ErrorBody),
    ),
    tag = "verification"
)]
pub async fn get_chain(
    State(state): State<AppState>,
    Path(evidence_id): Path<String>,
) -> Result<Json<ChainResponse>, AppError> {
    let evidence_id = parse_evidence_id(&evidence_id)?;
    let chain = state
        .store
        .get_chain(&evidence_id)
        .ok_or_else(|| AppError::not_found(format!("evidence {evidence_id} not found")))?;
    let export = chain.to_export();
    Ok(Json(ChainResponse {
        evidence_id: export.evidence_id,
        status: chain.status().as_str().to_string(),
        head_digest: chain.head_digest().to_hex(),
        events: export.events,
    }))
}

/// GET /v1/evidence/{evidence_id}/verification
#[utoipa::path(
    get,
    path = "/v1/evidence/{evidence_id}/verification",
    params(("evidence_id" = String, Path, description = "Evidence identifier (0x + 64 hex)")),
    responses(
        (status = 200, description = "Chain verification result", body = ChainVerificationView),
        (status = 404, description = "No chain for this identifier", body = ErrorBody),
        (status = 422, description = "Malformed identifier", body = ErrorBody),
        (status = 500, description = "Stored chain failed its integrity check", body = ErrorBody),
    ),
    tag = "verification"
)]
pub async fn verify_chain(
    State(state): State<AppState>,
    Path(evidence_id): Path<String>,
) -> Result<Json<ChainVerificationView>, AppError> {
    let evidence_id = parse_evidence_id(&evidence_id)?;
    let result = state.verifier.verify_chain(&evidence_id)?;
    Ok(Json(result.into()))
}

/// GET /v1/evidence/{evidence_id}/events/{sequence_index}/verification
#[utoipa::path(
    get,
    path = "/v1/evidence/{evidence_id}/events/{sequence_index}/verification",
    params(
        ("evidence_id" = String, Path, description = "Evidence identifier (0x + 64 hex)"),
        ("sequence_index" = u64, Path, description = "Zero-based event index"),
    ),
    responses(
        (status = 200, description = "Event verification result", body = EventVerificationView),
        (status = 400, description = "Index is not a number", body = ErrorBody),
        (status = 404, description = "No such chain or event", body = ErrorBody),
        (status = 422, description = "Malformed identifier", body = ErrorBody),
    ),
    tag = "verification"
)]
pub async fn verify_event(
    State(state): State<AppState>,
    Path((evidence_id, sequence_index)): Path<(String, String)>,
) -> Result<Json<EventVerificationView>, AppError> {
    let evidence_id = parse_evidence_id(&evidence_id)?;
    let sequence_index: u64 = sequence_index
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid sequence index {sequence_index:?}")))?;
    let result = state.verifier.verify_event(&evidence_id, sequence_index)?;
    Ok(Json(result.into()))
}

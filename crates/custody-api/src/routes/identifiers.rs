//! # Identifier Routes
//!
//! Public helpers for clients that compute identifiers themselves: derive
//! one from an intake manifest, or check a string's format.

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Json, Router};
use custody_core::{validate_identifier, EvidenceId, IntakeManifest};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeriveRequest {
    #[schema(value_type = Object)]
    pub manifest: IntakeManifest,
}

impl Validate for DeriveRequest {
    fn validate(&self) -> Result<(), AppError> {
        self.manifest.check()?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeriveResponse {
    pub evidence_id: String,
    pub attachment_count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IdentifierCheck {
    pub value: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/identifiers/derive", post(derive_identifier))
        .route("/v1/identifiers/{value}", get(check_identifier))
}

/// POST /v1/identifiers/derive
#[utoipa::path(
    post,
    path = "/v1/identifiers/derive",
    request_body = DeriveRequest,
    responses(
        (status = 200, description = "Derived identifier", body = DeriveResponse),
        (status = 422, description = "Manifest outside intake limits", body = ErrorBody),
    ),
    tag = "identifiers"
)]
pub async fn derive_identifier(
    body: Result<Json<DeriveRequest>, JsonRejection>,
) -> Result<Json<DeriveResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let evidence_id = EvidenceId::derive(&req.manifest)
        .map_err(|e| AppError::Internal(format!("manifest canonicalization failed: {e}")))?;
    Ok(Json(DeriveResponse {
        evidence_id: evidence_id.to_string(),
        attachment_count: req.manifest.attachments.len(),
    }))
}

/// GET /v1/identifiers/{value}
#[utoipa::path(
    get,
    path = "/v1/identifiers/{value}",
    params(("value" = String, Path, description = "Candidate identifier")),
    responses(
        (status = 200, description = "Format check result", body = IdentifierCheck),
    ),
    tag = "identifiers"
)]
pub async fn check_identifier(Path(value): Path<String>) -> Json<IdentifierCheck> {
    let reason = if validate_identifier(&value) {
        None
    } else {
        EvidenceId::parse(&value).err().map(|e| e.to_string())
    };
    Json(IdentifierCheck {
        valid: reason.is_none(),
        value,
        reason,
    })
}

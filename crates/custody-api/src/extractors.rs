//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, a helper to extract and
//! validate JSON bodies in handlers, and identifier parsing for path
//! segments.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use custody_core::EvidenceId;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}

/// Parse an evidence identifier from a path segment.
///
/// A malformed identifier is a `MALFORMED_IDENTIFIER` rejection, not a 404:
/// the caller sent something that can never name a chain.
pub fn parse_evidence_id(raw: &str) -> Result<EvidenceId, AppError> {
    EvidenceId::parse(raw).map_err(|e| AppError::malformed_identifier(raw, e))
}

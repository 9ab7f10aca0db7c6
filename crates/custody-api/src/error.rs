//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps ledger and verification errors to HTTP status codes and carries the
//! stable reason code of the underlying error into the JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use custody_core::{IdentifierError, IntegrityError, ManifestError, ValidationError};
use custody_engine::{BackendError, LedgerError, ReplayError, VerifyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable reason code (e.g. "TIMESTAMP_REGRESSION").
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// 404.
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// The request was well-formed but a ledger rule refused it (422).
    #[error("{message}")]
    Rejected {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Request body or path could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid bearer token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict with the current ledger state (409).
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// A dependency such as the confirmation backend could not answer (503).
    #[error("{message}")]
    Unavailable { code: &'static str, message: String },

    /// A stored chain failed its integrity check (500, `INTEGRITY_ERROR`).
    /// Distinct from a chain that verifies as `BROKEN`.
    #[error("ledger integrity failure: {0}")]
    Integrity(IntegrityError),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound { code, .. } => (StatusCode::NOT_FOUND, code),
            Self::Rejected { code, .. } => (StatusCode::UNPROCESSABLE_ENTITY, code),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Conflict { code, .. } => (StatusCode::CONFLICT, code),
            Self::Unavailable { code, .. } => (StatusCode::SERVICE_UNAVAILABLE, code),
            Self::Integrity(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTEGRITY_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            code: "NOT_FOUND",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = match &self {
            Self::Internal(_) => ("An internal error occurred".to_string(), None),
            Self::Integrity(e) => {
                tracing::error!(code = e.code(), error = %e, "ledger integrity failure");
                (
                    "the stored chain failed its integrity check".to_string(),
                    Some(serde_json::json!({ "reason": e.code() })),
                )
            }
            Self::Rejected { details, .. } => (self.to_string(), details.clone()),
            other => (other.to_string(), None),
        };

        if let Self::Internal(msg) = &self {
            tracing::error!(error = %msg, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Rejected {
            code: err.code(),
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<ManifestError> for AppError {
    fn from(err: ManifestError) -> Self {
        Self::Rejected {
            code: err.code(),
            message: err.to_string(),
            details: None,
        }
    }
}

impl AppError {
    /// A path or body identifier that failed format validation.
    pub fn malformed_identifier(value: &str, err: IdentifierError) -> Self {
        ValidationError::MalformedIdentifier {
            value: value.to_string(),
            detail: err.to_string(),
        }
        .into()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(e) => e.into(),
            LedgerError::Integrity(e) => Self::Integrity(e),
            LedgerError::NotFound { .. }
            | LedgerError::EventNotFound { .. }
            | LedgerError::UnknownEvidence { .. } => Self::NotFound {
                code: err.code(),
                message: err.to_string(),
            },
            LedgerError::ConcurrentAppendConflict { .. }
            | LedgerError::HeadMoved { .. }
            | LedgerError::AlreadyExists { .. }
            | LedgerError::DuplicateReference { .. }
            | LedgerError::Status(_) => Self::Conflict {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

impl From<ReplayError> for AppError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Ledger(e) => e.into(),
            ReplayError::Unconfirmed {
                error: BackendError::ExplicitRejection(_),
                ..
            } => Self::Rejected {
                code: err.code(),
                message: err.to_string(),
                details: None,
            },
            ReplayError::Unconfirmed { .. } => Self::Unavailable {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Integrity(e) => Self::Integrity(e),
            VerifyError::NotFound { .. } | VerifyError::EventNotFound { .. } => Self::NotFound {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

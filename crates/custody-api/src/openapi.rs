//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served unauthenticated at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme referenced by submission routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Bearer token for submitters. Set via the AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Custody Ledger API",
        version = "0.1.0",
        description = "Append-only chain of custody for digital evidence.\n\nSubmitters record intake and custody events under a bearer token; every event is confirmed by an external attestation backend before it enters the ledger. Chain retrieval and verification are public: anyone holding an evidence identifier can check its chain."
    ),
    paths(
        // ── Submission (authenticated) ──────────────────────────────────
        crate::routes::evidence::submit_intake,
        crate::routes::evidence::submit_event,
        crate::routes::submissions::get_submission,
        crate::routes::submissions::replay_confirmation,
        // ── Verification (public) ───────────────────────────────────────
        crate::routes::verification::get_chain,
        crate::routes::verification::verify_chain,
        crate::routes::verification::verify_event,
        crate::routes::identifiers::derive_identifier,
        crate::routes::identifiers::check_identifier,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::evidence::IntakeRequest,
            crate::routes::evidence::EventRequest,
            crate::routes::submissions::SubmissionView,
            crate::routes::submissions::ConfirmationReplayRequest,
            crate::routes::submissions::ConfirmationReplayResponse,
            crate::routes::verification::ChainResponse,
            crate::routes::verification::ChainVerificationView,
            crate::routes::verification::EventVerificationView,
            crate::routes::identifiers::DeriveRequest,
            crate::routes::identifiers::DeriveResponse,
            crate::routes::identifiers::IdentifierCheck,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "evidence", description = "Intake and custody event submission"),
        (name = "submissions", description = "Submission polling and confirmation replay"),
        (name = "verification", description = "Public chain retrieval and verification"),
        (name = "identifiers", description = "Evidence identifier derivation and format checks"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Custody Ledger API");
        assert!(!spec.paths.paths.is_empty());
    }

    #[test]
    fn spec_has_submission_and_verification_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/v1/evidence",
            "/v1/evidence/{evidence_id}/events",
            "/v1/submissions/{submission_id}",
            "/v1/confirmations",
            "/v1/evidence/{evidence_id}/chain",
            "/v1/evidence/{evidence_id}/verification",
            "/v1/evidence/{evidence_id}/events/{sequence_index}/verification",
            "/v1/identifiers/derive",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn spec_declares_bearer_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}

//! HTTP client for an external attestation service.
//!
//! ## Protocol
//!
//! `POST {base_url}/v1/attestations` with the [`ConfirmationRequest`] as JSON
//! and a bearer token.
//!
//! | Response | Outcome |
//! |----------|---------|
//! | 2xx `{"reference": "..."}` | confirmed |
//! | 2xx `{"rejected": true, "reason": "..."}` | explicit rejection |
//! | 409, 422 | explicit rejection |
//! | other status, transport error | unavailable |
//! | no response within the timeout | timeout |
//!
//! A replayed confirmation is checked with `GET {base_url}/v1/attestations/{reference}`,
//! which answers `{"event_digest": "<hex>"}` for a reference it issued. An
//! unknown reference (404) or a digest other than the request's is an
//! explicit rejection.
//!
//! Requests are never retried.

use std::time::Duration;

use async_trait::async_trait;
use custody_core::{ContentDigest, ExternalReference};
use custody_engine::{BackendError, ConfirmationBackend, ConfirmationRequest};
use serde::Deserialize;

use crate::config::{BackendConfig, ConfigError};

#[derive(Debug, Default, Deserialize)]
struct AttestationResponse {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    rejected: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttestationRecord {
    event_digest: ContentDigest,
}

/// Confirms events against a remote attestation service.
#[derive(Debug, Clone)]
pub struct HttpConfirmationBackend {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpConfirmationBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                let mut value = reqwest::header::HeaderValue::from_str(&format!(
                    "Bearer {}",
                    config.api_token.as_str()
                ))
                .map_err(|_| ConfigError::MissingToken)?;
                value.set_sensitive(true);
                headers.insert(reqwest::header::AUTHORIZATION, value);
                headers
            })
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            http,
            url: config.attestations_url(),
            timeout,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }

    fn reference_url(&self, reference: &ExternalReference) -> Result<reqwest::Url, BackendError> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| BackendError::Unavailable(format!("invalid attestation url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Unavailable("attestation url cannot take a path".into()))?
            .push(reference.as_str());
        Ok(url)
    }
}

#[async_trait]
impl ConfirmationBackend for HttpConfirmationBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn confirm(
        &self,
        request: &ConfirmationRequest,
    ) -> Result<ExternalReference, BackendError> {
        let resp = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::CONFLICT
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::ExplicitRejection(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(
                evidence_id = %request.evidence_id,
                status = status.as_u16(),
                "attestation service returned an error"
            );
            return Err(BackendError::Unavailable(format!("{status}: {body}")));
        }

        let parsed: AttestationResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout)
            } else {
                BackendError::Unavailable(format!("unreadable attestation response: {e}"))
            }
        })?;

        if parsed.rejected {
            return Err(BackendError::ExplicitRejection(
                parsed.reason.unwrap_or_else(|| "rejected".into()),
            ));
        }
        let reference = parsed.reference.ok_or_else(|| {
            BackendError::Unavailable("attestation response carried no reference".into())
        })?;
        ExternalReference::new(reference)
            .map_err(|e| BackendError::Unavailable(format!("invalid reference: {e}")))
    }

    async fn check(
        &self,
        request: &ConfirmationRequest,
        reference: &ExternalReference,
    ) -> Result<(), BackendError> {
        let resp = self
            .http
            .get(self.reference_url(reference)?)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::ExplicitRejection(format!(
                "attestation service does not know {reference}"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!("{status}: {body}")));
        }

        let record: AttestationRecord = resp.json().await.map_err(|e| {
            BackendError::Unavailable(format!("unreadable attestation record: {e}"))
        })?;
        if record.event_digest != request.event_digest {
            tracing::warn!(
                evidence_id = %request.evidence_id,
                sequence_index = request.sequence_index,
                external_reference = %reference,
                "reference attests a different event"
            );
            return Err(BackendError::ExplicitRejection(format!(
                "{reference} attests event {}, not {}",
                record.event_digest, request.event_digest
            )));
        }
        Ok(())
    }
}

//! Backend configuration.

use url::Url;
use zeroize::Zeroizing;

/// Default bound on one attestation request, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the HTTP attestation service.
///
/// `Debug` redacts the token.
#[derive(Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub api_token: Zeroizing<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl BackendConfig {
    /// Load configuration from environment variables.
    ///
    /// - `CUSTODY_BACKEND_URL` (required)
    /// - `CUSTODY_BACKEND_TOKEN` (required)
    /// - `CUSTODY_BACKEND_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("CUSTODY_BACKEND_URL").map_err(|_| ConfigError::MissingUrl)?;
        let base_url = Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidUrl("CUSTODY_BACKEND_URL".into(), e.to_string()))?;
        let api_token =
            std::env::var("CUSTODY_BACKEND_TOKEN").map_err(|_| ConfigError::MissingToken)?;

        Ok(Self {
            base_url,
            api_token: Zeroizing::new(api_token),
            timeout_secs: std::env::var("CUSTODY_BACKEND_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Point at a local mock server.
    pub fn local(uri: &str, token: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: Url::parse(uri)
                .map_err(|e| ConfigError::InvalidUrl(uri.to_string(), e.to_string()))?,
            api_token: Zeroizing::new(token.to_string()),
            timeout_secs: 5,
        })
    }

    /// `{base_url}/v1/attestations`, tolerating a trailing slash on the base.
    pub fn attestations_url(&self) -> String {
        format!("{}/v1/attestations", self.base_url.as_str().trim_end_matches('/'))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CUSTODY_BACKEND_URL environment variable is required")]
    MissingUrl,
    #[error("CUSTODY_BACKEND_TOKEN environment variable is required")]
    MissingToken,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("attestor seed must be 64 hex characters: {0}")]
    InvalidSeed(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let cfg = BackendConfig::local("http://127.0.0.1:9000", "s3cret").unwrap();
        let rendered = format!("{cfg:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn attestations_url_ignores_trailing_slash() {
        let a = BackendConfig::local("http://127.0.0.1:9000", "t").unwrap();
        let b = BackendConfig::local("http://127.0.0.1:9000/attest/", "t").unwrap();
        assert_eq!(a.attestations_url(), "http://127.0.0.1:9000/v1/attestations");
        assert_eq!(b.attestations_url(), "http://127.0.0.1:9000/attest/v1/attestations");
    }

    #[test]
    fn local_rejects_bad_url() {
        assert!(matches!(
            BackendConfig::local("not a url", "t"),
            Err(ConfigError::InvalidUrl(..))
        ));
    }
}

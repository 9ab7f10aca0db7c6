//! # Local Ed25519 Attestor
//!
//! Confirms events by signing their digest with a key held in-process.
//! The reference is `ed25519:<signature hex>`, so anyone holding the public
//! key can check that a recorded event was attested without asking a
//! remote service.
//!
//! The signing key is never serialized or logged.

use async_trait::async_trait;
use custody_core::{ContentDigest, ExternalReference};
use custody_engine::{BackendError, ConfirmationBackend, ConfirmationRequest};
use ed25519_dalek::{Signer, Verifier};
use zeroize::Zeroizing;

use crate::config::ConfigError;

/// Prefix of every reference the attestor issues.
pub const REFERENCE_PREFIX: &str = "ed25519:";

/// Domain tag prepended to the digest before signing.
const SIGNING_DOMAIN: &[u8] = b"custody.attestation.v1:";

pub struct LocalAttestor {
    signing_key: ed25519_dalek::SigningKey,
}

impl std::fmt::Debug for LocalAttestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAttestor")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

impl LocalAttestor {
    /// Fresh random key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Parse a 64-character hex seed, as read from `CUSTODY_ATTESTOR_SEED`.
    pub fn from_hex_seed(hex: &str) -> Result<Self, ConfigError> {
        let hex = hex.trim();
        if hex.len() != 64 {
            return Err(ConfigError::InvalidSeed(format!("got {} characters", hex.len())));
        }
        let mut seed = Zeroizing::new([0u8; 32]);
        decode_hex(hex, &mut seed[..]).map_err(ConfigError::InvalidSeed)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        encode_hex(&self.public_key())
    }

    /// Sign an event digest and render the reference.
    pub fn attest(&self, digest: &ContentDigest) -> Result<ExternalReference, BackendError> {
        let signature = self.signing_key.sign(&signing_input(digest));
        ExternalReference::new(format!(
            "{REFERENCE_PREFIX}{}",
            encode_hex(&signature.to_bytes())
        ))
        .map_err(|e| BackendError::Unavailable(e.to_string()))
    }

    /// Whether `reference` is this attestor's signature over `digest`.
    pub fn verify_reference(&self, digest: &ContentDigest, reference: &ExternalReference) -> bool {
        verify_attestation(&self.public_key(), digest, reference)
    }
}

/// Check a reference against a public key without holding the signing key.
pub fn verify_attestation(
    public_key: &[u8; 32],
    digest: &ContentDigest,
    reference: &ExternalReference,
) -> bool {
    let Some(sig_hex) = reference.as_str().strip_prefix(REFERENCE_PREFIX) else {
        return false;
    };
    if sig_hex.len() != 128 {
        return false;
    }
    let mut sig = [0u8; 64];
    if decode_hex(sig_hex, &mut sig).is_err() {
        return false;
    }
    let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    key.verify(&signing_input(digest), &ed25519_dalek::Signature::from_bytes(&sig))
        .is_ok()
}

#[async_trait]
impl ConfirmationBackend for LocalAttestor {
    fn name(&self) -> &str {
        "local-ed25519"
    }

    async fn confirm(
        &self,
        request: &ConfirmationRequest,
    ) -> Result<ExternalReference, BackendError> {
        let reference = self.attest(&request.event_digest)?;
        tracing::debug!(
            evidence_id = %request.evidence_id,
            sequence_index = request.sequence_index,
            "event attested locally"
        );
        Ok(reference)
    }

    async fn check(
        &self,
        request: &ConfirmationRequest,
        reference: &ExternalReference,
    ) -> Result<(), BackendError> {
        if self.verify_reference(&request.event_digest, reference) {
            Ok(())
        } else {
            Err(BackendError::ExplicitRejection(format!(
                "{reference} is not this attestor's signature over event #{}",
                request.sequence_index
            )))
        }
    }
}

fn signing_input(digest: &ContentDigest) -> Vec<u8> {
    let mut input = Vec::with_capacity(SIGNING_DOMAIN.len() + 32);
    input.extend_from_slice(SIGNING_DOMAIN);
    input.extend_from_slice(digest.as_bytes());
    input
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(hex: &str, out: &mut [u8]) -> Result<(), String> {
    if hex.len() != out.len() * 2 || !hex.is_ascii() {
        return Err(format!("expected {} hex characters", out.len() * 2));
    }
    for (i, slot) in out.iter_mut().enumerate() {
        let pair = &hex[i * 2..i * 2 + 2];
        if !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("invalid hex at position {}", i * 2));
        }
        *slot = u8::from_str_radix(pair, 16).map_err(|e| e.to_string())?;
    }
    Ok(())
}

//! # Offline Verification
//!
//! Verifies a chain exported from the gateway (`GET /v1/evidence/{id}/chain`)
//! without access to the ledger. Every digest and hash link is recomputed.
//!
//! Exit codes: 0 `VERIFIED`, 2 `PENDING`, 3 `BROKEN`. A chain that fails its
//! integrity check is an error (exit 1).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use custody_backend::verify_attestation;
use custody_core::{ChainExport, ChainStatus, ContentDigest, EventStatus};
use custody_engine::{
    describe_exported, verify_exported, ChainVerificationResult, EventVerificationResult,
    VerifyError,
};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Exported chain (JSON).
    pub chain: PathBuf,

    /// Also list every event.
    #[arg(long)]
    pub events: bool,

    /// Check `ed25519:` references against this attestor public key (hex).
    #[arg(long)]
    pub attestor_key: Option<String>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Outcome of verifying an exported chain.
#[derive(Debug)]
pub struct ChainReport {
    pub result: ChainVerificationResult,
    pub events: Vec<EventVerificationResult>,
    /// Indices whose reference does not verify against the attestor key.
    pub unattested: Vec<u64>,
}

impl ChainReport {
    pub fn exit_code(&self) -> u8 {
        if !self.unattested.is_empty() {
            return 3;
        }
        match self.result.status {
            ChainStatus::Verified => 0,
            ChainStatus::Pending => 2,
            ChainStatus::Broken => 3,
        }
    }
}

pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    let report = verify_file(&args.chain, args.attestor_key.as_deref())?;

    if args.json {
        let out = serde_json::json!({
            "result": report.result,
            "events": report.events,
            "unattested": report.unattested,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(report.exit_code());
    }

    let r = &report.result;
    println!("evidence: {}", r.evidence_id);
    println!("status:   {}", r.status);
    println!("events:   {}", r.event_count);
    println!("head:     {}", r.head_digest);
    println!("reason:   {}", r.reason);
    if args.events {
        println!();
        for e in &report.events {
            println!(
                "  #{:<3} {:<22} {:<9} {} {}",
                e.sequence_index,
                e.event_type.as_str(),
                e.status.as_str(),
                e.timestamp,
                e.actor_id
            );
        }
    }
    for index in &report.unattested {
        println!("event #{index}: reference is not signed by the given attestor");
    }
    Ok(report.exit_code())
}

/// Load and verify an exported chain file.
pub fn verify_file(path: &Path, attestor_key: Option<&str>) -> Result<ChainReport> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let export: ChainExport = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not an exported custody chain", path.display()))?;

    let result = verify_exported(export.clone()).map_err(integrity_failure)?;
    let events = describe_exported(export).map_err(integrity_failure)?;

    let unattested = match attestor_key {
        Some(hex) => unattested_events(&events, hex)?,
        None => Vec::new(),
    };

    Ok(ChainReport {
        result,
        events,
        unattested,
    })
}

/// Report the precise integrity reason rather than the umbrella code.
fn integrity_failure(err: VerifyError) -> anyhow::Error {
    let code = match &err {
        VerifyError::Integrity(reason) => reason.code(),
        other => other.code(),
    };
    tracing::error!(code, "chain failed integrity check");
    anyhow::anyhow!("{code}: {err}")
}

/// Verified events whose reference is not the attestor's signature over
/// the event digest.
fn unattested_events(events: &[EventVerificationResult], key_hex: &str) -> Result<Vec<u64>> {
    let Some(key) = ContentDigest::from_hex(key_hex) else {
        bail!("attestor key must be 64 hex characters");
    };
    Ok(events
        .iter()
        .filter(|e| e.status == EventStatus::Verified)
        .filter(|e| {
            e.external_reference
                .as_ref()
                .is_some_and(|r| !verify_attestation(key.as_bytes(), &e.event_digest, r))
        })
        .map(|e| e.sequence_index)
        .collect())
}

//! Custody event persistence.
//!
//! All functions take a `&PgPool` and operate on the `custody_events` table.
//! Writes are single-row inserts keyed by `(evidence_id, sequence_index)`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custody_core::{
    ContentDigest, CustodyChain, CustodyEvent, EventStatus, EventType, EvidenceId,
    ExternalReference, Timestamp,
};
use custody_engine::{JournalError, LedgerJournal};
use sqlx::PgPool;

/// Insert one recorded event. Re-inserting the same event is a no-op.
pub async fn insert(pool: &PgPool, event: &CustodyEvent) -> Result<(), sqlx::Error> {
    let sequence_index = i64::try_from(event.sequence_index)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    sqlx::query(
        "INSERT INTO custody_events (evidence_id, sequence_index, event_type, occurred_at,
         actor_id, details, status, external_reference, prev_digest, event_digest)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (evidence_id, sequence_index) DO NOTHING",
    )
    .bind(event.evidence_id.as_str())
    .bind(sequence_index)
    .bind(event.event_type.as_str())
    .bind(*event.timestamp.as_datetime())
    .bind(&event.actor_id)
    .bind(&event.details)
    .bind(event.status.as_str())
    .bind(event.external_reference.as_ref().map(|r| r.as_str()))
    .bind(event.prev_digest.to_hex())
    .bind(event.event_digest.to_hex())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load every recorded event, ordered by identifier then index.
pub async fn load_all(pool: &PgPool) -> Result<Vec<EventRow>, sqlx::Error> {
    sqlx::query_as::<_, EventRow>(
        "SELECT evidence_id, sequence_index, event_type, occurred_at, actor_id,
         details, status, external_reference, prev_digest, event_digest
         FROM custody_events ORDER BY evidence_id, sequence_index",
    )
    .fetch_all(pool)
    .await
}

/// Rebuild chains from rows. Each chain is integrity-checked as it is built.
pub fn assemble_chains(rows: Vec<EventRow>) -> Result<Vec<CustodyChain>, String> {
    let mut grouped: BTreeMap<String, Vec<CustodyEvent>> = BTreeMap::new();
    for row in rows {
        let key = row.evidence_id.clone();
        grouped.entry(key).or_default().push(row.into_event()?);
    }
    grouped
        .into_iter()
        .map(|(raw, mut events)| {
            events.sort_by_key(|e| e.sequence_index);
            let evidence_id =
                EvidenceId::parse(&raw).map_err(|e| format!("stored identifier {raw}: {e}"))?;
            CustodyChain::from_events(evidence_id, events)
                .map_err(|e| format!("stored chain {raw} failed integrity check: {e}"))
        })
        .collect()
}

fn parse_status(s: &str) -> Result<EventStatus, String> {
    match s {
        "PENDING" => Ok(EventStatus::Pending),
        "VERIFIED" => Ok(EventStatus::Verified),
        "REJECTED" => Ok(EventStatus::Rejected),
        "FAILED" => Ok(EventStatus::Failed),
        other => Err(format!("unknown stored status {other}")),
    }
}

fn parse_digest(field: &str, hex: &str) -> Result<ContentDigest, String> {
    ContentDigest::from_hex(hex.trim()).ok_or_else(|| format!("malformed {field}: {hex}"))
}

/// Row type for SQLx mapping.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub evidence_id: String,
    pub sequence_index: i64,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: String,
    pub details: Option<String>,
    pub status: String,
    pub external_reference: Option<String>,
    pub prev_digest: String,
    pub event_digest: String,
}

impl EventRow {
    pub fn from_event(event: &CustodyEvent) -> Self {
        Self {
            evidence_id: event.evidence_id.to_string(),
            sequence_index: event.sequence_index as i64,
            event_type: event.event_type.as_str().to_string(),
            occurred_at: *event.timestamp.as_datetime(),
            actor_id: event.actor_id.clone(),
            details: event.details.clone(),
            status: event.status.as_str().to_string(),
            external_reference: event.external_reference.as_ref().map(|r| r.to_string()),
            prev_digest: event.prev_digest.to_hex(),
            event_digest: event.event_digest.to_hex(),
        }
    }

    pub fn into_event(self) -> Result<CustodyEvent, String> {
        let evidence_id = EvidenceId::parse(&self.evidence_id)
            .map_err(|e| format!("stored identifier {}: {e}", self.evidence_id))?;
        let sequence_index = u64::try_from(self.sequence_index)
            .map_err(|_| format!("negative sequence index {}", self.sequence_index))?;
        let event_type: EventType = self.event_type.parse()?;
        let external_reference = self
            .external_reference
            .map(ExternalReference::new)
            .transpose()
            .map_err(|e| e.to_string())?;

        Ok(CustodyEvent {
            sequence_index,
            evidence_id,
            event_type,
            timestamp: Timestamp::from_utc(self.occurred_at),
            actor_id: self.actor_id,
            details: self.details,
            status: parse_status(&self.status)?,
            external_reference,
            prev_digest: parse_digest("prev_digest", &self.prev_digest)?,
            event_digest: parse_digest("event_digest", &self.event_digest)?,
        })
    }
}

/// Journals appended events into Postgres.
#[derive(Debug, Clone)]
pub struct PgJournal {
    pool: PgPool,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerJournal for PgJournal {
    async fn record(&self, event: &CustodyEvent) -> Result<(), JournalError> {
        insert(&self.pool, event)
            .await
            .map_err(|e| JournalError(e.to_string()))
    }
}

//! # Evidence Identifiers
//!
//! An evidence identifier is the version tag `0x` followed by exactly 64
//! lowercase hex characters: a SHA-256 digest. It is the primary key of
//! every ledger lookup and is assigned once, at intake.
//!
//! Two derivations exist:
//!
//! - [`EvidenceId::from_content`] hashes the raw bytes of a single evidence
//!   file.
//! - [`EvidenceId::derive`] hashes the canonical form of an
//!   [`IntakeManifest`]: the case, its description, where and when the item
//!   was collected, and the digests of every attached file. Attachment order
//!   does not matter.
//!
//! Manifest digests are computed over a wrapper carrying the domain tag
//! `custody.evidence.v1`, so a manifest identifier can never equal the
//! digest of some other structure in the system.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::canonical::CanonicalBytes;
use crate::digest::{sha256_digest, sha256_raw, ContentDigest};
use crate::error::{CanonicalizationError, IdentifierError, ManifestError};
use crate::temporal::Timestamp;

/// Version tag prefixed to every identifier.
pub const VERSION_TAG: &str = "0x";

/// Number of hex characters after the version tag.
pub const HEX_LEN: usize = 64;

const MANIFEST_DOMAIN: &str = "custody.evidence.v1";

/// Maximum number of files attached to a single intake.
pub const MAX_ATTACHMENTS: usize = 10;

/// Maximum size of a single attached file (200 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 200 * 1024 * 1024;

/// Check identifier format only: prefix, length, charset.
///
/// Existence in the ledger is not checked.
pub fn validate_identifier(value: &str) -> bool {
    check_format(value).is_ok()
}

fn check_format(value: &str) -> Result<(), IdentifierError> {
    let hex = value
        .strip_prefix(VERSION_TAG)
        .ok_or(IdentifierError::MissingVersionTag)?;
    if let Some((position, found)) = hex
        .chars()
        .enumerate()
        .find(|(_, c)| !matches!(c, '0'..='9' | 'a'..='f'))
    {
        return Err(IdentifierError::InvalidCharacter {
            position: position + VERSION_TAG.len(),
            found,
        });
    }
    if hex.len() != HEX_LEN {
        return Err(IdentifierError::WrongLength {
            expected: HEX_LEN,
            actual: hex.len(),
        });
    }
    Ok(())
}

/// A well-formed evidence identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvidenceId(String);

impl EvidenceId {
    /// Parse and format-check an identifier string.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        check_format(value)?;
        Ok(Self(value.to_string()))
    }

    /// Identifier naming the given digest.
    pub fn from_digest(digest: &ContentDigest) -> Self {
        Self(format!("{VERSION_TAG}{}", digest.to_hex()))
    }

    /// Identifier for a single evidence file.
    pub fn from_content(bytes: &[u8]) -> Self {
        Self::from_digest(&sha256_raw(bytes))
    }

    /// Identifier for an intake manifest.
    ///
    /// # Errors
    ///
    /// Only if the manifest cannot be canonicalized, which a manifest built
    /// from this crate's types never triggers.
    pub fn derive(manifest: &IntakeManifest) -> Result<Self, CanonicalizationError> {
        let mut attachments: Vec<&AttachmentDigest> = manifest.attachments.iter().collect();
        attachments.sort_by(|a, b| {
            (a.sha256, &a.file_name, &a.media_type, a.size_bytes)
                .cmp(&(b.sha256, &b.file_name, &b.media_type, b.size_bytes))
        });
        let preimage = ManifestPreimage {
            domain: MANIFEST_DOMAIN,
            case_id: &manifest.case_id,
            description: &manifest.description,
            location: manifest.location.as_deref(),
            collected_at: manifest.collected_at,
            attachments,
        };
        let canonical = CanonicalBytes::new(&preimage)?;
        Ok(Self::from_digest(&sha256_digest(&canonical)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The digest this identifier names.
    pub fn digest(&self) -> ContentDigest {
        // Format was checked at construction.
        ContentDigest::from_hex(&self.0[VERSION_TAG.len()..]).unwrap_or(ContentDigest::ZERO)
    }
}

impl std::fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EvidenceId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EvidenceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for EvidenceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EvidenceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Digest and metadata of one file attached at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDigest {
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub sha256: ContentDigest,
}

impl AttachmentDigest {
    /// Hash file content and record its metadata.
    pub fn of(file_name: impl Into<String>, media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            size_bytes: bytes.len() as u64,
            sha256: sha256_raw(bytes),
        }
    }
}

/// What an officer records when evidence is taken into custody.
///
/// `location` is free text (typically `"lat,lon"`); coordinates are kept as
/// text so the manifest stays float-free for canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeManifest {
    pub case_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub collected_at: Timestamp,
    #[serde(default)]
    pub attachments: Vec<AttachmentDigest>,
}

impl IntakeManifest {
    /// Intake form limits: a case id and a description, one to ten files,
    /// each at most 200 MiB and an image, video, or PDF.
    pub fn check(&self) -> Result<(), ManifestError> {
        if self.case_id.trim().is_empty() {
            return Err(ManifestError::MissingCaseId);
        }
        if self.description.trim().is_empty() {
            return Err(ManifestError::MissingDescription);
        }
        if self.attachments.is_empty() {
            return Err(ManifestError::NoAttachments);
        }
        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(ManifestError::TooManyAttachments {
                max: MAX_ATTACHMENTS,
                actual: self.attachments.len(),
            });
        }
        for attachment in &self.attachments {
            if attachment.size_bytes > MAX_ATTACHMENT_BYTES {
                return Err(ManifestError::AttachmentTooLarge {
                    file_name: attachment.file_name.clone(),
                    size_bytes: attachment.size_bytes,
                });
            }
            if !accepted_media_type(&attachment.media_type) {
                return Err(ManifestError::UnsupportedMediaType {
                    file_name: attachment.file_name.clone(),
                    media_type: attachment.media_type.clone(),
                });
            }
        }
        Ok(())
    }
}

fn accepted_media_type(media_type: &str) -> bool {
    media_type.starts_with("image/")
        || media_type.starts_with("video/")
        || media_type == "application/pdf"
}

#[derive(Serialize)]
struct ManifestPreimage<'a> {
    domain: &'static str,
    case_id: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    collected_at: Timestamp,
    attachments: Vec<&'a AttachmentDigest>,
}

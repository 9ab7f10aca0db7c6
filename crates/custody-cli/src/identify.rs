//! # Identifier Subcommands
//!
//! ```bash
//! # Identifier for an intake manifest (same as the gateway derives):
//! custody id derive manifest.json
//!
//! # Attachment entry for a manifest, from the file on disk:
//! custody id attachment photo.jpg --media-type image/jpeg
//!
//! # Identifier of a single evidence file:
//! custody id file photo.jpg
//!
//! # Format check; exit code 0 when well-formed, 1 otherwise:
//! custody id check 0x9f86...
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use custody_core::{AttachmentDigest, EvidenceId, IntakeManifest};

#[derive(Args, Debug)]
pub struct IdArgs {
    #[command(subcommand)]
    pub command: IdCommand,
}

#[derive(Subcommand, Debug)]
pub enum IdCommand {
    /// Derive the identifier of an intake manifest (JSON file).
    Derive {
        manifest: PathBuf,
    },

    /// Identifier of a single evidence file's raw bytes.
    File {
        path: PathBuf,
    },

    /// Print the manifest attachment entry for a file.
    Attachment {
        path: PathBuf,

        /// MIME type recorded in the entry (image/*, video/* or application/pdf).
        #[arg(long)]
        media_type: String,
    },

    /// Check an identifier's format.
    Check {
        value: String,
    },
}

pub fn run_id(args: &IdArgs) -> Result<u8> {
    match &args.command {
        IdCommand::Derive { manifest } => {
            let id = derive_from_file(manifest)?;
            println!("{id}");
            Ok(0)
        }
        IdCommand::File { path } => {
            let bytes = read(path)?;
            println!("{}", EvidenceId::from_content(&bytes));
            Ok(0)
        }
        IdCommand::Attachment { path, media_type } => {
            let entry = attachment_for(path, media_type)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(0)
        }
        IdCommand::Check { value } => match EvidenceId::parse(value) {
            Ok(_) => {
                println!("valid");
                Ok(0)
            }
            Err(e) => {
                println!("invalid: {e}");
                Ok(1)
            }
        },
    }
}

/// Read a manifest file, check it against the intake limits and derive
/// its identifier.
pub fn derive_from_file(path: &Path) -> Result<EvidenceId> {
    let bytes = read(path)?;
    let manifest: IntakeManifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not an intake manifest", path.display()))?;
    manifest
        .check()
        .with_context(|| format!("{} is outside the intake limits", path.display()))?;
    tracing::debug!(case_id = %manifest.case_id, attachments = manifest.attachments.len(), "deriving identifier");
    EvidenceId::derive(&manifest).context("manifest could not be canonicalized")
}

/// Attachment entry for a file. The file name recorded is the final path
/// component.
pub fn attachment_for(path: &Path, media_type: &str) -> Result<AttachmentDigest> {
    let bytes = read(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    Ok(AttachmentDigest::of(file_name, media_type, &bytes))
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

//! # custody-cli — Custody Ledger Toolchain
//!
//! Offline tools for people who hold evidence files or exported chains but
//! not the ledger itself:
//!
//! - [`identify`]: derive and check evidence identifiers.
//! - [`verify`]: verify an exported chain and check attestation references.
//!
//! Every subcommand handler returns the process exit code as `u8`.

pub mod identify;
pub mod verify;

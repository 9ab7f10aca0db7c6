//! # API Route Modules
//!
//! | Module             | Routes                                           | Auth   |
//! |--------------------|--------------------------------------------------|--------|
//! | [`evidence`]       | `POST /v1/evidence`, `POST /v1/evidence/{id}/events` | bearer |
//! | [`submissions`]    | `GET /v1/submissions/{id}`, `POST /v1/confirmations` | bearer |
//! | [`verification`]   | chain retrieval and verification                 | public |
//! | [`identifiers`]    | identifier derivation and format checks          | public |

pub mod evidence;
pub mod identifiers;
pub mod submissions;
pub mod verification;

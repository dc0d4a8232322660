//! Mailguard Core
//!
//! Core types, email normalization, and error handling shared by the
//! Mailguard triage pipeline crates.
//!
//! An inbound email enters as a [`ScanRequest`], is canonicalized by the
//! [`Normalizer`] into an immutable [`EmailRecord`], and leaves the pipeline
//! as exactly one [`ScanVerdict`].

pub mod error;
pub mod normalizer;
pub mod types;

pub use error::{Error, Result};
pub use normalizer::{fingerprint, Normalizer};
pub use types::{
    EmailRecord, ScanRequest, ScanResponse, ScanVerdict, StageId, Verdict,
};

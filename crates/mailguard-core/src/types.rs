//! Core types for the Mailguard triage pipeline

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Raw scan request as received at the service boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Sender address, possibly in `"Name <addr@host>"` form
    pub sender: String,

    /// Subject line
    #[serde(default)]
    pub subject: String,

    /// Message body, possibly containing HTML
    #[serde(default)]
    pub body: String,

    /// Mail thread identifier, used to key conversation sessions
    pub thread_id: String,

    /// User identifier, used to key personal context
    pub user_id: String,
}

/// A normalized, immutable email record
///
/// Produced by the [`Normalizer`](crate::normalizer::Normalizer) and consumed
/// read-only by every analysis stage. Fields are only public for reading;
/// records are never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Normalized sender address (lowercase, bare address)
    pub sender: String,

    /// Normalized subject (entities decoded, whitespace collapsed)
    pub subject: String,

    /// Plain-text body with HTML stripped
    pub body: String,

    /// URLs extracted from the body
    pub urls: Vec<String>,

    /// Email addresses extracted from the body
    pub addresses: Vec<String>,

    /// Phone numbers extracted from the body
    pub phone_numbers: Vec<String>,

    /// Stable content fingerprint (SHA-256 over normalized subject + body)
    pub fingerprint: String,

    /// When the record was normalized
    pub received_at: SystemTime,
}

impl EmailRecord {
    /// Sender domain (the part after `@`), if present
    pub fn sender_domain(&self) -> Option<&str> {
        self.sender.rsplit_once('@').map(|(_, domain)| domain)
    }

    /// Combined lowercase subject + body text used by indicator matching
    pub fn indicator_text(&self) -> String {
        let mut text = String::with_capacity(self.subject.len() + self.body.len() + 1);
        text.push_str(&self.subject.to_lowercase());
        text.push(' ');
        text.push_str(&self.body.to_lowercase());
        text
    }

    /// Model input text in the shape the scorer was trained on, truncated
    /// to `max_chars` on a char boundary
    pub fn scorer_text(&self, max_chars: usize) -> String {
        let full = format!(
            "Subject: {}\nFrom: {}\n\n{}",
            self.subject, self.sender, self.body
        );
        if full.chars().count() <= max_chars {
            full
        } else {
            full.chars().take(max_chars).collect()
        }
    }
}

/// Final classification of a scanned email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Malicious with actionable confidence
    Threat,
    /// Benign with actionable confidence
    Safe,
    /// Analysis could not reach an actionable confidence
    Uncertain,
}

impl Verdict {
    /// Whether this verdict terminates conversation monitoring
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Threat | Self::Safe)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Threat => "threat",
            Self::Safe => "safe",
            Self::Uncertain => "uncertain",
        };
        f.write_str(s)
    }
}

/// Identifier of the pipeline stage that terminated a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    /// Signature/reputation pattern lookup
    Pattern,
    /// ML scorer with the deterministic override layer
    Classifier,
    /// Context-assembling reasoning agent
    Reasoning,
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pattern => "pattern",
            Self::Classifier => "classifier",
            Self::Reasoning => "reasoning",
        };
        f.write_str(s)
    }
}

/// The single verdict produced for a scan request
///
/// Immutable once returned; exactly one is produced per well-formed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanVerdict {
    /// Final classification
    pub verdict: Verdict,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Stage that terminated the pipeline
    pub stage: StageId,

    /// Human-readable rationale, when a stage produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ScanVerdict {
    /// Create a verdict without a rationale
    pub fn new(verdict: Verdict, confidence: f32, stage: StageId) -> Self {
        Self {
            verdict,
            confidence,
            stage,
            rationale: None,
        }
    }

    /// Attach a rationale
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Response shape at the service boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    /// Final classification
    pub verdict: Verdict,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Terminating stage
    pub stage: StageId,

    /// Optional rationale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl From<ScanVerdict> for ScanResponse {
    fn from(v: ScanVerdict) -> Self {
        Self {
            verdict: v.verdict,
            confidence: v.confidence,
            stage: v.stage,
            rationale: v.rationale,
        }
    }
}

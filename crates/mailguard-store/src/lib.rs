//! Mailguard Store
//!
//! Long-lived per-user state behind the triage pipeline: the deduplicated
//! personal document store the reasoning stage draws context from, the
//! per-thread conversation tracker with idle eviction, and the labeled
//! training set with its retraining readiness gate.
//!
//! These three are the only shared mutable state in the system; every
//! operation is a single atomic lock scope and nothing here suspends.

pub mod documents;
pub mod sessions;
pub mod training;

pub use documents::{content_hash, ContextStore, Document, DocumentStats};
pub use sessions::{
    spawn_sweeper, ConversationTracker, SessionState, SessionView, DEFAULT_ARCHIVE_CAPACITY,
};
pub use training::{
    evaluate_readiness, TrainingPreview, TrainingReadiness, TrainingSample, TrainingSet,
    TrainingThresholds,
};

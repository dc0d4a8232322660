//! Mailguard Stages
//!
//! The independent analysis stages of the escalation pipeline, ordered by
//! cost:
//! - Pattern stage: indexed signature/reputation lookup, sub-millisecond
//! - Classifier stage: opaque ML scorer plus a deterministic override layer
//! - Reasoning stage: opaque language agent fed a bounded context window
//!
//! The scorer and the agent are trait seams ([`TextScorer`],
//! [`ReasoningAgent`]); the pipeline never depends on a concrete model.

pub mod classifier;
pub mod overrides;
pub mod patterns;
pub mod reasoning;
pub mod reputation;
pub mod scorer;

pub use classifier::{ClassifierOutcome, ClassifierStage};
pub use overrides::{OverrideMatch, OverrideSet};
pub use patterns::{PatternOutcome, PatternStage};
pub use reasoning::{parse_assessment, AgentAssessment, ReasoningAgent, ReasoningStage};
pub use reputation::{Reputation, SenderReputationCache};
pub use scorer::{ModelScore, ScoreLabel, TextScorer};

//! Classifier stage: opaque scorer plus the deterministic override layer
//!
//! Wraps the trained model behind [`TextScorer`], bounds the call with a
//! timeout, and applies the override predicates after the score is
//! obtained. Scorer failure never propagates: it folds into an
//! `Inconclusive` outcome so the orchestrator escalates to the reasoning
//! stage instead of failing the request.

use crate::overrides::OverrideSet;
use crate::scorer::{ModelScore, ScoreLabel, TextScorer};
use mailguard_core::{EmailRecord, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default scorer call timeout
pub const DEFAULT_SCORER_TIMEOUT: Duration = Duration::from_secs(5);

/// Character budget for the model input text
pub const SCORER_INPUT_CHARS: usize = 2_000;

/// Outcome of the classifier stage
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    /// The model produced a score and no override fired
    Scored {
        /// Predicted class
        label: ScoreLabel,
        /// Model confidence in [0, 1]
        confidence: f32,
    },
    /// An override predicate forced a threat decision
    Overridden {
        /// Rule that fired
        rule_id: String,
        /// Fixed override confidence
        confidence: f32,
    },
    /// The scorer was unavailable or timed out
    Inconclusive {
        /// Why the stage could not score
        reason: String,
    },
}

/// Classifier stage adapter
pub struct ClassifierStage {
    scorer: Arc<dyn TextScorer>,
    overrides: OverrideSet,
    timeout: Duration,
    override_confidence: f32,
}

impl ClassifierStage {
    /// Create a stage around an opaque scorer
    pub fn new(scorer: Arc<dyn TextScorer>) -> Result<Self> {
        Ok(Self {
            scorer,
            overrides: OverrideSet::new()?,
            timeout: DEFAULT_SCORER_TIMEOUT,
            override_confidence: 0.95,
        })
    }

    /// Override the scorer call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the fixed confidence assigned to override matches
    pub fn with_override_confidence(mut self, confidence: f32) -> Self {
        self.override_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Classify a record
    ///
    /// Infallible by design: every failure path maps to a well-defined
    /// outcome variant. Overrides are evaluated after scoring and win over
    /// any model score, including when the scorer itself failed.
    pub async fn classify(&self, record: &EmailRecord) -> ClassifierOutcome {
        let text = record.scorer_text(SCORER_INPUT_CHARS);

        let score: Option<ModelScore> =
            match tokio::time::timeout(self.timeout, self.scorer.score(&text)).await {
                Ok(Ok(score)) => Some(score),
                Ok(Err(e)) => {
                    warn!(scorer = self.scorer.name(), error = %e, "scorer call failed");
                    None
                }
                Err(_) => {
                    warn!(scorer = self.scorer.name(), "scorer call timed out");
                    None
                }
            };

        if let Some(m) = self.overrides.evaluate(record) {
            return ClassifierOutcome::Overridden {
                rule_id: m.rule_id,
                confidence: self.override_confidence,
            };
        }

        match score {
            Some(score) => {
                debug!(
                    scorer = self.scorer.name(),
                    label = ?score.label,
                    confidence = score.confidence,
                    "scorer result"
                );
                ClassifierOutcome::Scored {
                    label: score.label,
                    confidence: score.confidence,
                }
            }
            None => ClassifierOutcome::Inconclusive {
                reason: "scorer unavailable".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mailguard_core::Error;
    use std::time::SystemTime;

    struct FixedScorer {
        p_malicious: f32,
    }

    #[async_trait]
    impl TextScorer for FixedScorer {
        async fn score(&self, _text: &str) -> mailguard_core::Result<ModelScore> {
            Ok(ModelScore::from_probabilities(
                1.0 - self.p_malicious,
                self.p_malicious,
            ))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl TextScorer for FailingScorer {
        async fn score(&self, _text: &str) -> mailguard_core::Result<ModelScore> {
            Err(Error::stage_unavailable("model backend down"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowScorer;

    #[async_trait]
    impl TextScorer for SlowScorer {
        async fn score(&self, _text: &str) -> mailguard_core::Result<ModelScore> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ModelScore::from_probabilities(1.0, 0.0))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn record(subject: &str, body: &str) -> EmailRecord {
        EmailRecord {
            sender: "someone@example.com".to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            urls: Vec::new(),
            addresses: Vec::new(),
            phone_numbers: Vec::new(),
            fingerprint: "fp".to_string(),
            received_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_benign_score_passes_through() {
        let stage = ClassifierStage::new(Arc::new(FixedScorer { p_malicious: 0.05 })).unwrap();
        let outcome = stage.classify(&record("lunch", "see you at noon")).await;

        match outcome {
            ClassifierOutcome::Scored { label, confidence } => {
                assert_eq!(label, ScoreLabel::Benign);
                assert!(confidence > 0.9);
            }
            other => panic!("expected scored outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_override_beats_confident_benign_score() {
        let stage = ClassifierStage::new(Arc::new(FixedScorer { p_malicious: 0.01 })).unwrap();
        let outcome = stage
            .classify(&record(
                "payroll",
                "send your social security number to finish enrollment",
            ))
            .await;

        match outcome {
            ClassifierOutcome::Overridden {
                rule_id,
                confidence,
            } => {
                assert_eq!(rule_id, "ssn-request");
                assert_eq!(confidence, 0.95);
            }
            other => panic!("expected override, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scorer_failure_is_inconclusive() {
        let stage = ClassifierStage::new(Arc::new(FailingScorer)).unwrap();
        let outcome = stage.classify(&record("hello", "ordinary text")).await;
        assert!(matches!(outcome, ClassifierOutcome::Inconclusive { .. }));
    }

    #[tokio::test]
    async fn test_scorer_timeout_is_inconclusive() {
        let stage = ClassifierStage::new(Arc::new(SlowScorer))
            .unwrap()
            .with_timeout(Duration::from_millis(20));
        let outcome = stage.classify(&record("hello", "ordinary text")).await;
        assert!(matches!(outcome, ClassifierOutcome::Inconclusive { .. }));
    }

    #[tokio::test]
    async fn test_override_applies_even_when_scorer_fails() {
        let stage = ClassifierStage::new(Arc::new(FailingScorer)).unwrap();
        let outcome = stage
            .classify(&record("urgent", "confirm your card number today"))
            .await;
        assert!(matches!(outcome, ClassifierOutcome::Overridden { .. }));
    }
}

//! Opaque text-scorer seam
//!
//! The trained classifier model sits behind this trait. The pipeline only
//! depends on the score shape; model loading, inference, and serving live
//! elsewhere. Tests plug in scripted implementations.

use async_trait::async_trait;
use mailguard_core::Result;
use serde::{Deserialize, Serialize};

/// Class predicted by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreLabel {
    /// Predicted benign
    Benign,
    /// Predicted malicious
    Malicious,
}

/// Score returned by the opaque classifier model
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelScore {
    /// Predicted class
    pub label: ScoreLabel,

    /// Confidence of the predicted class, in [0, 1]
    pub confidence: f32,

    /// Probability mass assigned to the benign class
    pub p_benign: f32,

    /// Probability mass assigned to the malicious class
    pub p_malicious: f32,
}

impl ModelScore {
    /// Build a score from the two class probabilities
    pub fn from_probabilities(p_benign: f32, p_malicious: f32) -> Self {
        let (label, confidence) = if p_malicious > p_benign {
            (ScoreLabel::Malicious, p_malicious)
        } else {
            (ScoreLabel::Benign, p_benign)
        };
        Self {
            label,
            confidence,
            p_benign,
            p_malicious,
        }
    }
}

/// Trait for the opaque classifier model
#[async_trait]
pub trait TextScorer: Send + Sync {
    /// Score the prepared email text
    async fn score(&self, text: &str) -> Result<ModelScore>;

    /// Scorer name, for logs and metrics
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_probabilities_picks_argmax() {
        let s = ModelScore::from_probabilities(0.3, 0.7);
        assert_eq!(s.label, ScoreLabel::Malicious);
        assert_eq!(s.confidence, 0.7);

        let s = ModelScore::from_probabilities(0.9, 0.1);
        assert_eq!(s.label, ScoreLabel::Benign);
        assert_eq!(s.confidence, 0.9);
    }
}

//! Pipeline configuration

use mailguard_store::TrainingThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration consumed by the scan pipeline and its stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pattern-rule confidence at or above which the scan stops with `threat`
    #[serde(default = "default_pattern_block_threshold")]
    pub pattern_block_threshold: f32,

    /// Classifier benign confidence above which the scan stops with `safe`
    #[serde(default = "default_classifier_safe_threshold")]
    pub classifier_safe_threshold: f32,

    /// Fixed confidence assigned to manual overrides
    #[serde(default = "default_override_confidence")]
    pub override_confidence: f32,

    /// Scorer call timeout in seconds
    #[serde(default = "default_scorer_timeout_secs")]
    pub scorer_timeout_secs: u64,

    /// Reasoning agent call timeout in seconds
    #[serde(default = "default_reasoning_timeout_secs")]
    pub reasoning_timeout_secs: u64,

    /// Session idle timeout in seconds
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// Eviction sweep interval in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum archived session snapshots retained for audit
    #[serde(default = "default_session_archive_capacity")]
    pub session_archive_capacity: usize,

    /// Number of documents retrieved into the reasoning context window
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Maximum normalized body length in chars
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,

    /// Maximum URLs extracted per email
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,

    /// Training readiness thresholds
    #[serde(default)]
    pub training: TrainingThresholds,
}

impl PipelineConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Scorer timeout as a [`Duration`]
    pub fn scorer_timeout(&self) -> Duration {
        Duration::from_secs(self.scorer_timeout_secs)
    }

    /// Reasoning timeout as a [`Duration`]
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }

    /// Session idle timeout as a [`Duration`]
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// Sweep interval as a [`Duration`]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pattern_block_threshold: default_pattern_block_threshold(),
            classifier_safe_threshold: default_classifier_safe_threshold(),
            override_confidence: default_override_confidence(),
            scorer_timeout_secs: default_scorer_timeout_secs(),
            reasoning_timeout_secs: default_reasoning_timeout_secs(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            session_archive_capacity: default_session_archive_capacity(),
            context_window: default_context_window(),
            max_body_chars: default_max_body_chars(),
            max_urls: default_max_urls(),
            training: TrainingThresholds::default(),
        }
    }
}

fn default_pattern_block_threshold() -> f32 {
    0.95
}

fn default_classifier_safe_threshold() -> f32 {
    0.80
}

fn default_override_confidence() -> f32 {
    0.95
}

fn default_scorer_timeout_secs() -> u64 {
    5
}

fn default_reasoning_timeout_secs() -> u64 {
    20
}

// 10 hours, matching how long a phishing conversation stays worth tracking
fn default_session_idle_timeout_secs() -> u64 {
    36_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_session_archive_capacity() -> usize {
    mailguard_store::DEFAULT_ARCHIVE_CAPACITY
}

fn default_context_window() -> usize {
    5
}

fn default_max_body_chars() -> usize {
    50_000
}

fn default_max_urls() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.pattern_block_threshold, 0.95);
        assert_eq!(config.classifier_safe_threshold, 0.80);
        assert_eq!(config.session_idle_timeout(), Duration::from_secs(36_000));
        assert_eq!(config.session_archive_capacity, 1024);
        assert_eq!(config.training.min_total, 100);
        assert_eq!(config.training.min_per_class, 20);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = PipelineConfig::from_yaml(
            r#"
classifier_safe_threshold: 0.9
context_window: 3
"#,
        )
        .unwrap();

        assert_eq!(config.classifier_safe_threshold, 0.9);
        assert_eq!(config.context_window, 3);
        assert_eq!(config.pattern_block_threshold, 0.95);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = PipelineConfig::load("/nonexistent/mailguard.yaml").unwrap();
        assert_eq!(config.context_window, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailguard.yaml");
        std::fs::write(&path, "scorer_timeout_secs: 2\nmax_urls: 4\n").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.scorer_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_urls, 4);
    }
}

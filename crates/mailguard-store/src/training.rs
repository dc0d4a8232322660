//! Labeled training data and the retraining readiness gate
//!
//! User feedback contributes labeled (text, class) samples. The readiness
//! gate is a pure derivation over the accumulated set: enough total samples,
//! enough distinct classes, enough samples in every class. It never touches
//! the scan path.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;
use tracing::debug;

/// A labeled sample contributed by feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Email text as prepared for the scorer
    pub text: String,

    /// Class label, e.g. "malicious" or "benign"
    pub label: String,

    /// When the feedback arrived
    pub recorded_at: SystemTime,
}

/// Quantity and balance rules for retraining
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingThresholds {
    /// Minimum total sample count
    pub min_total: usize,

    /// Minimum samples per class
    pub min_per_class: usize,

    /// Minimum number of distinct classes
    pub min_classes: usize,
}

impl Default for TrainingThresholds {
    fn default() -> Self {
        Self {
            min_total: 100,
            min_per_class: 20,
            min_classes: 2,
        }
    }
}

/// Derived readiness report; computed, never stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReadiness {
    /// Total sample count
    pub total: usize,

    /// Sample count per class label
    pub per_class: BTreeMap<String, usize>,

    /// Whether every rule holds
    pub ready: bool,
}

/// Read-only distribution preview for the training surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPreview {
    /// Total sample count
    pub total: usize,

    /// Sample count per class label
    pub per_class: BTreeMap<String, usize>,

    /// Most recent samples, newest first, bounded
    pub recent: Vec<TrainingSample>,
}

/// Evaluate readiness rules over a sample set
///
/// Pure function: all rules must hold for `ready = true`.
pub fn evaluate_readiness(
    samples: &[TrainingSample],
    thresholds: TrainingThresholds,
) -> TrainingReadiness {
    let mut per_class: BTreeMap<String, usize> = BTreeMap::new();
    for sample in samples {
        *per_class.entry(sample.label.clone()).or_insert(0) += 1;
    }

    let total = samples.len();
    let ready = total >= thresholds.min_total
        && per_class.len() >= thresholds.min_classes
        && per_class.values().all(|&n| n >= thresholds.min_per_class);

    TrainingReadiness {
        total,
        per_class,
        ready,
    }
}

/// Accumulated labeled samples with configured thresholds
pub struct TrainingSet {
    samples: RwLock<Vec<TrainingSample>>,
    thresholds: TrainingThresholds,
}

impl TrainingSet {
    /// Create an empty set with the given thresholds
    pub fn new(thresholds: TrainingThresholds) -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            thresholds,
        }
    }

    /// Record one labeled sample from feedback
    pub fn record(&self, text: impl Into<String>, label: impl Into<String>) {
        let sample = TrainingSample {
            text: text.into(),
            label: label.into(),
            recorded_at: SystemTime::now(),
        };
        debug!(label = %sample.label, "training sample recorded");
        self.samples.write().push(sample);
    }

    /// Current readiness status
    pub fn readiness(&self) -> TrainingReadiness {
        evaluate_readiness(&self.samples.read(), self.thresholds)
    }

    /// Distribution preview with at most `limit` recent samples
    ///
    /// Read-only: never mutates the underlying data.
    pub fn preview(&self, limit: usize) -> TrainingPreview {
        let samples = self.samples.read();
        let readiness = evaluate_readiness(&samples, self.thresholds);

        let recent = samples.iter().rev().take(limit).cloned().collect();

        TrainingPreview {
            total: readiness.total,
            per_class: readiness.per_class,
            recent,
        }
    }

    /// Total sample count
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    /// Whether no samples have been recorded yet
    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

impl Default for TrainingSet {
    fn default() -> Self {
        Self::new(TrainingThresholds::default())
    }
}

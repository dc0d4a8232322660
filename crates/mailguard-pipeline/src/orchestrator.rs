//! Scan orchestrator
//!
//! Sequences the analysis stages from cheapest to most expensive and
//! enforces the short-circuit policy:
//!
//! 1. Pattern threat match at or above the block threshold stops the scan.
//! 2. A confidently benign classifier score with no override stops the scan.
//! 3. A triggered override stops the scan with a forced threat.
//! 4. Everything else escalates to the reasoning stage, whose verdict is
//!    final.
//!
//! Stage failures degrade instead of aborting: a failed pattern lookup
//! starts the scan at the classifier, an inconclusive classifier escalates
//! to reasoning. Exactly one verdict is returned per well-formed request.

use crate::config::PipelineConfig;
use mailguard_core::{
    EmailRecord, Normalizer, Result, ScanRequest, ScanResponse, ScanVerdict, StageId, Verdict,
};
use mailguard_stages::{
    classifier::SCORER_INPUT_CHARS, ClassifierOutcome, ClassifierStage, PatternOutcome,
    PatternStage, ReasoningAgent, ReasoningStage, ScoreLabel, TextScorer,
};
use mailguard_store::{ContextStore, ConversationTracker, TrainingSet};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// The escalation pipeline
pub struct ScanPipeline {
    normalizer: Normalizer,
    pattern: PatternStage,
    classifier: ClassifierStage,
    reasoning: ReasoningStage,
    documents: Arc<ContextStore>,
    sessions: Arc<ConversationTracker>,
    training: Arc<TrainingSet>,
    config: PipelineConfig,
}

impl ScanPipeline {
    /// Build a pipeline around the opaque scorer and agent
    pub fn new(
        scorer: Arc<dyn TextScorer>,
        agent: Arc<dyn ReasoningAgent>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let documents = Arc::new(ContextStore::new());
        let sessions = Arc::new(
            ConversationTracker::new(config.session_idle_timeout())
                .with_archive_capacity(config.session_archive_capacity),
        );
        let training = Arc::new(TrainingSet::new(config.training));

        let classifier = ClassifierStage::new(scorer)?
            .with_timeout(config.scorer_timeout())
            .with_override_confidence(config.override_confidence);

        let reasoning = ReasoningStage::new(agent, Arc::clone(&documents), Arc::clone(&sessions))
            .with_timeout(config.reasoning_timeout())
            .with_context_window(config.context_window);

        Ok(Self {
            normalizer: Normalizer::with_limits(config.max_body_chars, config.max_urls)?,
            pattern: PatternStage::new()?,
            classifier,
            reasoning,
            documents,
            sessions,
            training,
            config,
        })
    }

    /// Mutable access to the pattern stage, for loading signatures and
    /// denylist entries before the pipeline is shared
    pub fn pattern_mut(&mut self) -> &mut PatternStage {
        &mut self.pattern
    }

    /// Shared document store (the §6 document-management surface)
    pub fn documents(&self) -> &Arc<ContextStore> {
        &self.documents
    }

    /// Shared conversation tracker
    pub fn sessions(&self) -> &Arc<ConversationTracker> {
        &self.sessions
    }

    /// Shared training set (the training surface)
    pub fn training(&self) -> &Arc<TrainingSet> {
        &self.training
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start the background session-eviction sweeper
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        mailguard_store::spawn_sweeper(Arc::clone(&self.sessions), self.config.sweep_interval())
    }

    /// Handle a raw request at the service boundary
    ///
    /// Normalization errors (`InvalidInput`) surface to the caller; every
    /// well-formed request yields exactly one response.
    pub async fn handle(&self, request: &ScanRequest) -> Result<ScanResponse> {
        let record = self.normalizer.normalize(request)?;
        let verdict = self
            .scan(&record, &request.user_id, &request.thread_id)
            .await;
        Ok(verdict.into())
    }

    /// Run the escalation pipeline over a normalized record
    #[instrument(skip(self, record), fields(user = user_id, thread = thread_id))]
    pub async fn scan(&self, record: &EmailRecord, user_id: &str, thread_id: &str) -> ScanVerdict {
        let start = Instant::now();

        let verdict = self.run_stages(record, user_id, thread_id).await;

        histogram!("mailguard_scan_duration_seconds").record(start.elapsed().as_secs_f64());
        counter!(
            "mailguard_scans_total",
            "verdict" => verdict.verdict.to_string(),
            "stage" => verdict.stage.to_string()
        )
        .increment(1);

        info!(
            verdict = %verdict.verdict,
            stage = %verdict.stage,
            confidence = verdict.confidence,
            "scan complete"
        );
        verdict
    }

    async fn run_stages(
        &self,
        record: &EmailRecord,
        user_id: &str,
        thread_id: &str,
    ) -> ScanVerdict {
        // Stage 1: pattern lookup. A failure here degrades to starting at
        // the classifier rather than aborting the scan.
        let pattern_start = Instant::now();
        match self.pattern.match_record(record) {
            Ok(PatternOutcome::ThreatMatch {
                confidence,
                rule_id,
            }) if confidence >= self.config.pattern_block_threshold => {
                histogram!("mailguard_stage_duration_seconds", "stage" => "pattern")
                    .record(pattern_start.elapsed().as_secs_f64());
                return ScanVerdict::new(Verdict::Threat, confidence, StageId::Pattern)
                    .with_rationale(format!("matched signature rule {}", rule_id));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "pattern stage failed, degrading to classifier");
            }
        }
        histogram!("mailguard_stage_duration_seconds", "stage" => "pattern")
            .record(pattern_start.elapsed().as_secs_f64());

        // Stage 2: classifier with override layer
        let classifier_start = Instant::now();
        let outcome = self.classifier.classify(record).await;
        histogram!("mailguard_stage_duration_seconds", "stage" => "classifier")
            .record(classifier_start.elapsed().as_secs_f64());

        match outcome {
            ClassifierOutcome::Overridden {
                rule_id,
                confidence,
            } => {
                return ScanVerdict::new(Verdict::Threat, confidence, StageId::Classifier)
                    .with_rationale(format!("manual override: {}", rule_id));
            }
            ClassifierOutcome::Scored {
                label: ScoreLabel::Benign,
                confidence,
            } if confidence > self.config.classifier_safe_threshold => {
                return ScanVerdict::new(Verdict::Safe, confidence, StageId::Classifier);
            }
            ClassifierOutcome::Scored { .. } => {}
            ClassifierOutcome::Inconclusive { reason } => {
                counter!("mailguard_stage_degradations_total", "stage" => "classifier")
                    .increment(1);
                warn!(reason, "classifier inconclusive, escalating to reasoning");
            }
        }

        // Stage 3: reasoning; its verdict is final
        let reasoning_start = Instant::now();
        let verdict = self.reasoning.analyze(record, user_id, thread_id).await;
        histogram!("mailguard_stage_duration_seconds", "stage" => "reasoning")
            .record(reasoning_start.elapsed().as_secs_f64());
        verdict
    }

    /// Record labeled feedback for the training readiness gate
    ///
    /// The stored text uses the same shape and character budget the scorer
    /// sees, so retraining samples match the model input.
    pub fn record_feedback(&self, record: &EmailRecord, label: impl Into<String>) {
        self.training
            .record(record.scorer_text(SCORER_INPUT_CHARS), label.into());
    }
}

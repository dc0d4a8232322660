//! Mailguard Pipeline
//!
//! The control plane of the triage system: normalizes an inbound email,
//! runs it through the cost-ascending stage sequence with short-circuit
//! rules and per-stage timeouts, and returns exactly one verdict per
//! request. Also owns the shared stores and the configuration surface.
//!
//! ```no_run
//! use mailguard_pipeline::{PipelineConfig, ScanPipeline};
//! use mailguard_core::ScanRequest;
//! # use std::sync::Arc;
//! # async fn example(
//! #     scorer: Arc<dyn mailguard_stages::TextScorer>,
//! #     agent: Arc<dyn mailguard_stages::ReasoningAgent>,
//! # ) -> anyhow::Result<()> {
//! let pipeline = ScanPipeline::new(scorer, agent, PipelineConfig::default())?;
//! let response = pipeline
//!     .handle(&ScanRequest {
//!         sender: "Alice <alice@example.com>".into(),
//!         subject: "Quarterly report".into(),
//!         body: "Attached as discussed.".into(),
//!         thread_id: "thread-1".into(),
//!         user_id: "user-1".into(),
//!     })
//!     .await?;
//! println!("{}: {:.2}", response.verdict, response.confidence);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod init;
pub mod orchestrator;

pub use config::PipelineConfig;
pub use init::{global, init_global};
pub use orchestrator::ScanPipeline;

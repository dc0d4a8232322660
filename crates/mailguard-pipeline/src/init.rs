//! Process-wide pipeline initialization guard
//!
//! Component state behind the pipeline (stores, caches, compiled rule
//! indexes) must be constructed exactly once per process lifetime. The
//! guard makes duplicate initialization attempts return the existing
//! handle instead of building a second pipeline.

use crate::orchestrator::ScanPipeline;
use std::sync::{Arc, OnceLock};
use tracing::warn;

static GLOBAL_PIPELINE: OnceLock<Arc<ScanPipeline>> = OnceLock::new();

/// Install `pipeline` as the process-wide instance
///
/// The first call wins; later calls discard their argument and return the
/// already-installed handle.
pub fn init_global(pipeline: ScanPipeline) -> Arc<ScanPipeline> {
    if GLOBAL_PIPELINE.get().is_some() {
        warn!("pipeline already initialized, returning existing instance");
    }
    Arc::clone(GLOBAL_PIPELINE.get_or_init(|| Arc::new(pipeline)))
}

/// The process-wide pipeline, if one was installed
pub fn global() -> Option<Arc<ScanPipeline>> {
    GLOBAL_PIPELINE.get().cloned()
}

//! Search backend abstraction
//!
//! Provides a pluggable backend system for the archive indexes:
//! - **Meilisearch**: HTTP backend for production
//! - **Memory**: in-process backend for tests and dry runs
//!
//! Records reach either backend through a [`RecordSink`], which validates them
//! and targets one generation (live or shadow) of the three indexes.

mod memory;
mod meili;
pub mod schema;
mod sink;
mod traits;

pub use memory::MemoryBackend;
pub use meili::{MeiliBackend, MeiliConfig};
pub use schema::{Entity, IndexNames, IndexSchema};
pub use sink::{is_valid_id, Generation, RecordSink};
pub use traits::{
    expect_task, wait_for_task, wait_until_idle, BackendError, BackendResult, IndexStats,
    SearchBackend, SearchRequest, SearchResponse, TaskId, TaskOutcome, TaskState,
};

use crate::config::BackendConfig;
use std::sync::Arc;

/// Create a backend from configuration
pub fn create_backend(config: &BackendConfig) -> BackendResult<Arc<dyn SearchBackend>> {
    match config.kind.as_str() {
        "meilisearch" | "meili" => Ok(Arc::new(MeiliBackend::new(MeiliConfig {
            host: config.host.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
        })?)),
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        other => Err(BackendError::Config(format!(
            "Unknown backend type: {}. Use 'meilisearch' or 'memory'.",
            other
        ))),
    }
}

//! Search backend trait definitions
//!
//! Defines the index-lifecycle, document and search operations every backend
//! implements, plus the polling helpers built on top of them.

use super::schema::IndexSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Identifier of an asynchronous backend operation
pub type TaskId = u64;

/// Errors that can occur while talking to a search backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with an error response
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A record failed validation before leaving the process
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// An asynchronous task finished unsuccessfully
    #[error("Task {task} failed: {reason}")]
    TaskFailed { task: TaskId, reason: String },

    /// A wait exceeded its deadline
    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { waited: Duration, what: String },

    /// Request or response body could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// The backend reported a missing index, document or task
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Api { status: 404, .. })
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// State of an asynchronous task as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Enqueued,
    Processing,
    Succeeded,
    Failed(String),
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed(_))
    }
}

/// Final outcome of waiting on a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
}

/// Document count and indexing flag of one index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub number_of_documents: u64,
    pub is_indexing: bool,
}

/// A search query against one index
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(rename = "q")]
    pub query: String,
    /// Boolean filter expression, e.g. `fonds_id = "x" AND decade = 1960`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Sort rules in `field:asc` / `field:desc` form
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    /// Fields to compute a facet distribution for
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<String>,
    /// 1-based page number
    pub page: usize,
    pub hits_per_page: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            filter: None,
            sort: Vec::new(),
            facets: Vec::new(),
            page: 1,
            hits_per_page: 20,
        }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sort(mut self, rule: impl Into<String>) -> Self {
        self.sort.push(rule.into());
        self
    }

    pub fn with_facet(mut self, field: impl Into<String>) -> Self {
        self.facets.push(field.into());
        self
    }

    pub fn with_page(mut self, page: usize, hits_per_page: usize) -> Self {
        self.page = page.max(1);
        self.hits_per_page = hits_per_page;
        self
    }
}

/// Hits, total count and facet distribution of a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<Value>,
    #[serde(default, alias = "estimatedTotalHits")]
    pub total_hits: usize,
    #[serde(default)]
    pub facet_distribution: BTreeMap<String, BTreeMap<String, usize>>,
}

/// Core trait for search backends
///
/// Write operations are asynchronous on real backends and return a task id
/// that can be waited on with [`wait_for_task`]. The trait is object-safe for
/// use as `dyn SearchBackend`.
pub trait SearchBackend: Send + Sync + Debug {
    /// Create an empty index with the given primary key
    fn create_index(&self, uid: &str, primary_key: &str) -> BackendResult<TaskId>;

    /// Delete an index; `None` when it did not exist
    fn delete_index(&self, uid: &str) -> BackendResult<Option<TaskId>>;

    /// Apply searchable/filterable/sortable fields and ranking settings
    fn configure_index(&self, uid: &str, schema: &IndexSchema) -> BackendResult<TaskId>;

    /// Add or replace documents by primary key
    fn add_documents(&self, uid: &str, documents: &[Value]) -> BackendResult<TaskId>;

    /// Delete one document by primary key
    fn delete_document(&self, uid: &str, id: &str) -> BackendResult<TaskId>;

    /// Fetch one document by primary key
    fn get_document(&self, uid: &str, id: &str) -> BackendResult<Option<Value>>;

    /// Run a search
    fn search(&self, uid: &str, request: &SearchRequest) -> BackendResult<SearchResponse>;

    /// Atomically exchange the contents of each index pair
    fn swap_indexes(&self, pairs: &[(String, String)]) -> BackendResult<TaskId>;

    /// Document count and indexing flag
    fn index_stats(&self, uid: &str) -> BackendResult<IndexStats>;

    /// Current state of an asynchronous task
    fn task_state(&self, task: TaskId) -> BackendResult<TaskState>;

    /// Backend name for logging (e.g., "meilisearch", "memory")
    fn name(&self) -> &str;
}

/// Poll a task until it finishes or `timeout` elapses
pub fn wait_for_task(
    backend: &dyn SearchBackend,
    task: TaskId,
    timeout: Duration,
    interval: Duration,
) -> BackendResult<TaskOutcome> {
    let started = Instant::now();
    loop {
        match backend.task_state(task)? {
            TaskState::Succeeded => return Ok(TaskOutcome::Succeeded),
            TaskState::Failed(reason) => return Ok(TaskOutcome::Failed(reason)),
            state => debug!(task, ?state, "Task still pending"),
        }
        if started.elapsed() >= timeout {
            return Ok(TaskOutcome::TimedOut);
        }
        thread::sleep(interval.min(timeout.saturating_sub(started.elapsed())));
    }
}

/// Wait for a task and turn anything but success into an error
pub fn expect_task(
    backend: &dyn SearchBackend,
    task: TaskId,
    timeout: Duration,
    interval: Duration,
) -> BackendResult<()> {
    match wait_for_task(backend, task, timeout, interval)? {
        TaskOutcome::Succeeded => Ok(()),
        TaskOutcome::Failed(reason) => Err(BackendError::TaskFailed { task, reason }),
        TaskOutcome::TimedOut => Err(BackendError::Timeout {
            waited: timeout,
            what: format!("task {task}"),
        }),
    }
}

/// Poll until none of `indexes` reports ongoing indexing; `false` on timeout
pub fn wait_until_idle(
    backend: &dyn SearchBackend,
    indexes: &[&str],
    timeout: Duration,
    interval: Duration,
) -> BackendResult<bool> {
    let started = Instant::now();
    loop {
        let mut busy = Vec::new();
        for uid in indexes {
            if backend.index_stats(uid)?.is_indexing {
                busy.push(*uid);
            }
        }
        if busy.is_empty() {
            return Ok(true);
        }
        if started.elapsed() >= timeout {
            return Ok(false);
        }
        debug!(?busy, "Waiting for indexing to finish");
        thread::sleep(interval.min(timeout.saturating_sub(started.elapsed())));
    }
}

//! Search backend configuration

use serde::{Deserialize, Serialize};

/// Search backend connection and polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend type: "meilisearch" or "memory"
    #[serde(rename = "type")]
    pub kind: String,
    /// Base URL of the search server
    pub host: String,
    /// API key (optional, falls back to MEILISEARCH_API_KEY)
    pub api_key: Option<String>,
    /// Environment name appended to index names (`ArchiveFile_<env>`)
    pub environment: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries on connection errors before giving up
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds; doubles per attempt
    pub backoff_base_ms: u64,
    /// Interval between task and index status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Deadline for ordinary tasks (index creation, settings, upserts) in seconds
    pub task_timeout_secs: u64,
    /// Deadline for shadow indexes to finish indexing before the swap, in seconds
    pub indexing_timeout_secs: u64,
    /// Deadline for the swap task itself in seconds
    pub swap_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "meilisearch".to_string(),
            host: "http://localhost:7700".to_string(),
            api_key: None,
            environment: "development".to_string(),
            timeout_secs: 120,
            max_retries: 5,
            backoff_base_ms: 2000,
            poll_interval_ms: 5000,
            task_timeout_secs: 300,
            indexing_timeout_secs: 3600,
            swap_timeout_secs: 300,
        }
    }
}

impl BackendConfig {
    /// Apply `MEILISEARCH_HOST` / `MEILISEARCH_API_KEY` from the environment
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("MEILISEARCH_HOST") {
            if !host.is_empty() {
                self.host = host;
            }
        }
        if let Ok(key) = std::env::var("MEILISEARCH_API_KEY") {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
    }
}

//! HTTP backend for Meilisearch
//!
//! Blocking client with bearer authentication. Connection failures, timeouts
//! and 5xx responses are retried with exponential backoff; everything else
//! surfaces immediately.

use super::schema::IndexSchema;
use super::traits::{
    BackendError, BackendResult, IndexStats, SearchBackend, SearchRequest, SearchResponse, TaskId,
    TaskState,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings for the HTTP backend
#[derive(Debug, Clone)]
pub struct MeiliConfig {
    /// Base URL (e.g., "http://localhost:7700")
    pub host: String,
    /// API key (optional, can be from env var)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first failed attempt on connection errors and 5xx
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further attempt
    pub backoff_base_ms: u64,
}

impl Default for MeiliConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:7700".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_retries: 5,
            backoff_base_ms: 2000,
        }
    }
}

/// Meilisearch backend
#[derive(Debug)]
pub struct MeiliBackend {
    client: Client,
    config: MeiliConfig,
}

/// Summary returned for every enqueued operation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskSummary {
    task_uid: TaskId,
}

#[derive(Debug, Deserialize)]
struct TaskDetails {
    status: String,
    #[serde(default)]
    error: Option<ErrorResponse>,
}

/// Meilisearch error response format
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl MeiliBackend {
    /// Create a new HTTP backend
    pub fn new(config: MeiliConfig) -> BackendResult<Self> {
        info!("Initializing Meilisearch backend: host={}", config.host);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Get API key from config or environment
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("MEILISEARCH_API_KEY").ok());

        if let Some(key) = &api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .map_err(|e| BackendError::Config(format!("Invalid API key format: {}", e)))?,
            );
        } else {
            warn!("No API key provided for {}", config.host);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| BackendError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send a request, retrying connection failures with exponential backoff
    fn send(&self, build: impl Fn() -> RequestBuilder) -> BackendResult<Response> {
        let mut attempt = 0u32;
        loop {
            let retries_left = attempt < self.config.max_retries;
            match build().send() {
                Ok(response) if response.status().is_server_error() && retries_left => {
                    warn!(
                        "Server error ({}), retry {}/{}",
                        response.status(),
                        attempt + 1,
                        self.config.max_retries
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || e.is_timeout()) && retries_left => {
                    warn!(
                        "Connection error ({}), retry {}/{}",
                        e,
                        attempt + 1,
                        self.config.max_retries
                    );
                }
                Err(e) => return Err(BackendError::Network(e)),
            }
            thread::sleep(self.backoff(attempt));
            attempt += 1;
        }
    }

    /// Delay before retry number `attempt + 1`
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.config
                .backoff_base_ms
                .saturating_mul(1u64 << attempt.min(16)),
        )
    }

    /// Turn a non-success response into an API error
    fn check(response: Response) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
        if let Ok(error) = serde_json::from_str::<ErrorResponse>(&error_text) {
            return Err(BackendError::Api {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            });
        }
        Err(BackendError::Api {
            status: status.as_u16(),
            code: None,
            message: error_text,
        })
    }

    fn enqueue(&self, build: impl Fn() -> RequestBuilder) -> BackendResult<TaskId> {
        let response = Self::check(self.send(build)?)?;
        let summary: TaskSummary = response.json()?;
        Ok(summary.task_uid)
    }
}

impl SearchBackend for MeiliBackend {
    fn create_index(&self, uid: &str, primary_key: &str) -> BackendResult<TaskId> {
        let body = json!({ "uid": uid, "primaryKey": primary_key });
        self.enqueue(|| self.request(Method::POST, "/indexes").json(&body))
    }

    fn delete_index(&self, uid: &str) -> BackendResult<Option<TaskId>> {
        let path = format!("/indexes/{}", uid);
        let existing = self.send(|| self.request(Method::GET, &path))?;
        if existing.status() == StatusCode::NOT_FOUND {
            debug!("Index {} does not exist, nothing to delete", uid);
            return Ok(None);
        }
        Self::check(existing)?;
        self.enqueue(|| self.request(Method::DELETE, &path)).map(Some)
    }

    fn configure_index(&self, uid: &str, schema: &IndexSchema) -> BackendResult<TaskId> {
        let path = format!("/indexes/{}/settings", uid);
        let settings = schema.to_settings();
        self.enqueue(|| self.request(Method::PATCH, &path).json(&settings))
    }

    fn add_documents(&self, uid: &str, documents: &[Value]) -> BackendResult<TaskId> {
        let path = format!("/indexes/{}/documents?primaryKey=id", uid);
        let body = serde_json::to_vec(documents)?;
        debug!("Sending {} documents to {}", documents.len(), uid);
        self.enqueue(|| self.request(Method::POST, &path).body(body.clone()))
    }

    fn delete_document(&self, uid: &str, id: &str) -> BackendResult<TaskId> {
        let path = format!("/indexes/{}/documents/{}", uid, id);
        self.enqueue(|| self.request(Method::DELETE, &path))
    }

    fn get_document(&self, uid: &str, id: &str) -> BackendResult<Option<Value>> {
        let path = format!("/indexes/{}/documents/{}", uid, id);
        let response = self.send(|| self.request(Method::GET, &path))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::check(response)?.json()?))
    }

    fn search(&self, uid: &str, request: &SearchRequest) -> BackendResult<SearchResponse> {
        let path = format!("/indexes/{}/search", uid);
        let response = Self::check(self.send(|| self.request(Method::POST, &path).json(request))?)?;
        Ok(response.json()?)
    }

    fn swap_indexes(&self, pairs: &[(String, String)]) -> BackendResult<TaskId> {
        let body: Vec<Value> = pairs
            .iter()
            .map(|(a, b)| json!({ "indexes": [a, b] }))
            .collect();
        self.enqueue(|| self.request(Method::POST, "/swap-indexes").json(&body))
    }

    fn index_stats(&self, uid: &str) -> BackendResult<IndexStats> {
        let path = format!("/indexes/{}/stats", uid);
        let response = Self::check(self.send(|| self.request(Method::GET, &path))?)?;
        Ok(response.json()?)
    }

    fn task_state(&self, task: TaskId) -> BackendResult<TaskState> {
        let path = format!("/tasks/{}", task);
        let response = Self::check(self.send(|| self.request(Method::GET, &path))?)?;
        let details: TaskDetails = response.json()?;
        Ok(parse_task_status(&details))
    }

    fn name(&self) -> &str {
        "meilisearch"
    }
}

fn parse_task_status(details: &TaskDetails) -> TaskState {
    match details.status.as_str() {
        "succeeded" => TaskState::Succeeded,
        "enqueued" => TaskState::Enqueued,
        "processing" => TaskState::Processing,
        other => TaskState::Failed(
            details
                .error
                .as_ref()
                .map(|e| match &e.code {
                    Some(code) => format!("{}: {}", code, e.message),
                    None => e.message.clone(),
                })
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

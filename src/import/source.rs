//! Core types and traits for finding-aid imports

use crate::backend::BackendError;
use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

/// One input document waiting to be imported
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceDocument {
    /// File name used as the checkpoint key
    pub name: String,
    /// Full path on disk
    pub path: PathBuf,
}

/// Trait for places finding aids can be listed from
pub trait DocumentSource {
    /// All importable documents in deterministic (lexicographic name) order
    fn documents(&self) -> Result<Vec<SourceDocument>, ImportError>;

    /// Get the source name for display
    fn source_name(&self) -> String;
}

/// Every `*.xml` file directly inside one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl DocumentSource for DirectorySource {
    fn documents(&self) -> Result<Vec<SourceDocument>, ImportError> {
        if !self.dir.is_dir() {
            return Err(ImportError::InvalidFormat(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| ImportError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_xml = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("xml"))
                .unwrap_or(false);
            if !is_xml {
                continue;
            }
            documents.push(SourceDocument {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().to_path_buf(),
            });
        }
        documents.sort();
        Ok(documents)
    }

    fn source_name(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Import configuration
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// File-level components processed per slice
    pub slice_size: usize,
    /// Pending records that trigger a flush in single-document imports
    pub flush_threshold: usize,
    /// Source-system prefix stripped from element ids
    pub id_prefix: String,
    /// Prefix stripped from explicit call numbers
    pub call_number_prefix: String,
    /// Keep the node cache across documents of one run
    pub share_node_cache: bool,
    /// Interval between backend status polls
    pub poll_interval: Duration,
    /// Deadline for ordinary backend tasks
    pub task_timeout: Duration,
    /// Deadline for shadow indexes to become idle before the swap
    pub indexing_timeout: Duration,
    /// Deadline for the swap task
    pub swap_timeout: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            slice_size: 1000,
            flush_threshold: 5000,
            id_prefix: "DE-1958_".to_string(),
            call_number_prefix: "BArch ".to_string(),
            share_node_cache: true,
            poll_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(300),
            indexing_timeout: Duration::from_secs(3600),
            swap_timeout: Duration::from_secs(300),
        }
    }
}

impl ImportConfig {
    /// Runtime import settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            slice_size: config.import.slice_size.max(1),
            flush_threshold: config.import.flush_threshold.max(1),
            id_prefix: config.import.id_prefix.clone(),
            call_number_prefix: config.import.call_number_prefix.clone(),
            share_node_cache: config.import.share_node_cache,
            poll_interval: Duration::from_millis(config.backend.poll_interval_ms),
            task_timeout: Duration::from_secs(config.backend.task_timeout_secs),
            indexing_timeout: Duration::from_secs(config.backend.indexing_timeout_secs),
            swap_timeout: Duration::from_secs(config.backend.swap_timeout_secs),
        }
    }
}

/// Import statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Documents imported in this invocation
    pub documents_imported: usize,
    /// Documents skipped because they are not inventories
    pub documents_skipped: usize,
    /// Documents already listed in the checkpoint
    pub documents_resumed: usize,
    /// Nodes visited by the walker
    pub nodes_processed: usize,
    /// File-level records visited by the walker
    pub files_processed: usize,
    /// Records written to the backend
    pub records_written: usize,
    /// Processing time in seconds
    pub elapsed_seconds: f64,
    /// Current files per second rate
    pub files_per_second: f64,
}

impl ImportStats {
    /// Calculate files per second
    pub fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.files_per_second = self.files_processed as f64 / self.elapsed_seconds;
        }
    }
}

/// Result of importing one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Walked and flushed; `records` nodes, files and origins were written
    Imported { records: usize },
    /// Description type was not `inventory`; nothing written
    Skipped { description_type: Option<String> },
}

impl DocumentOutcome {
    pub fn records(&self) -> usize {
        match self {
            DocumentOutcome::Imported { records } => *records,
            DocumentOutcome::Skipped { .. } => 0,
        }
    }
}

/// Errors that can occur during import
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Invalid document: {0}")]
    InvalidFormat(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Run store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Import run {0} not found")]
    RunNotFound(i64),

    #[error("Import run {0} is already active")]
    RunActive(i64),

    #[error("Import run {id} cannot move from {from} to {to}")]
    InvalidTransition { id: i64, from: String, to: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Shadow index {0} is missing; start a new run")]
    ShadowMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<quick_xml::Error> for ImportError {
    fn from(e: quick_xml::Error) -> Self {
        ImportError::XmlParse(e.to_string())
    }
}

impl ImportError {
    /// Short error class recorded on failed runs
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Io(_) => "Io",
            ImportError::XmlParse(_) => "XmlParse",
            ImportError::InvalidFormat(_) => "InvalidFormat",
            ImportError::Backend(_) => "Backend",
            ImportError::Store(_) => "Store",
            ImportError::Json(_) => "Json",
            ImportError::RunNotFound(_) => "RunNotFound",
            ImportError::RunActive(_) => "RunActive",
            ImportError::InvalidTransition { .. } => "InvalidTransition",
            ImportError::Timeout(_) => "Timeout",
            ImportError::ShadowMissing(_) => "ShadowMissing",
            ImportError::Config(_) => "Config",
        }
    }
}

//! Import pipeline and run store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Import pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Directory holding the finding-aid XML files
    pub data_dir: PathBuf,
    /// File-level components processed per slice
    pub slice_size: usize,
    /// Pending records that trigger a flush in single-document imports
    pub flush_threshold: usize,
    /// Source-system prefix stripped from element ids
    pub id_prefix: String,
    /// Prefix stripped from explicit call numbers
    pub call_number_prefix: String,
    /// Share the node cache across documents of one run
    pub share_node_cache: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/ead"),
            slice_size: 1000,
            flush_threshold: 5000,
            id_prefix: "DE-1958_".to_string(),
            call_number_prefix: "BArch ".to_string(),
            share_node_cache: true,
        }
    }
}

/// Run state persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding import runs
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: directories::ProjectDirs::from("", "", "archindex")
                .map(|d| d.data_dir().join("runs.sqlite3"))
                .unwrap_or_else(|| PathBuf::from(".archindex/runs.sqlite3")),
        }
    }
}

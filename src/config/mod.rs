//! Configuration for archindex

mod backend;
mod import;
mod logging;

pub use backend::BackendConfig;
pub use import::{ImportSettings, StoreConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search backend connection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Import pipeline
    #[serde(default)]
    pub import: ImportSettings,
    /// Run state store
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment overrides are applied before validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.backend.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides, for running without a config file
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.backend.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Backend validation
        match self.backend.kind.as_str() {
            "meilisearch" | "meili" => {
                if !(self.backend.host.starts_with("http://") || self.backend.host.starts_with("https://")) {
                    errors.push(format!(
                        "backend host must be an http(s) URL, got '{}'",
                        self.backend.host
                    ));
                }
            }
            "memory" => {}
            other => errors.push(format!("unknown backend type '{}'", other)),
        }
        if self.backend.environment.is_empty()
            || !self
                .backend
                .environment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            errors.push("backend environment must be a non-empty [A-Za-z0-9_-] name".to_string());
        }
        if self.backend.timeout_secs == 0 {
            errors.push("backend timeout_secs must be positive".to_string());
        }
        if self.backend.poll_interval_ms == 0 {
            errors.push("backend poll_interval_ms must be positive".to_string());
        }
        if self.backend.task_timeout_secs == 0 || self.backend.swap_timeout_secs == 0 {
            errors.push("backend task and swap timeouts must be positive".to_string());
        }

        // Import validation
        if self.import.slice_size == 0 {
            errors.push("import slice_size must be positive".to_string());
        }
        if self.import.flush_threshold == 0 {
            errors.push("import flush_threshold must be positive".to_string());
        }
        if self.import.data_dir.as_os_str().is_empty() {
            errors.push("import data_dir must not be empty".to_string());
        }

        // Store validation
        if self.store.path.as_os_str().is_empty() {
            errors.push("store path must not be empty".to_string());
        }

        // Logging validation
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(self.logging.filter_directive(0)) {
            errors.push(format!("logging directives are invalid: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

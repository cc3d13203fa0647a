//! Logging configuration and subscriber setup

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

/// Log severity level, ordered from quietest to noisiest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

const LEVELS: [LogLevel; 5] = [
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info,
    LogLevel::Debug,
    LogLevel::Trace,
];

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Raise the level by `steps` (each `-v` on the command line)
    pub fn raised(self, steps: u8) -> Self {
        let current = LEVELS.iter().position(|l| *l == self).unwrap_or(2);
        LEVELS[(current + steps as usize).min(LEVELS.len() - 1)]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Base level for every target
    pub level: LogLevel,
    /// Extra filter directives, e.g. `archindex::import::walker=trace`
    pub directives: Vec<String>,
    /// Colored text output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: LogLevel::Info,
            directives: Vec::new(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Filter string from the configured level raised by `verbose`, followed
    /// by the extra directives
    pub fn filter_directive(&self, verbose: u8) -> String {
        std::iter::once(self.level.raised(verbose).as_str().to_string())
            .chain(self.directives.iter().map(|d| d.trim().to_string()))
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Install the global subscriber, writing to stderr
    ///
    /// `RUST_LOG` replaces the configured filter when set.
    pub fn init(&self, verbose: u8) -> Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.filter_directive(verbose))?,
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr);
        let result = match self.format {
            LogFormat::Text => builder.with_ansi(self.ansi).try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raised_saturates_at_trace() {
        assert_eq!(LogLevel::Info.raised(0), LogLevel::Info);
        assert_eq!(LogLevel::Info.raised(1), LogLevel::Debug);
        assert_eq!(LogLevel::Warn.raised(9), LogLevel::Trace);
    }

    #[test]
    fn test_filter_directive_appends_targets() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            directives: vec!["archindex::import=debug".into(), " ".into()],
            ..LoggingConfig::default()
        };
        assert_eq!(config.filter_directive(1), "info,archindex::import=debug");
        assert_eq!(LoggingConfig::default().filter_directive(0), "info");
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: LoggingConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.ansi);
    }
}

//! Subscriber setup for console and file logging
//!
//! Console output goes to stderr so it never mixes with report output on stdout.
//! File output rolls daily and is written from a background thread; keep the
//! returned [`LoggingGuard`] alive until the program exits so buffered lines are
//! flushed.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::error::StampedeError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f UTC";

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files; no file output when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// File name prefix of the daily log files
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Filter directive for file output
    #[serde(default = "default_file_log_level")]
    pub file_log_level: String,
    /// Filter directive for console output
    #[serde(default = "default_console_log_level")]
    pub console_log_level: String,
    /// Whether to log to stderr
    #[serde(default = "default_console_enabled")]
    pub console_enabled: bool,
    /// Whether file output is JSON
    #[serde(default = "default_json_format")]
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_name: default_file_name(),
            file_log_level: default_file_log_level(),
            console_log_level: default_console_log_level(),
            console_enabled: default_console_enabled(),
            json_format: default_json_format(),
        }
    }
}

fn default_file_name() -> String {
    "stampede.log".to_string()
}

fn default_file_log_level() -> String {
    "info".to_string()
}

fn default_console_log_level() -> String {
    "warn".to_string()
}

fn default_console_enabled() -> bool {
    true
}

fn default_json_format() -> bool {
    true
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().merge_with_env()
    }

    /// Override fields from `STAMPEDE_LOG_*` variables; unparsable values are ignored
    pub fn merge_with_env(mut self) -> Self {
        if let Ok(log_dir) = std::env::var("STAMPEDE_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(log_dir));
        }

        if let Ok(file_name) = std::env::var("STAMPEDE_LOG_FILE_NAME") {
            self.file_name = file_name;
        }

        if let Ok(level) = std::env::var("STAMPEDE_LOG_FILE_LEVEL") {
            self.file_log_level = level;
        }

        if let Ok(level) = std::env::var("STAMPEDE_LOG_CONSOLE_LEVEL") {
            self.console_log_level = level;
        }

        if let Ok(enabled) = std::env::var("STAMPEDE_LOG_CONSOLE") {
            self.console_enabled = enabled.parse().unwrap_or(self.console_enabled);
        }

        if let Ok(json) = std::env::var("STAMPEDE_LOG_JSON") {
            self.json_format = json.parse().unwrap_or(self.json_format);
        }

        self
    }
}

/// Guard that must be kept alive for the duration of the application
/// to ensure proper log flushing
pub struct LoggingGuard {
    file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether file output is active
    pub fn has_file_output(&self) -> bool {
        self.file_guard.is_some()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// Fails if the log directory cannot be created or a global subscriber is already
/// installed.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingGuard, StampedeError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir).map_err(|e| {
            StampedeError::configuration_error(format!("Failed to create log directory: {}", e))
        })?;

        let file_appender = tracing_appender::rolling::daily(log_dir, &config.file_name);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        file_guard = Some(guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
            .with_file(true)
            .with_line_number(true)
            .with_target(true);
        let file_filter = filter(&config.file_log_level, "info");

        if config.json_format {
            layers.push(
                file_layer
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(file_filter)
                    .boxed(),
            );
        } else {
            layers.push(file_layer.with_filter(file_filter).boxed());
        }
    }

    if config.console_enabled {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_filter(filter(&config.console_log_level, "warn"));
        layers.push(console_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| {
            StampedeError::configuration_error(format!("Failed to install subscriber: {}", e))
        })?;

    info!(
        log_dir = ?config.log_dir,
        json_format = config.json_format,
        console = config.console_enabled,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        file_guard,
    })
}

/// Build a filter from a directive, falling back to `fallback` when it does not parse
fn filter(directive: &str, fallback: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert!(config.log_dir.is_none());
        assert_eq!(config.file_name, "stampede.log");
        assert!(config.console_enabled);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("STAMPEDE_LOG_FILE_LEVEL", "debug");
        std::env::set_var("STAMPEDE_LOG_JSON", "false");
        std::env::set_var("STAMPEDE_LOG_CONSOLE", "not-a-bool");

        let config = LoggingConfig::from_env();
        assert_eq!(config.file_log_level, "debug");
        assert!(!config.json_format);
        assert!(config.console_enabled);

        std::env::remove_var("STAMPEDE_LOG_FILE_LEVEL");
        std::env::remove_var("STAMPEDE_LOG_JSON");
        std::env::remove_var("STAMPEDE_LOG_CONSOLE");
    }

    #[test]
    fn test_init_logging_writes_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            log_dir: Some(dir.path().join("logs")),
            console_enabled: false,
            ..Default::default()
        };

        // another test may already own the global subscriber
        match init_logging(config) {
            Ok(guard) => assert!(guard.has_file_output()),
            Err(e) => assert!(matches!(e, StampedeError::ConfigurationError { .. })),
        }
        assert!(dir.path().join("logs").is_dir());
    }
}

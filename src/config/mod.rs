//! Configuration management
//!
//! [`StampedeConfig`] gathers the settings of every component. It can be loaded
//! from a TOML, YAML or JSON file, from `STAMPEDE_*` environment variables, or from
//! a file with environment overrides applied on top:
//!
//! ```rust,no_run
//! use stampede::config::StampedeConfig;
//!
//! # fn example() -> Result<(), stampede::config::ConfigError> {
//! let config = StampedeConfig::from_file("stampede.toml")?.merge_with_env()?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```
//!
//! Durations are written in milliseconds in every format.

use serde::{Deserialize, Serialize};
use std::{env, fmt::Display, fs, path::Path, str::FromStr, time::Duration};
use thiserror::Error;

use crate::analysis::AnalyzerConfig;
use crate::coordinator::CoordinatorConfig;
use crate::generator::{GeneratorConfig, MAX_RAMP_STEPS};
use crate::sampler::SamplerConfig;
use crate::telemetry::LoggingConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable parsing error: {0}")]
    EnvVarParse(String),
    #[error("File parsing error: {0}")]
    FileParse(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings for every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StampedeConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StampedeConfig {
    /// Load configuration from a file (supports TOML, YAML, JSON)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path.extension().and_then(|s| s.to_str());

        match extension {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            _ => Err(ConfigError::FileParse(
                "Unsupported file format. Use .toml, .yaml, .yml, or .json".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_with_env()
    }

    /// Apply environment variable overrides (environment takes precedence)
    pub fn merge_with_env(mut self) -> Result<Self, ConfigError> {
        // Generator
        if let Some(steps) = env_parse("STAMPEDE_MAX_RAMP_STEPS")? {
            self.generator.max_ramp_steps = steps;
        }
        if let Some(width) = env_parse("STAMPEDE_WARMUP_CONCURRENCY")? {
            self.generator.warmup_concurrency = width;
        }
        if let Some(ms) = env_parse("STAMPEDE_PROGRESS_INTERVAL_MS")? {
            self.generator.progress_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("STAMPEDE_THROUGHPUT_WINDOW_MS")? {
            self.generator.throughput_window = Duration::from_millis(ms);
        }
        if let Some(enabled) = env_parse("STAMPEDE_SAMPLE_RESOURCES")? {
            self.generator.sample_resources = enabled;
        }

        // Sampler
        if let Some(ms) = env_parse("STAMPEDE_SAMPLER_INTERVAL_MS")? {
            self.sampler.interval = Duration::from_millis(ms);
        }
        if let Some(bytes) = env_parse("STAMPEDE_LEAK_THRESHOLD_BYTES")? {
            self.sampler.leak_threshold_bytes = bytes;
        }

        // Coordinator
        if let Some(workers) = env_parse("STAMPEDE_MAX_WORKERS")? {
            self.coordinator.max_workers = Some(workers);
        }

        // Analyzer
        let thresholds = &mut self.analyzer.thresholds;
        if let Some(percent) = env_parse("STAMPEDE_THROUGHPUT_THRESHOLD")? {
            thresholds.throughput_percent = percent;
        }
        if let Some(percent) = env_parse("STAMPEDE_RESPONSE_TIME_THRESHOLD")? {
            thresholds.response_time_percent = percent;
        }
        if let Some(percent) = env_parse("STAMPEDE_MEMORY_THRESHOLD")? {
            thresholds.memory_percent = percent;
        }
        if let Some(percent) = env_parse("STAMPEDE_ERROR_RATE_THRESHOLD")? {
            thresholds.error_rate_percent = percent;
        }
        if let Some(percent) = env_parse("STAMPEDE_CPU_THRESHOLD")? {
            thresholds.cpu_percent = percent;
        }
        if let Some(window) = env_parse("STAMPEDE_TREND_WINDOW")? {
            self.analyzer.trend_window = window;
        }

        self.logging = self.logging.merge_with_env();

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Generator
        if self.generator.max_ramp_steps == 0 || self.generator.max_ramp_steps > MAX_RAMP_STEPS {
            return Err(ConfigError::Validation(format!(
                "max_ramp_steps must be between 1 and {}",
                MAX_RAMP_STEPS
            )));
        }
        if self.generator.warmup_concurrency == 0 {
            return Err(ConfigError::Validation(
                "warmup_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.generator.event_buffer == 0 {
            return Err(ConfigError::Validation(
                "event_buffer must be greater than 0".to_string(),
            ));
        }
        if self.generator.progress_interval.is_zero() || self.generator.throughput_window.is_zero()
        {
            return Err(ConfigError::Validation(
                "Generator intervals must be greater than 0".to_string(),
            ));
        }

        // Sampler
        if self.sampler.interval.is_zero() {
            return Err(ConfigError::Validation(
                "Sampler interval must be greater than 0".to_string(),
            ));
        }
        if self.sampler.leak_window == 0 {
            return Err(ConfigError::Validation(
                "leak_window must be greater than 0".to_string(),
            ));
        }

        // Coordinator
        if self.coordinator.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.coordinator.thread_name_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "thread_name_prefix cannot be empty".to_string(),
            ));
        }

        // Analyzer
        let thresholds = &self.analyzer.thresholds;
        for (name, value) in [
            ("throughput_percent", thresholds.throughput_percent),
            ("response_time_percent", thresholds.response_time_percent),
            ("memory_percent", thresholds.memory_percent),
            ("error_rate_percent", thresholds.error_rate_percent),
            ("cpu_percent", thresholds.cpu_percent),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Regression threshold {} must be a positive number",
                    name
                )));
            }
        }
        if !self.analyzer.improvement_threshold_percent.is_finite()
            || self.analyzer.improvement_threshold_percent < 0.0
        {
            return Err(ConfigError::Validation(
                "improvement_threshold_percent cannot be negative".to_string(),
            ));
        }
        if self.analyzer.trend_window < 3 {
            return Err(ConfigError::Validation(
                "trend_window must be at least 3".to_string(),
            ));
        }
        if self.analyzer.trend_slope_threshold < 0.0 {
            return Err(ConfigError::Validation(
                "trend_slope_threshold cannot be negative".to_string(),
            ));
        }
        let limits = &self.analyzer.bottlenecks;
        if limits.memory_bytes == 0
            || limits.cpu_percent <= 0.0
            || limits.response_time_ms <= 0.0
            || limits.error_rate <= 0.0
        {
            return Err(ConfigError::Validation(
                "Bottleneck limits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable if it is set
fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::EnvVarParse(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = StampedeConfig::default();
        assert_eq!(config.generator.max_ramp_steps, 10);
        assert_eq!(config.sampler.interval, Duration::from_millis(1000));
        assert_eq!(config.analyzer.thresholds.throughput_percent, 10.0);
        assert_eq!(config.analyzer.thresholds.error_rate_percent, 25.0);
        assert!(config.coordinator.max_workers.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = StampedeConfig::default();
        config.coordinator.max_workers = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = StampedeConfig::default();
        config.analyzer.thresholds.memory_percent = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = StampedeConfig::default();
        config.analyzer.trend_window = 2;
        assert!(config.validate().is_err());

        let mut config = StampedeConfig::default();
        config.generator.max_ramp_steps = 1 << 32;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.generator.max_ramp_steps = MAX_RAMP_STEPS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_config_loading() {
        let toml_content = r#"
[generator]
max_ramp_steps = 5
progress_interval = 250
sample_resources = false

[sampler]
interval = 500

[coordinator]
max_workers = 8

[analyzer]
trend_window = 6

[analyzer.thresholds]
throughput_percent = 15.0
"#;

        let temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        std::fs::write(temp_file.path(), toml_content).unwrap();

        let config = StampedeConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.generator.max_ramp_steps, 5);
        assert_eq!(config.generator.progress_interval, Duration::from_millis(250));
        assert!(!config.generator.sample_resources);
        assert_eq!(config.sampler.interval, Duration::from_millis(500));
        assert_eq!(config.coordinator.max_workers, Some(8));
        assert_eq!(config.analyzer.trend_window, 6);
        assert_eq!(config.analyzer.thresholds.throughput_percent, 15.0);
        // unspecified fields keep their defaults
        assert_eq!(config.analyzer.thresholds.memory_percent, 20.0);
    }

    #[test]
    fn test_yaml_and_json_loading() {
        let yaml = NamedTempFile::with_suffix(".yaml").unwrap();
        std::fs::write(yaml.path(), "generator:\n  warmup_concurrency: 2\n").unwrap();
        let config = StampedeConfig::from_file(yaml.path()).unwrap();
        assert_eq!(config.generator.warmup_concurrency, 2);

        let json = NamedTempFile::with_suffix(".json").unwrap();
        std::fs::write(json.path(), r#"{"sampler": {"leak_window": 3}}"#).unwrap();
        let config = StampedeConfig::from_file(json.path()).unwrap();
        assert_eq!(config.sampler.leak_window, 3);
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_file = NamedTempFile::with_suffix(".ini").unwrap();
        std::fs::write(temp_file.path(), "x=1").unwrap();
        assert!(matches!(
            StampedeConfig::from_file(temp_file.path()),
            Err(ConfigError::FileParse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            StampedeConfig::from_file("/nonexistent/stampede.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_env_var_loading() {
        env::set_var("STAMPEDE_MAX_WORKERS", "3");
        env::set_var("STAMPEDE_RESPONSE_TIME_THRESHOLD", "12.5");
        env::set_var("STAMPEDE_SAMPLER_INTERVAL_MS", "200");

        let config = StampedeConfig::from_env().unwrap();
        assert_eq!(config.coordinator.max_workers, Some(3));
        assert_eq!(config.analyzer.thresholds.response_time_percent, 12.5);
        assert_eq!(config.sampler.interval, Duration::from_millis(200));

        env::set_var("STAMPEDE_MAX_WORKERS", "many");
        assert!(matches!(
            StampedeConfig::from_env(),
            Err(ConfigError::EnvVarParse(_))
        ));

        // Clean up
        env::remove_var("STAMPEDE_MAX_WORKERS");
        env::remove_var("STAMPEDE_RESPONSE_TIME_THRESHOLD");
        env::remove_var("STAMPEDE_SAMPLER_INTERVAL_MS");
    }

    #[test]
    fn test_config_error_converts() {
        let error: crate::StampedeError = ConfigError::Validation("bad".into()).into();
        assert!(error.is_user_error());
    }
}

//! Load test specification and schedule resolution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StampedeError;
use crate::utils::duration_millis;

/// Describes one load test run.
///
/// Exactly one of `concurrency` and `requests_per_second` must be set. Both fields
/// are kept optional so specs can be loaded from configuration files; call
/// [`LoadTestSpec::validate`] to resolve them into a [`Schedule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestSpec {
    /// Human readable run name, carried into the report
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of requests kept in flight during the sustained phase
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Fixed arrival rate during the sustained phase
    #[serde(default)]
    pub requests_per_second: Option<f64>,
    /// Length of the sustained-load phase
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Time spent stepping up to the target load
    #[serde(with = "duration_millis", default)]
    pub ramp_up: Duration,
    /// Grace period for in-flight requests once admissions stop
    #[serde(with = "duration_millis", default)]
    pub ramp_down: Duration,
    /// Per-request deadline
    #[serde(with = "duration_millis", default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Requests issued before measurement starts
    #[serde(default)]
    pub warmup_requests: Option<usize>,
    /// Requests issued after measurement ends
    #[serde(default)]
    pub cooldown_requests: Option<usize>,
    /// Optional cap on outstanding requests in rate mode
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

/// A validated scheduling mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Schedule {
    /// Keep `concurrency` requests outstanding
    Concurrency { concurrency: usize },
    /// Issue `requests_per_second` requests per second regardless of completions
    Rate { requests_per_second: f64 },
}

impl Schedule {
    /// Target level during the sustained phase, as a float
    pub fn target_level(&self) -> f64 {
        match self {
            Schedule::Concurrency { concurrency } => *concurrency as f64,
            Schedule::Rate {
                requests_per_second,
            } => *requests_per_second,
        }
    }
}

impl LoadTestSpec {
    /// Create a concurrency-mode spec
    pub fn concurrency(name: impl Into<String>, concurrency: usize, duration: Duration) -> Self {
        Self {
            name: name.into(),
            concurrency: Some(concurrency),
            requests_per_second: None,
            duration,
            ramp_up: Duration::ZERO,
            ramp_down: Duration::ZERO,
            request_timeout: default_request_timeout(),
            warmup_requests: None,
            cooldown_requests: None,
            max_in_flight: None,
        }
    }

    /// Create a rate-mode spec
    pub fn rate(name: impl Into<String>, requests_per_second: f64, duration: Duration) -> Self {
        Self {
            concurrency: None,
            requests_per_second: Some(requests_per_second),
            ..Self::concurrency(name, 0, duration)
        }
    }

    pub fn with_ramp_up(mut self, ramp_up: Duration) -> Self {
        self.ramp_up = ramp_up;
        self
    }

    pub fn with_ramp_down(mut self, ramp_down: Duration) -> Self {
        self.ramp_down = ramp_down;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_warmup(mut self, requests: usize) -> Self {
        self.warmup_requests = Some(requests);
        self
    }

    pub fn with_cooldown(mut self, requests: usize) -> Self {
        self.cooldown_requests = Some(requests);
        self
    }

    pub fn with_max_in_flight(mut self, cap: usize) -> Self {
        self.max_in_flight = Some(cap);
        self
    }

    /// Check the spec and resolve its scheduling mode
    pub fn validate(&self) -> Result<Schedule, StampedeError> {
        let schedule = match (self.concurrency, self.requests_per_second) {
            (Some(_), Some(_)) => {
                return Err(StampedeError::invalid_spec(
                    "concurrency and requests_per_second are mutually exclusive",
                ))
            }
            (None, None) => {
                return Err(StampedeError::invalid_spec(
                    "either concurrency or requests_per_second must be set",
                ))
            }
            (Some(concurrency), None) => Schedule::Concurrency { concurrency },
            (None, Some(rate)) => {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(StampedeError::invalid_spec(format!(
                        "requests_per_second must be a positive number, got {}",
                        rate
                    )));
                }
                Schedule::Rate {
                    requests_per_second: rate,
                }
            }
        };

        if self.duration.is_zero() {
            return Err(StampedeError::invalid_spec(
                "duration must be greater than zero",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(StampedeError::invalid_spec(
                "request_timeout must be greater than zero",
            ));
        }
        if self.max_in_flight == Some(0) {
            return Err(StampedeError::invalid_spec(
                "max_in_flight must be greater than zero when set",
            ));
        }

        Ok(schedule)
    }
}

fn default_name() -> String {
    "load-test".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

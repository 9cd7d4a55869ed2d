//! Error types for load generation and baseline analysis
//!
//! Stampede distinguishes between errors that abort a call and failures that are
//! simply recorded as data:
//!
//! - **Invalid Spec** - A [`LoadTestSpec`](crate::types::LoadTestSpec) that cannot be
//!   executed. Raised synchronously before any load is generated.
//! - **Baseline Not Found** - An analysis referenced a baseline name that was never
//!   registered. Fatal to that analysis call only.
//! - **Worker Failure** - A distributed worker crashed or never reported back. The
//!   coordinator logs it and degrades the aggregate instead of aborting the run.
//! - **Request failures and timeouts** - Never surface as [`StampedeError`]. They are
//!   captured as [`RequestError`] values and folded into
//!   [`RequestOutcome`](crate::types::RequestOutcome) records.
//!
//! # Quick Start
//!
//! ```rust
//! use stampede::error::StampedeError;
//!
//! fn handle(error: StampedeError) {
//!     match error {
//!         _ if error.is_user_error() => eprintln!("fix the input: {}", error),
//!         StampedeError::WorkerFailure { worker, .. } => {
//!             eprintln!("worker {} crashed; results are partial", worker)
//!         }
//!         _ => eprintln!("unexpected error: {}", error),
//!     }
//! }
//! # handle(StampedeError::invalid_spec("duration must be greater than zero"));
//! ```

use thiserror::Error;

/// Main error type for the Stampede library
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StampedeError {
    /// The load test specification cannot be executed
    #[error("Invalid load test spec: {message}")]
    InvalidSpec { message: String },

    /// No baseline is registered under the requested name
    #[error("Baseline not found: {name}")]
    BaselineNotFound { name: String },

    /// A distributed worker terminated abnormally
    #[error("Worker {worker} failed: {message}")]
    WorkerFailure { worker: usize, message: String },

    /// Configuration errors (invalid files, environment overrides, etc.)
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    /// File system errors
    #[error("IO error: {message}")]
    IoError { message: String },
}

impl StampedeError {
    /// Create an InvalidSpec error
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    /// Create a BaselineNotFound error
    pub fn baseline_not_found(name: impl Into<String>) -> Self {
        Self::BaselineNotFound { name: name.into() }
    }

    /// Create a WorkerFailure error
    pub fn worker_failure(worker: usize, message: impl Into<String>) -> Self {
        Self::WorkerFailure {
            worker,
            message: message.into(),
        }
    }

    /// Create a ConfigurationError
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Check if this error is caused by caller-provided input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StampedeError::InvalidSpec { .. }
                | StampedeError::BaselineNotFound { .. }
                | StampedeError::ConfigurationError { .. }
        )
    }

    /// Check if this error prevents a run from producing a report
    ///
    /// Worker failures only degrade the aggregate, so they are not fatal.
    pub fn is_fatal_to_run(&self) -> bool {
        !matches!(self, StampedeError::WorkerFailure { .. })
    }
}

impl From<serde_json::Error> for StampedeError {
    fn from(error: serde_json::Error) -> Self {
        StampedeError::SerializationError {
            message: error.to_string(),
        }
    }
}

impl From<std::io::Error> for StampedeError {
    fn from(error: std::io::Error) -> Self {
        StampedeError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<crate::config::ConfigError> for StampedeError {
    fn from(error: crate::config::ConfigError) -> Self {
        StampedeError::ConfigurationError {
            message: error.to_string(),
        }
    }
}

/// Why a single request did not succeed
///
/// These never propagate to the caller of a load test; they are rendered into the
/// `error` field of the corresponding outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The target operation returned an error
    #[error("request failed: {0}")]
    Failed(String),

    /// The target operation panicked
    #[error("request panicked: {0}")]
    Panicked(String),

    /// The per-request deadline elapsed before the target settled
    #[error("request timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    /// The worker that owned the request terminated abnormally
    #[error("worker {worker} terminated before reporting: {message}")]
    WorkerLost { worker: usize, message: String },
}

impl RequestError {
    /// Whether this error represents a timeout rather than a failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::TimedOut { .. })
    }
}

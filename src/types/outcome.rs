//! Per-request outcome records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RequestError;

/// How a single request settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    TimedOut,
}

/// One call to the target operation
///
/// `ended_at` is always derived from `started_at + duration`, so the two timestamps
/// and the duration never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: Duration,
    pub status: OutcomeStatus,
    pub error: Option<String>,
}

impl RequestOutcome {
    /// Record a successful call
    pub fn success(id: u64, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self::settled(id, started_at, duration, OutcomeStatus::Success, None)
    }

    /// Record a call that failed or timed out
    pub fn failure(
        id: u64,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: &RequestError,
    ) -> Self {
        let status = if error.is_timeout() {
            OutcomeStatus::TimedOut
        } else {
            OutcomeStatus::Failed
        };
        Self::settled(id, started_at, duration, status, Some(error.to_string()))
    }

    fn settled(
        id: u64,
        started_at: DateTime<Utc>,
        duration: Duration,
        status: OutcomeStatus,
        error: Option<String>,
    ) -> Self {
        let elapsed = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            id,
            started_at,
            ended_at: started_at + elapsed,
            duration,
            status,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == OutcomeStatus::TimedOut
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// Duration in fractional milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

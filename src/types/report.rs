//! Aggregated run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use super::{LeakReport, ResourceSample, Schedule};

/// Latency distribution of successful requests, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    /// Latencies beyond the outlier z-score
    #[serde(default)]
    pub outliers: usize,
    /// Correlation between request start time and latency, in `[-1, 1]`
    ///
    /// Values near 1 mean requests got slower as the run went on.
    #[serde(default)]
    pub drift: f64,
}

/// Completions per fixed time window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    /// Recorded requests divided by the measured wall-clock time
    pub requests_per_second: f64,
    pub window_ms: u64,
    pub windows: usize,
    pub min_per_window: usize,
    pub max_per_window: usize,
    pub avg_per_window: f64,
}

/// Process memory at the start, peak and end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub start_bytes: u64,
    pub peak_bytes: u64,
    pub end_bytes: u64,
}

/// Immutable summary of one load test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestReport {
    pub run_id: Uuid,
    pub name: String,
    pub schedule: Schedule,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall-clock time of the measured phases
    pub elapsed: Duration,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub timed_out_requests: usize,
    /// Requests still in flight when ramp-down ended; not part of `total_requests`
    pub abandoned_requests: usize,
    /// Rate-mode arrivals dropped because `max_in_flight` was reached
    pub skipped_requests: usize,
    /// `(failed + timed_out) / total`, in `[0, 1]`
    pub error_rate: f64,
    pub latency: LatencyStats,
    pub throughput: ThroughputStats,
    pub memory: MemoryStats,
    /// Distinct error messages and how often each occurred
    pub errors: BTreeMap<String, usize>,
    pub resource_samples: Vec<ResourceSample>,
    pub memory_leak: Option<LeakReport>,
}

impl LoadTestReport {
    /// Whether the outcome counters add up
    pub fn is_consistent(&self) -> bool {
        self.total_requests
            == self.successful_requests + self.failed_requests + self.timed_out_requests
    }

    /// Success ratio in `[0, 1]`; 1.0 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

//! Turning raw outcomes into a [`LoadTestReport`].
//!
//! Shared by the single-process generator and the coordinator, which rebuilds the
//! global report from the concatenated worker outcomes.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::metrics::{latency_drift, latency_stats, throughput_over_time};
use crate::types::{
    LeakReport, LoadTestReport, MemoryStats, RequestOutcome, ResourceSample, RunId, Schedule,
};

/// Everything needed to summarise a run
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    pub run_id: RunId,
    pub name: String,
    pub schedule: Schedule,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcomes: &'a [RequestOutcome],
    pub abandoned_requests: usize,
    pub skipped_requests: usize,
    pub resource_samples: Vec<ResourceSample>,
    pub memory_leak: Option<LeakReport>,
    pub throughput_window: Duration,
}

/// Compute the report for a finished run
pub fn build_report(input: ReportInput<'_>) -> LoadTestReport {
    let outcomes = input.outcomes;
    let total_requests = outcomes.len();
    let successful_requests = outcomes.iter().filter(|o| o.is_success()).count();
    let timed_out_requests = outcomes.iter().filter(|o| o.is_timed_out()).count();
    let failed_requests = total_requests - successful_requests - timed_out_requests;

    let error_rate = if total_requests == 0 {
        0.0
    } else {
        (failed_requests + timed_out_requests) as f64 / total_requests as f64
    };

    let latencies: Vec<f64> = outcomes
        .iter()
        .filter(|o| o.is_success())
        .map(RequestOutcome::duration_ms)
        .collect();

    let mut latency = latency_stats(&latencies);
    latency.drift = latency_drift(outcomes);

    let mut throughput = throughput_over_time(outcomes, input.throughput_window);
    let elapsed_secs = input.elapsed.as_secs_f64();
    throughput.requests_per_second = if elapsed_secs > 0.0 {
        total_requests as f64 / elapsed_secs
    } else {
        0.0
    };

    let mut errors = BTreeMap::new();
    for message in outcomes.iter().filter_map(|o| o.error.as_ref()) {
        *errors.entry(message.clone()).or_insert(0) += 1;
    }

    LoadTestReport {
        run_id: input.run_id,
        name: input.name,
        schedule: input.schedule,
        started_at: input.started_at,
        finished_at: input.finished_at,
        elapsed: input.elapsed,
        total_requests,
        successful_requests,
        failed_requests,
        timed_out_requests,
        abandoned_requests: input.abandoned_requests,
        skipped_requests: input.skipped_requests,
        error_rate,
        latency,
        throughput,
        memory: memory_stats(&input.resource_samples),
        errors,
        resource_samples: input.resource_samples,
        memory_leak: input.memory_leak,
    }
}

/// First, highest and last resident memory of a sample series
pub fn memory_stats(samples: &[ResourceSample]) -> MemoryStats {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => MemoryStats {
            start_bytes: first.memory_bytes,
            peak_bytes: samples.iter().map(|s| s.memory_bytes).max().unwrap_or(0),
            end_bytes: last.memory_bytes,
        },
        _ => MemoryStats::default(),
    }
}

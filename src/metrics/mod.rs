//! Pure statistical functions shared by report building and baseline analysis
//!
//! Everything in this module is side-effect free. The report builder uses it to
//! turn raw [`RequestOutcome`]s into a [`LoadTestReport`]: percentiles, outlier
//! counts, latency drift and throughput windows. The analyzer's trend fit uses the
//! same [`mean`].
//!
//! # Percentiles
//!
//! [`percentile`] expects its input sorted ascending and interpolates linearly
//! between the two bracketing ranks:
//!
//! ```rust
//! use stampede::metrics::percentile;
//!
//! let sorted = [10.0, 20.0, 30.0, 40.0];
//! assert_eq!(percentile(&sorted, 50.0), 25.0);
//! assert_eq!(percentile(&sorted, 100.0), 40.0);
//! ```
//!
//! [`LoadTestReport`]: crate::types::LoadTestReport

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{LatencyStats, RequestOutcome, ThroughputStats};

/// Default z-score above which a value counts as an outlier
pub const DEFAULT_OUTLIER_Z: f64 = 2.5;

/// Default throughput bucket width
pub const DEFAULT_THROUGHPUT_WINDOW: Duration = Duration::from_millis(1000);

/// Value at percentile `p` (0-100) of an ascending-sorted slice
///
/// Uses rank `p / 100 * (n - 1)` with linear interpolation between the neighbouring
/// ranks. Ranks past the end clamp to the last element. Returns 0.0 for an empty
/// slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let last = sorted.len() - 1;
    let rank = (p.max(0.0) / 100.0) * last as f64;
    let lower = rank.floor() as usize;
    if lower >= last {
        return sorted[last];
    }
    let upper = lower + 1;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation (divides by `n`, not `n - 1`)
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// A value flagged by [`outliers`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    pub index: usize,
    pub value: f64,
    pub z_score: f64,
}

/// Entries whose `|x - mean| / stddev` exceeds `z_threshold`
///
/// A constant series has no outliers.
pub fn outliers(values: &[f64], z_threshold: f64) -> Vec<Outlier> {
    let std_dev = standard_deviation(values);
    if std_dev == 0.0 {
        return Vec::new();
    }
    let avg = mean(values);
    values
        .iter()
        .enumerate()
        .filter_map(|(index, &value)| {
            let z_score = (value - avg).abs() / std_dev;
            (z_score > z_threshold).then_some(Outlier {
                index,
                value,
                z_score,
            })
        })
        .collect()
}

/// Pearson correlation coefficient
///
/// Returns 0.0 when the lengths differ, the input is empty, or either series has
/// zero variance.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }
    let mean_x = mean(x);
    let mean_y = mean(y);
    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        covariance / denominator
    }
}

/// Bucket completions into fixed windows and summarise the per-window counts
///
/// Windows are measured from the earliest request start. Empty windows between the
/// first and last completion count as zero. `requests_per_second` is left at 0.0;
/// callers that know the wall-clock duration fill it in.
pub fn throughput_over_time(outcomes: &[RequestOutcome], window: Duration) -> ThroughputStats {
    let window_ms = window.as_millis().max(1) as i64;
    let origin = match outcomes.iter().map(|o| o.started_at).min() {
        Some(origin) => origin,
        None => {
            return ThroughputStats {
                window_ms: window_ms as u64,
                ..Default::default()
            }
        }
    };

    let mut buckets: Vec<usize> = Vec::new();
    for outcome in outcomes {
        let offset = (outcome.ended_at - origin).num_milliseconds().max(0);
        let index = (offset / window_ms) as usize;
        if buckets.len() <= index {
            buckets.resize(index + 1, 0);
        }
        buckets[index] += 1;
    }

    ThroughputStats {
        requests_per_second: 0.0,
        window_ms: window_ms as u64,
        windows: buckets.len(),
        min_per_window: buckets.iter().copied().min().unwrap_or(0),
        max_per_window: buckets.iter().copied().max().unwrap_or(0),
        avg_per_window: outcomes.len() as f64 / buckets.len() as f64,
    }
}

/// Correlation between start offset and latency over successful outcomes
///
/// 0.0 when fewer than two requests succeeded.
pub fn latency_drift(outcomes: &[RequestOutcome]) -> f64 {
    let successes: Vec<&RequestOutcome> = outcomes.iter().filter(|o| o.is_success()).collect();
    let Some(origin) = successes.iter().map(|o| o.started_at).min() else {
        return 0.0;
    };
    let offsets: Vec<f64> = successes
        .iter()
        .map(|o| (o.started_at - origin).num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0)
        .collect();
    let latencies: Vec<f64> = successes.iter().map(|o| o.duration_ms()).collect();
    correlation(&offsets, &latencies)
}

/// Summarise a set of latencies given in milliseconds
///
/// `drift` needs start times and is left at 0.0; see [`latency_drift`].
pub fn latency_stats(latencies_ms: &[f64]) -> LatencyStats {
    if latencies_ms.is_empty() {
        return LatencyStats::default();
    }
    let mut sorted = latencies_ms.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    LatencyStats {
        min_ms: sorted[0],
        max_ms: sorted[sorted.len() - 1],
        mean_ms: mean(&sorted),
        std_dev_ms: standard_deviation(&sorted),
        p50_ms: percentile(&sorted, 50.0),
        p90_ms: percentile(&sorted, 90.0),
        p95_ms: percentile(&sorted, 95.0),
        p99_ms: percentile(&sorted, 99.0),
        outliers: outliers(&sorted, DEFAULT_OUTLIER_Z).len(),
        drift: 0.0,
    }
}

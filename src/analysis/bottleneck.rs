//! Absolute-threshold bottleneck heuristics.

use serde::{Deserialize, Serialize};

use super::baseline::MeasurementSet;
use super::regression::Severity;

/// Limits above which a measurement is flagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckThresholds {
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: u64,
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,
    #[serde(default = "default_response_time_ms")]
    pub response_time_ms: f64,
    /// Fraction of failed requests, in `[0, 1]`
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            memory_bytes: default_memory_bytes(),
            cpu_percent: default_cpu_percent(),
            response_time_ms: default_response_time_ms(),
            error_rate: default_error_rate(),
        }
    }
}

fn default_memory_bytes() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_cpu_percent() -> f64 {
    80.0
}

fn default_response_time_ms() -> f64 {
    1000.0
}

fn default_error_rate() -> f64 {
    0.05
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    Memory,
    Cpu,
    ResponseTime,
    ErrorRate,
}

impl BottleneckKind {
    pub fn recommendation(&self) -> &'static str {
        match self {
            BottleneckKind::Memory => {
                "Reduce allocations on the hot path, bound caches and check for retained buffers"
            }
            BottleneckKind::Cpu => {
                "Profile CPU hot spots and move blocking or compute-heavy work off the request path"
            }
            BottleneckKind::ResponseTime => {
                "Inspect slow dependencies, add caching or batching and review timeout budgets"
            }
            BottleneckKind::ErrorRate => {
                "Investigate the dominant error messages and add retries or backpressure where appropriate"
            }
        }
    }
}

/// A measurement above its absolute limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    /// Name of the measurement that tripped the limit
    pub source: String,
    pub value: f64,
    pub limit: f64,
    pub severity: Severity,
    pub recommendation: String,
}

/// Severity from how far a value exceeds its limit
pub fn bottleneck_severity(value: f64, limit: f64) -> Severity {
    if limit <= 0.0 {
        return Severity::Critical;
    }
    let ratio = value / limit;
    if ratio >= 2.0 {
        Severity::Critical
    } else if ratio >= 1.5 {
        Severity::High
    } else if ratio >= 1.2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Flag every measurement above its limit, most severe first
pub fn detect_bottlenecks(
    measurements: &MeasurementSet,
    thresholds: &BottleneckThresholds,
) -> Vec<Bottleneck> {
    let mut found = Vec::new();
    let memory_limit = thresholds.memory_bytes as f64;

    for benchmark in &measurements.benchmarks {
        check(
            &mut found,
            BottleneckKind::Memory,
            &benchmark.name,
            benchmark.memory_bytes as f64,
            memory_limit,
        );
    }

    for load_test in &measurements.load_tests {
        check(
            &mut found,
            BottleneckKind::Memory,
            &load_test.name,
            load_test.peak_memory_bytes as f64,
            memory_limit,
        );
        check(
            &mut found,
            BottleneckKind::ResponseTime,
            &load_test.name,
            load_test.average_response_time_ms,
            thresholds.response_time_ms,
        );
        check(
            &mut found,
            BottleneckKind::ErrorRate,
            &load_test.name,
            load_test.error_rate,
            thresholds.error_rate,
        );
    }

    for system in &measurements.system_metrics {
        check(
            &mut found,
            BottleneckKind::Memory,
            &system.name,
            system.memory_bytes as f64,
            memory_limit,
        );
        check(
            &mut found,
            BottleneckKind::Cpu,
            &system.name,
            system.cpu_percent,
            thresholds.cpu_percent,
        );
    }

    found.sort_by(|a, b| b.severity.cmp(&a.severity));
    found
}

fn check(found: &mut Vec<Bottleneck>, kind: BottleneckKind, source: &str, value: f64, limit: f64) {
    if value > limit {
        found.push(Bottleneck {
            kind,
            source: source.to_string(),
            value,
            limit,
            severity: bottleneck_severity(value, limit),
            recommendation: kind.recommendation().to_string(),
        });
    }
}

//! Baselines and the measurements they hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::metrics::mean;
use crate::types::{LoadTestReport, ResourceSample};

/// A micro-benchmark result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMeasurement {
    pub name: String,
    pub average_time_ms: f64,
    pub operations_per_second: f64,
    pub memory_bytes: u64,
}

/// The headline figures of a load test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestMeasurement {
    pub name: String,
    pub throughput_rps: f64,
    pub average_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub p99_response_time_ms: f64,
    /// Fraction of requests that failed or timed out, in `[0, 1]`
    pub error_rate: f64,
    pub peak_memory_bytes: u64,
}

impl From<&LoadTestReport> for LoadTestMeasurement {
    fn from(report: &LoadTestReport) -> Self {
        Self {
            name: report.name.clone(),
            throughput_rps: report.throughput.requests_per_second,
            average_response_time_ms: report.latency.mean_ms,
            p95_response_time_ms: report.latency.p95_ms,
            p99_response_time_ms: report.latency.p99_ms,
            error_rate: report.error_rate,
            peak_memory_bytes: report.memory.peak_bytes,
        }
    }
}

/// Host resource usage while something ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMeasurement {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub load_average: f64,
}

impl SystemMeasurement {
    /// Average a resource series: mean CPU, mean memory, mean one-minute load
    pub fn from_samples(name: impl Into<String>, samples: &[ResourceSample]) -> Self {
        let cpu: Vec<f64> = samples.iter().map(|s| s.cpu_percent).collect();
        let memory: Vec<f64> = samples.iter().map(|s| s.memory_bytes as f64).collect();
        let load: Vec<f64> = samples.iter().map(|s| s.load_average.one).collect();
        Self {
            name: name.into(),
            cpu_percent: mean(&cpu),
            memory_bytes: mean(&memory).round() as u64,
            load_average: mean(&load),
        }
    }
}

/// Everything measured for one build or run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSet {
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkMeasurement>,
    #[serde(default)]
    pub load_tests: Vec<LoadTestMeasurement>,
    #[serde(default)]
    pub system_metrics: Vec<SystemMeasurement>,
}

impl MeasurementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_benchmark(mut self, benchmark: BenchmarkMeasurement) -> Self {
        self.benchmarks.push(benchmark);
        self
    }

    pub fn with_load_test(mut self, load_test: LoadTestMeasurement) -> Self {
        self.load_tests.push(load_test);
        self
    }

    pub fn with_system_metrics(mut self, system: SystemMeasurement) -> Self {
        self.system_metrics.push(system);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty() && self.load_tests.is_empty() && self.system_metrics.is_empty()
    }
}

/// A named reference point that later measurements are compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub measurements: MeasurementSet,
}

impl Baseline {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        measurements: MeasurementSet,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            created_at: Utc::now(),
            measurements,
        }
    }
}

/// Baselines keyed by name; storing under an existing name replaces it
#[derive(Debug, Clone, Default)]
pub struct BaselineStore {
    baselines: HashMap<String, Baseline>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a baseline, returning the one it replaced
    pub fn insert(&mut self, baseline: Baseline) -> Option<Baseline> {
        self.baselines.insert(baseline.name.clone(), baseline)
    }

    /// Store a baseline and return a reference to the stored copy
    pub fn upsert(&mut self, baseline: Baseline) -> &Baseline {
        match self.baselines.entry(baseline.name.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(baseline);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(baseline),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Baseline> {
        self.baselines.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Baseline> {
        self.baselines.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.baselines.contains_key(name)
    }

    /// Stored names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.baselines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    pub fn clear(&mut self) {
        self.baselines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoadAverage;

    fn measurements(ops: f64) -> MeasurementSet {
        MeasurementSet::new().with_benchmark(BenchmarkMeasurement {
            name: "parse".into(),
            average_time_ms: 1.0,
            operations_per_second: ops,
            memory_bytes: 1024,
        })
    }

    #[test]
    fn test_store_last_write_wins() {
        let mut store = BaselineStore::new();
        assert!(store.insert(Baseline::new("main", "1.0", measurements(10.0))).is_none());
        let replaced = store.insert(Baseline::new("main", "1.1", measurements(20.0)));

        assert_eq!(replaced.unwrap().version, "1.0");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("main").unwrap().version, "1.1");
    }

    #[test]
    fn test_store_names_sorted_and_clear() {
        let mut store = BaselineStore::new();
        store.insert(Baseline::new("b", "1", MeasurementSet::new()));
        store.insert(Baseline::new("a", "1", MeasurementSet::new()));
        assert_eq!(store.names(), vec!["a", "b"]);

        store.clear();
        assert!(store.is_empty());
        assert!(!store.contains("a"));
    }

    #[test]
    fn test_system_measurement_from_samples() {
        let samples: Vec<ResourceSample> = [(10.0, 100u64, 1.0), (30.0, 300, 3.0)]
            .iter()
            .map(|(cpu, memory, load)| ResourceSample {
                timestamp: Utc::now(),
                cpu_percent: *cpu,
                memory_bytes: *memory,
                load_average: LoadAverage {
                    one: *load,
                    five: 0.0,
                    fifteen: 0.0,
                },
            })
            .collect();

        let system = SystemMeasurement::from_samples("host", &samples);
        assert_eq!(system.cpu_percent, 20.0);
        assert_eq!(system.memory_bytes, 200);
        assert_eq!(system.load_average, 2.0);
    }
}

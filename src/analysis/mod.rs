//! Baseline comparison, regression classification and trend analysis
//!
//! A [`PerformanceAnalyzer`] stores named [`Baseline`]s and compares new
//! [`MeasurementSet`]s against them. Every comparison produces an
//! [`AnalysisResult`] that lists:
//!
//! - **Regressions**: metrics that moved the wrong way by more than their threshold
//! - **Improvements**: metrics that moved the right way by more than 5%
//! - **Trends**: least-squares fits over the values seen for each metric so far
//! - **Bottlenecks**: current values above absolute limits
//! - **Overall score**: a 0-100 summary of the above
//!
//! Results are appended to the analyzer's history. Both the baselines and the
//! history live in the analyzer; callers that share one serialise access to it.
//!
//! ```rust
//! use stampede::analysis::{
//!     AnalyzerConfig, LoadTestMeasurement, MeasurementSet, PerformanceAnalyzer, Severity,
//! };
//!
//! let measurement = |rps| LoadTestMeasurement {
//!     name: "checkout".to_string(),
//!     throughput_rps: rps,
//!     average_response_time_ms: 12.0,
//!     p95_response_time_ms: 30.0,
//!     p99_response_time_ms: 55.0,
//!     error_rate: 0.0,
//!     peak_memory_bytes: 64 * 1024 * 1024,
//! };
//!
//! let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
//! analyzer.create_baseline("main", "1.4.0", MeasurementSet::new().with_load_test(measurement(1000.0)));
//!
//! let result = analyzer
//!     .analyze("main", &MeasurementSet::new().with_load_test(measurement(500.0)))
//!     .unwrap();
//! assert_eq!(result.regressions[0].severity, Severity::Critical);
//! ```

pub mod baseline;
pub mod bottleneck;
pub mod regression;
pub mod trend;

pub use baseline::{
    Baseline, BaselineStore, BenchmarkMeasurement, LoadTestMeasurement, MeasurementSet,
    SystemMeasurement,
};
pub use bottleneck::{detect_bottlenecks, Bottleneck, BottleneckKind, BottleneckThresholds};
pub use regression::{
    classify_severity, classify_significance, compare_metric, overall_score, percent_change,
    Comparison, ImprovementFinding, MetricCategory, MetricKind, MetricSample, RegressionFinding,
    RegressionThresholds, Severity, Significance,
};
pub use trend::{analyze_trend, linear_regression, TrendAnalysis, TrendDirection};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::error::StampedeError;
use crate::Result as StampedeResult;
use regression::DEFAULT_IMPROVEMENT_THRESHOLD_PERCENT;
use trend::{DEFAULT_SLOPE_THRESHOLD, DEFAULT_TREND_WINDOW};

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub thresholds: RegressionThresholds,
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold_percent: f64,
    /// Most recent points used for trend fits
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    #[serde(default = "default_slope_threshold")]
    pub trend_slope_threshold: f64,
    #[serde(default)]
    pub bottlenecks: BottleneckThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            thresholds: RegressionThresholds::default(),
            improvement_threshold_percent: default_improvement_threshold(),
            trend_window: default_trend_window(),
            trend_slope_threshold: default_slope_threshold(),
            bottlenecks: BottleneckThresholds::default(),
        }
    }
}

fn default_improvement_threshold() -> f64 {
    DEFAULT_IMPROVEMENT_THRESHOLD_PERCENT
}

fn default_trend_window() -> usize {
    DEFAULT_TREND_WINDOW
}

fn default_slope_threshold() -> f64 {
    DEFAULT_SLOPE_THRESHOLD
}

/// Outcome of one comparison against a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub baseline_name: String,
    pub baseline_version: String,
    pub analyzed_at: DateTime<Utc>,
    pub regressions: Vec<RegressionFinding>,
    pub improvements: Vec<ImprovementFinding>,
    pub trends: Vec<TrendAnalysis>,
    pub bottlenecks: Vec<Bottleneck>,
    /// 0-100, higher is better
    pub overall_score: f64,
}

impl AnalysisResult {
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }

    /// Most severe regression, if any
    pub fn worst_severity(&self) -> Option<Severity> {
        self.regressions.iter().map(|r| r.severity).max()
    }
}

/// Compares measurements against stored baselines
#[derive(Debug, Default)]
pub struct PerformanceAnalyzer {
    config: AnalyzerConfig,
    baselines: BaselineStore,
    history: Vec<AnalysisResult>,
    /// Per-baseline metric series, seeded with the baseline value
    metric_series: HashMap<String, BTreeMap<String, Vec<f64>>>,
}

impl PerformanceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            baselines: BaselineStore::new(),
            history: Vec::new(),
            metric_series: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Store a baseline, replacing any baseline with the same name
    ///
    /// Replacing a baseline also restarts its metric trends.
    pub fn create_baseline(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        measurements: MeasurementSet,
    ) -> &Baseline {
        let baseline = Baseline::new(name, version, measurements);
        let name = baseline.name.clone();
        info!(
            baseline = %name,
            version = %baseline.version,
            benchmarks = baseline.measurements.benchmarks.len(),
            load_tests = baseline.measurements.load_tests.len(),
            system_metrics = baseline.measurements.system_metrics.len(),
            "Baseline stored"
        );
        if self.baselines.contains(&name) {
            debug!(baseline = %name, "Replacing existing baseline");
        }
        self.metric_series.remove(&name);
        self.baselines.upsert(baseline)
    }

    pub fn baseline(&self, name: &str) -> Option<&Baseline> {
        self.baselines.get(name)
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    /// Drop a baseline together with its metric trends
    pub fn remove_baseline(&mut self, name: &str) -> Option<Baseline> {
        self.metric_series.remove(name);
        let removed = self.baselines.remove(name);
        if removed.is_some() {
            info!(baseline = %name, "Baseline removed");
        }
        removed
    }

    /// Compare `current` against the baseline called `baseline_name`
    ///
    /// Fails with [`StampedeError::BaselineNotFound`] without touching the history
    /// when no such baseline exists.
    pub fn analyze(
        &mut self,
        baseline_name: &str,
        current: &MeasurementSet,
    ) -> StampedeResult<AnalysisResult> {
        let baseline = self
            .baselines
            .get(baseline_name)
            .ok_or_else(|| StampedeError::baseline_not_found(baseline_name))?;

        let samples = paired_metrics(&baseline.measurements, current);
        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        for sample in &samples {
            match compare_metric(
                sample,
                &self.config.thresholds,
                self.config.improvement_threshold_percent,
            ) {
                Comparison::Regression(finding) => regressions.push(finding),
                Comparison::Improvement(finding) => improvements.push(finding),
                Comparison::Unchanged => {}
            }
        }
        regressions.sort_by(|a, b| b.severity.cmp(&a.severity));
        improvements.sort_by(|a, b| b.significance.cmp(&a.significance));

        let baseline_version = baseline.version.clone();
        let trends = fit_trends(
            self.metric_series
                .entry(baseline_name.to_string())
                .or_default(),
            &self.config,
            &samples,
        );
        let bottlenecks = detect_bottlenecks(current, &self.config.bottlenecks);
        let overall_score = overall_score(&regressions, &improvements);

        let result = AnalysisResult {
            baseline_name: baseline_name.to_string(),
            baseline_version,
            analyzed_at: Utc::now(),
            regressions,
            improvements,
            trends,
            bottlenecks,
            overall_score,
        };

        for finding in &result.regressions {
            warn!(
                baseline = %baseline_name,
                item = %finding.item,
                metric = %finding.metric,
                degradation_percent = finding.degradation_percent,
                severity = ?finding.severity,
                "Performance regression"
            );
        }
        info!(
            baseline = %baseline_name,
            regressed = result.has_regressions(),
            regressions = result.regressions.len(),
            improvements = result.improvements.len(),
            bottlenecks = result.bottlenecks.len(),
            score = result.overall_score,
            "Analysis completed"
        );

        self.history.push(result.clone());
        Ok(result)
    }

    /// Fit a trend to an arbitrary series using this analyzer's settings
    ///
    /// Higher values count as better.
    pub fn trend(&self, metric: impl Into<String>, series: &[f64]) -> Option<TrendAnalysis> {
        analyze_trend(
            metric,
            series,
            self.config.trend_window,
            self.config.trend_slope_threshold,
            false,
        )
    }

    /// Analyses in the order they ran
    pub fn history(&self) -> &[AnalysisResult] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.metric_series.clear();
    }

    pub fn clear_baselines(&mut self) {
        self.baselines.clear();
        self.metric_series.clear();
    }
}

/// Append the current values to each metric's series and fit what is long enough
fn fit_trends(
    series_by_metric: &mut BTreeMap<String, Vec<f64>>,
    config: &AnalyzerConfig,
    samples: &[MetricSample<'_>],
) -> Vec<TrendAnalysis> {
    let mut trends = Vec::new();
    for sample in samples {
        let key = format!("{}/{}/{}", sample.category, sample.item, sample.metric);
        let series = series_by_metric
            .entry(key.clone())
            .or_insert_with(|| vec![sample.baseline]);
        series.push(sample.current);

        if let Some(trend) = analyze_trend(
            key,
            series,
            config.trend_window,
            config.trend_slope_threshold,
            !sample.kind.higher_is_better(),
        ) {
            trends.push(trend);
        }
    }
    trends
}

/// Pair up baseline and current values for every item present in both sets
fn paired_metrics<'a>(
    baseline: &'a MeasurementSet,
    current: &'a MeasurementSet,
) -> Vec<MetricSample<'a>> {
    let mut samples = Vec::new();

    for now in &current.benchmarks {
        let Some(then) = baseline.benchmarks.iter().find(|b| b.name == now.name) else {
            debug!(item = %now.name, "No baseline benchmark, skipping");
            continue;
        };
        let mut push = |metric: &'static str, kind: MetricKind, baseline: f64, current: f64| {
            samples.push(MetricSample {
                category: MetricCategory::Benchmark,
                item: &now.name,
                metric,
                kind,
                baseline,
                current,
            })
        };
        push(
            "average_time_ms",
            MetricKind::ResponseTime,
            then.average_time_ms,
            now.average_time_ms,
        );
        push(
            "operations_per_second",
            MetricKind::Throughput,
            then.operations_per_second,
            now.operations_per_second,
        );
        push(
            "memory_bytes",
            MetricKind::Memory,
            then.memory_bytes as f64,
            now.memory_bytes as f64,
        );
    }

    for now in &current.load_tests {
        let Some(then) = baseline.load_tests.iter().find(|l| l.name == now.name) else {
            debug!(item = %now.name, "No baseline load test, skipping");
            continue;
        };
        let mut push = |metric: &'static str, kind: MetricKind, baseline: f64, current: f64| {
            samples.push(MetricSample {
                category: MetricCategory::LoadTest,
                item: &now.name,
                metric,
                kind,
                baseline,
                current,
            })
        };
        push(
            "throughput_rps",
            MetricKind::Throughput,
            then.throughput_rps,
            now.throughput_rps,
        );
        push(
            "average_response_time_ms",
            MetricKind::ResponseTime,
            then.average_response_time_ms,
            now.average_response_time_ms,
        );
        push(
            "p95_response_time_ms",
            MetricKind::ResponseTime,
            then.p95_response_time_ms,
            now.p95_response_time_ms,
        );
        push(
            "p99_response_time_ms",
            MetricKind::ResponseTime,
            then.p99_response_time_ms,
            now.p99_response_time_ms,
        );
        push(
            "error_rate",
            MetricKind::ErrorRate,
            then.error_rate,
            now.error_rate,
        );
        push(
            "peak_memory_bytes",
            MetricKind::Memory,
            then.peak_memory_bytes as f64,
            now.peak_memory_bytes as f64,
        );
    }

    for now in &current.system_metrics {
        let Some(then) = baseline.system_metrics.iter().find(|s| s.name == now.name) else {
            debug!(item = %now.name, "No baseline system metrics, skipping");
            continue;
        };
        let mut push = |metric: &'static str, kind: MetricKind, baseline: f64, current: f64| {
            samples.push(MetricSample {
                category: MetricCategory::System,
                item: &now.name,
                metric,
                kind,
                baseline,
                current,
            })
        };
        push("cpu_percent", MetricKind::Cpu, then.cpu_percent, now.cpu_percent);
        push(
            "memory_bytes",
            MetricKind::Memory,
            then.memory_bytes as f64,
            now.memory_bytes as f64,
        );
        push(
            "load_average",
            MetricKind::Cpu,
            then.load_average,
            now.load_average,
        );
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn benchmark(average_time_ms: f64, operations_per_second: f64) -> MeasurementSet {
        MeasurementSet::new().with_benchmark(BenchmarkMeasurement {
            name: "encode".into(),
            average_time_ms,
            operations_per_second,
            memory_bytes: 4096,
        })
    }

    #[test]
    fn test_unknown_baseline_leaves_history_untouched() {
        let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        let err = analyzer.analyze("missing", &benchmark(1.0, 100.0)).unwrap_err();

        assert_eq!(err, StampedeError::baseline_not_found("missing"));
        assert!(analyzer.history().is_empty());
    }

    #[test]
    fn test_improvement_and_regression_in_one_pass() {
        let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        analyzer.create_baseline("main", "1.0", benchmark(1.0, 1000.0));

        let result = analyzer.analyze("main", &benchmark(0.4, 500.0)).unwrap();

        assert_eq!(result.regressions.len(), 1);
        assert_eq!(result.regressions[0].metric, "operations_per_second");
        assert_eq!(result.regressions[0].severity, Severity::Critical);
        assert_eq!(result.improvements.len(), 1);
        assert_eq!(result.improvements[0].metric, "average_time_ms");
        assert_eq!(result.improvements[0].significance, Significance::Exceptional);
        assert_eq!(result.overall_score, 90.0);
        assert!(result.has_regressions());
        assert_eq!(analyzer.history().len(), 1);
    }

    #[test]
    fn test_unmatched_items_are_skipped() {
        let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        analyzer.create_baseline("main", "1.0", benchmark(1.0, 1000.0));

        let other = MeasurementSet::new().with_benchmark(BenchmarkMeasurement {
            name: "decode".into(),
            average_time_ms: 100.0,
            operations_per_second: 1.0,
            memory_bytes: 1,
        });
        let result = analyzer.analyze("main", &other).unwrap();
        assert!(result.regressions.is_empty());
        assert!(result.improvements.is_empty());
        assert!(!result.has_regressions());
        assert_eq!(result.overall_score, 100.0);
    }

    #[test]
    fn test_trends_appear_after_repeated_analyses() {
        let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        analyzer.create_baseline("main", "1.0", benchmark(10.0, 100.0));

        let first = analyzer.analyze("main", &benchmark(11.0, 100.0)).unwrap();
        assert!(first.trends.is_empty());

        let second = analyzer.analyze("main", &benchmark(12.0, 100.0)).unwrap();
        let latency = second
            .trends
            .iter()
            .find(|t| t.metric == "benchmark/encode/average_time_ms")
            .unwrap();
        assert_eq!(latency.points, 3);
        assert_eq!(latency.direction, TrendDirection::Degrading);
        assert!((latency.slope - 1.0).abs() < 1e-9);

        let throughput = second
            .trends
            .iter()
            .find(|t| t.metric == "benchmark/encode/operations_per_second")
            .unwrap();
        assert_eq!(throughput.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_replacing_baseline_restarts_trends() {
        let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        analyzer.create_baseline("main", "1.0", benchmark(10.0, 100.0));
        analyzer.analyze("main", &benchmark(11.0, 100.0)).unwrap();

        let replaced = analyzer.create_baseline("main", "2.0", benchmark(11.0, 100.0));
        assert_eq!(replaced.version, "2.0");
        let result = analyzer.analyze("main", &benchmark(12.0, 100.0)).unwrap();
        assert!(result.trends.is_empty());
        assert_eq!(result.baseline_version, "2.0");
    }

    #[test]
    fn test_remove_baseline() {
        let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        analyzer.create_baseline("main", "1.0", benchmark(10.0, 100.0));
        analyzer.create_baseline("nightly", "1.0", benchmark(10.0, 100.0));
        analyzer.analyze("main", &benchmark(11.0, 100.0)).unwrap();

        let removed = analyzer.remove_baseline("main").unwrap();
        assert_eq!(removed.name, "main");
        assert!(analyzer.remove_baseline("main").is_none());
        assert_eq!(analyzer.baselines().names(), vec!["nightly"]);
        assert!(matches!(
            analyzer.analyze("main", &benchmark(11.0, 100.0)),
            Err(StampedeError::BaselineNotFound { .. })
        ));

        // a new baseline under the old name starts without trend history
        analyzer.create_baseline("main", "2.0", benchmark(11.0, 100.0));
        let result = analyzer.analyze("main", &benchmark(12.0, 100.0)).unwrap();
        assert!(result.trends.is_empty());
    }

    #[test]
    fn test_clear_state() {
        let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        analyzer.create_baseline("main", "1.0", benchmark(1.0, 1.0));
        analyzer.analyze("main", &benchmark(1.0, 1.0)).unwrap();

        analyzer.clear_history();
        assert!(analyzer.history().is_empty());
        assert!(analyzer.baseline("main").is_some());

        analyzer.clear_baselines();
        assert!(analyzer.baselines().is_empty());
        assert!(matches!(
            analyzer.analyze("main", &benchmark(1.0, 1.0)),
            Err(StampedeError::BaselineNotFound { .. })
        ));
    }
}

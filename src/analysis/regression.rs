//! Baseline-relative regression and improvement classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum favourable change, in percent, reported as an improvement
pub const DEFAULT_IMPROVEMENT_THRESHOLD_PERCENT: f64 = 5.0;

/// Allowed unfavourable change per metric kind, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionThresholds {
    #[serde(default = "default_throughput_percent")]
    pub throughput_percent: f64,
    #[serde(default = "default_response_time_percent")]
    pub response_time_percent: f64,
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,
    #[serde(default = "default_error_rate_percent")]
    pub error_rate_percent: f64,
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,
}

impl Default for RegressionThresholds {
    fn default() -> Self {
        Self {
            throughput_percent: default_throughput_percent(),
            response_time_percent: default_response_time_percent(),
            memory_percent: default_memory_percent(),
            error_rate_percent: default_error_rate_percent(),
            cpu_percent: default_cpu_percent(),
        }
    }
}

fn default_throughput_percent() -> f64 {
    10.0
}

fn default_response_time_percent() -> f64 {
    10.0
}

fn default_memory_percent() -> f64 {
    20.0
}

fn default_error_rate_percent() -> f64 {
    25.0
}

fn default_cpu_percent() -> f64 {
    20.0
}

impl RegressionThresholds {
    pub fn for_kind(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Throughput => self.throughput_percent,
            MetricKind::ResponseTime => self.response_time_percent,
            MetricKind::Memory => self.memory_percent,
            MetricKind::ErrorRate => self.error_rate_percent,
            MetricKind::Cpu => self.cpu_percent,
        }
    }
}

/// What a metric measures, which decides its threshold and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Throughput,
    ResponseTime,
    Memory,
    ErrorRate,
    Cpu,
}

impl MetricKind {
    /// Throughput regresses when it falls; everything else when it rises
    pub fn higher_is_better(&self) -> bool {
        matches!(self, MetricKind::Throughput)
    }
}

/// Which part of a measurement set a metric came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Benchmark,
    LoadTest,
    System,
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricCategory::Benchmark => "benchmark",
            MetricCategory::LoadTest => "load_test",
            MetricCategory::System => "system",
        };
        f.write_str(name)
    }
}

/// Regression severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Score deduction for one regression of this severity
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Critical => 20.0,
            Severity::High => 15.0,
            Severity::Medium => 10.0,
            Severity::Low => 5.0,
        }
    }
}

/// Improvement significance, ordered from least to most significant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    Minor,
    Moderate,
    Major,
    Exceptional,
}

impl Significance {
    /// Score bonus for one improvement of this significance
    pub fn bonus(&self) -> f64 {
        match self {
            Significance::Exceptional => 10.0,
            Significance::Major => 7.0,
            Significance::Moderate => 5.0,
            Significance::Minor => 2.0,
        }
    }
}

/// A metric that moved the wrong way by more than its threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionFinding {
    pub category: MetricCategory,
    /// Name of the benchmark, load test or system measurement
    pub item: String,
    pub metric: String,
    pub kind: MetricKind,
    pub baseline_value: f64,
    pub current_value: f64,
    /// Signed relative change in percent
    pub change_percent: f64,
    /// How far the metric moved in its unfavourable direction, in percent
    pub degradation_percent: f64,
    pub threshold_percent: f64,
    pub severity: Severity,
}

/// A metric that moved the right way by more than the improvement threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementFinding {
    pub category: MetricCategory,
    pub item: String,
    pub metric: String,
    pub kind: MetricKind,
    pub baseline_value: f64,
    pub current_value: f64,
    /// Signed relative change in percent
    pub change_percent: f64,
    pub significance: Significance,
}

/// Result of comparing one metric against its baseline value
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Regression(RegressionFinding),
    Improvement(ImprovementFinding),
    Unchanged,
}

/// Relative change from `baseline` to `current`, in percent
///
/// A zero baseline gives 0 when the current value is also zero, and ±100
/// otherwise.
pub fn percent_change(baseline: f64, current: f64) -> f64 {
    if baseline == 0.0 {
        if current == 0.0 {
            0.0
        } else {
            100.0_f64.copysign(current)
        }
    } else {
        (current - baseline) / baseline.abs() * 100.0
    }
}

/// Bucket a regression by how many thresholds it exceeds
pub fn classify_severity(degradation_percent: f64, threshold_percent: f64) -> Severity {
    if threshold_percent <= 0.0 {
        return Severity::Critical;
    }
    let ratio = degradation_percent / threshold_percent;
    if ratio >= 3.0 {
        Severity::Critical
    } else if ratio >= 2.0 {
        Severity::High
    } else if ratio >= 1.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Bucket an improvement by its size in percent
pub fn classify_significance(improvement_percent: f64) -> Significance {
    if improvement_percent >= 50.0 {
        Significance::Exceptional
    } else if improvement_percent >= 25.0 {
        Significance::Major
    } else if improvement_percent >= 10.0 {
        Significance::Moderate
    } else {
        Significance::Minor
    }
}

/// One metric value pair to compare
#[derive(Debug, Clone)]
pub struct MetricSample<'a> {
    pub category: MetricCategory,
    pub item: &'a str,
    pub metric: &'a str,
    pub kind: MetricKind,
    pub baseline: f64,
    pub current: f64,
}

/// Compare one metric against its baseline
pub fn compare_metric(
    sample: &MetricSample<'_>,
    thresholds: &RegressionThresholds,
    improvement_threshold_percent: f64,
) -> Comparison {
    let change_percent = percent_change(sample.baseline, sample.current);
    // positive means the metric got worse
    let degradation = if sample.kind.higher_is_better() {
        -change_percent
    } else {
        change_percent
    };
    let threshold_percent = thresholds.for_kind(sample.kind);

    if degradation > threshold_percent {
        Comparison::Regression(RegressionFinding {
            category: sample.category,
            item: sample.item.to_string(),
            metric: sample.metric.to_string(),
            kind: sample.kind,
            baseline_value: sample.baseline,
            current_value: sample.current,
            change_percent,
            degradation_percent: degradation,
            threshold_percent,
            severity: classify_severity(degradation, threshold_percent),
        })
    } else if -degradation > improvement_threshold_percent {
        Comparison::Improvement(ImprovementFinding {
            category: sample.category,
            item: sample.item.to_string(),
            metric: sample.metric.to_string(),
            kind: sample.kind,
            baseline_value: sample.baseline,
            current_value: sample.current,
            change_percent,
            significance: classify_significance(-degradation),
        })
    } else {
        Comparison::Unchanged
    }
}

/// 100, minus a penalty per regression, plus a bonus per improvement, within `[0, 100]`
pub fn overall_score(regressions: &[RegressionFinding], improvements: &[ImprovementFinding]) -> f64 {
    let penalty: f64 = regressions.iter().map(|r| r.severity.penalty()).sum();
    let bonus: f64 = improvements.iter().map(|i| i.significance.bonus()).sum();
    (100.0 - penalty + bonus).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: MetricKind, baseline: f64, current: f64) -> MetricSample<'static> {
        MetricSample {
            category: MetricCategory::LoadTest,
            item: "api",
            metric: "metric",
            kind,
            baseline,
            current,
        }
    }

    fn compare(kind: MetricKind, baseline: f64, current: f64) -> Comparison {
        compare_metric(
            &sample(kind, baseline, current),
            &RegressionThresholds::default(),
            DEFAULT_IMPROVEMENT_THRESHOLD_PERCENT,
        )
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(1000.0, 500.0), -50.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_eq!(percent_change(0.0, 3.0), 100.0);
        assert_eq!(percent_change(0.0, -3.0), -100.0);
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(classify_severity(30.0, 10.0), Severity::Critical);
        assert_eq!(classify_severity(20.0, 10.0), Severity::High);
        assert_eq!(classify_severity(15.0, 10.0), Severity::Medium);
        assert_eq!(classify_severity(11.0, 10.0), Severity::Low);
    }

    #[test]
    fn test_significance_buckets() {
        assert_eq!(classify_significance(60.0), Significance::Exceptional);
        assert_eq!(classify_significance(25.0), Significance::Major);
        assert_eq!(classify_significance(10.0), Significance::Moderate);
        assert_eq!(classify_significance(6.0), Significance::Minor);
    }

    #[test]
    fn test_throughput_drop_is_critical() {
        match compare(MetricKind::Throughput, 1000.0, 500.0) {
            Comparison::Regression(finding) => {
                assert_eq!(finding.change_percent, -50.0);
                assert_eq!(finding.degradation_percent, 50.0);
                assert_eq!(finding.severity, Severity::Critical);
            }
            other => panic!("expected regression, got {:?}", other),
        }
    }

    #[test]
    fn test_latency_rise_degradation_matches_change() {
        match compare(MetricKind::ResponseTime, 100.0, 125.0) {
            Comparison::Regression(finding) => {
                assert_eq!(finding.change_percent, 25.0);
                assert_eq!(finding.degradation_percent, 25.0);
                assert_eq!(finding.severity, Severity::High);
            }
            other => panic!("expected regression, got {:?}", other),
        }
    }

    #[test]
    fn test_latency_drop_is_improvement() {
        match compare(MetricKind::ResponseTime, 1.0, 0.4) {
            Comparison::Improvement(finding) => {
                assert!((finding.change_percent + 60.0).abs() < 1e-9);
                assert_eq!(finding.significance, Significance::Exceptional);
            }
            other => panic!("expected improvement, got {:?}", other),
        }
    }

    #[test]
    fn test_small_changes_are_unchanged() {
        assert_eq!(compare(MetricKind::Throughput, 100.0, 96.0), Comparison::Unchanged);
        assert_eq!(compare(MetricKind::Memory, 100.0, 115.0), Comparison::Unchanged);
        assert_eq!(compare(MetricKind::Cpu, 50.0, 48.0), Comparison::Unchanged);
    }

    #[test]
    fn test_score_is_clamped() {
        let regression = |severity| RegressionFinding {
            category: MetricCategory::System,
            item: "host".into(),
            metric: "cpu_percent".into(),
            kind: MetricKind::Cpu,
            baseline_value: 1.0,
            current_value: 2.0,
            change_percent: 100.0,
            degradation_percent: 100.0,
            threshold_percent: 20.0,
            severity,
        };
        let improvement = |significance| ImprovementFinding {
            category: MetricCategory::System,
            item: "host".into(),
            metric: "memory_bytes".into(),
            kind: MetricKind::Memory,
            baseline_value: 2.0,
            current_value: 1.0,
            change_percent: -50.0,
            significance,
        };

        assert_eq!(overall_score(&[], &[]), 100.0);
        assert_eq!(
            overall_score(&[regression(Severity::High), regression(Severity::Low)], &[]),
            80.0
        );
        assert_eq!(
            overall_score(
                &[regression(Severity::Critical)],
                &[improvement(Significance::Moderate)]
            ),
            85.0
        );
        assert_eq!(overall_score(&[], &[improvement(Significance::Exceptional)]), 100.0);
        let many: Vec<_> = (0..6).map(|_| regression(Severity::Critical)).collect();
        assert_eq!(overall_score(&many, &[]), 0.0);
    }
}

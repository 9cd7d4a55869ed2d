//! Linear trend detection over metric histories.

use serde::{Deserialize, Serialize};

use crate::metrics::mean;

/// Points used by default for the trend fit
pub const DEFAULT_TREND_WINDOW: usize = 10;

/// Slope magnitude below which a series counts as stable
pub const DEFAULT_SLOPE_THRESHOLD: f64 = 0.1;

/// Fewest points a trend is fitted on
pub const MIN_TREND_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

/// A fitted trend for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric: String,
    pub direction: TrendDirection,
    /// Change per observation of the least-squares line
    pub slope: f64,
    /// Coefficient of determination of the fit, in `[0, 1]`
    pub confidence: f64,
    /// Points the fit was computed over
    pub points: usize,
}

/// Least-squares line through `(i, values[i])`
///
/// Returns `(slope, intercept, r_squared)`. A flat series has an R² of 0.
pub fn linear_regression(values: &[f64]) -> (f64, f64, f64) {
    let n = values.len() as f64;
    if values.len() < 2 {
        return (0.0, values.first().copied().unwrap_or(0.0), 0.0);
    }

    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        ss_xy += dx * (y - y_mean);
        ss_xx += dx * dx;
    }
    let slope = ss_xy / ss_xx;
    let intercept = y_mean - slope * x_mean;

    let ss_tot: f64 = values.iter().map(|y| (y - y_mean).powi(2)).sum();
    let r_squared = if ss_tot == 0.0 {
        0.0
    } else {
        let ss_res: f64 = values
            .iter()
            .enumerate()
            .map(|(i, y)| (y - (intercept + slope * i as f64)).powi(2))
            .sum();
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    (slope, intercept, r_squared)
}

/// Fit a trend over the last `window` points of `series`
///
/// Higher values are treated as better; pass `lower_is_better` for latencies and
/// the like, which classifies on the negated slope. Returns `None` with fewer than
/// three points.
pub fn analyze_trend(
    metric: impl Into<String>,
    series: &[f64],
    window: usize,
    slope_threshold: f64,
    lower_is_better: bool,
) -> Option<TrendAnalysis> {
    let window = window.max(MIN_TREND_POINTS);
    let recent = &series[series.len().saturating_sub(window)..];
    if recent.len() < MIN_TREND_POINTS {
        return None;
    }

    let (slope, _, confidence) = linear_regression(recent);
    let effective = if lower_is_better { -slope } else { slope };
    let direction = if effective > slope_threshold {
        TrendDirection::Improving
    } else if effective < -slope_threshold {
        TrendDirection::Degrading
    } else {
        TrendDirection::Stable
    };

    Some(TrendAnalysis {
        metric: metric.into(),
        direction,
        slope,
        confidence,
        points: recent.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_line() {
        let (slope, intercept, r2) = linear_regression(&[1.0, 3.0, 5.0, 7.0]);
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!((r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_series_has_zero_confidence() {
        let trend = analyze_trend("flat", &[5.0; 6], 10, 0.1, false).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.slope, 0.0);
        assert_eq!(trend.confidence, 0.0);
    }

    #[test]
    fn test_needs_three_points() {
        assert!(analyze_trend("short", &[1.0, 2.0], 10, 0.1, false).is_none());
    }

    #[test]
    fn test_direction_respects_polarity() {
        let rising = [100.0, 110.0, 120.0, 130.0];
        let throughput = analyze_trend("rps", &rising, 10, 0.1, false).unwrap();
        assert_eq!(throughput.direction, TrendDirection::Improving);

        let latency = analyze_trend("latency", &rising, 10, 0.1, true).unwrap();
        assert_eq!(latency.direction, TrendDirection::Degrading);
        assert_eq!(latency.slope, throughput.slope);
    }

    #[test]
    fn test_only_recent_window_is_fitted() {
        let mut series: Vec<f64> = (0..20).map(|i| i as f64 * 10.0).collect();
        series.extend([500.0; 10]);
        let trend = analyze_trend("tail", &series, 10, 0.1, false).unwrap();
        assert_eq!(trend.points, 10);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }
}

// Property-based tests for the statistics and planning helpers
//
// Properties tested:
// 1. Percentile ordering: p50 <= p90 <= p95 <= p99 and all within [min, max]
// 2. Percentile bounds for arbitrary p
// 3. User partitioning conserves the total and favours the last worker
// 4. Trend confidence stays within [0, 1]
// 5. Severity never decreases as the degradation grows
// 6. Generator totals always add up, whatever mix of outcomes the target produces

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stampede::analysis::{analyze_trend, classify_severity};
use stampede::coordinator::{partition, split_users};
use stampede::generator::{GeneratorConfig, LoadGenerator};
use stampede::metrics::{latency_stats, percentile};
use stampede::{target, LoadTestSpec, Schedule};

const EPSILON: f64 = 1e-9;

proptest! {
    #[test]
    fn prop_latency_percentiles_are_ordered(
        latencies in prop::collection::vec(0.0f64..10_000.0, 1..500),
    ) {
        let stats = latency_stats(&latencies);
        prop_assert!(stats.min_ms <= stats.p50_ms + EPSILON);
        prop_assert!(stats.p50_ms <= stats.p90_ms + EPSILON);
        prop_assert!(stats.p90_ms <= stats.p95_ms + EPSILON);
        prop_assert!(stats.p95_ms <= stats.p99_ms + EPSILON);
        prop_assert!(stats.p99_ms <= stats.max_ms + EPSILON);
        prop_assert!(stats.std_dev_ms >= 0.0);
    }

    #[test]
    fn prop_percentile_within_bounds(
        mut values in prop::collection::vec(-1_000.0f64..1_000.0, 1..200),
        p in 0.0f64..=100.0,
    ) {
        values.sort_by(|a, b| a.total_cmp(b));
        let value = percentile(&values, p);
        prop_assert!(value >= values[0] - EPSILON);
        prop_assert!(value <= values[values.len() - 1] + EPSILON);
    }

    #[test]
    fn prop_split_users_conserves_total(total in 0usize..10_000, workers in 1usize..64) {
        let shares = split_users(total, workers);
        prop_assert_eq!(shares.len(), workers);
        prop_assert_eq!(shares.iter().sum::<usize>(), total);
        let first = shares[0];
        prop_assert!(shares[..workers - 1].iter().all(|s| *s == first));
        prop_assert!(shares[workers - 1] >= first);
    }

    #[test]
    fn prop_partition_offsets_increase(
        users in 1usize..1_000,
        parallelism in 1usize..32,
        ramp_ms in 1u64..60_000,
    ) {
        let parts = partition(
            &Schedule::Concurrency { concurrency: users },
            Duration::from_millis(ramp_ms),
            parallelism,
        );
        prop_assert_eq!(parts.len(), users.min(parallelism));
        prop_assert_eq!(parts.iter().map(|p| p.users).sum::<usize>(), users);
        prop_assert!(parts.windows(2).all(|w| w[0].ramp_up_offset <= w[1].ramp_up_offset));
        prop_assert!(parts.iter().all(|p| p.ramp_up_offset < Duration::from_millis(ramp_ms)));
    }

    #[test]
    fn prop_trend_confidence_is_bounded(
        series in prop::collection::vec(-1_000.0f64..1_000.0, 3..40),
    ) {
        let trend = analyze_trend("metric", &series, 10, 0.1, false).unwrap();
        prop_assert!((0.0..=1.0).contains(&trend.confidence));
        prop_assert!(trend.points <= 10);
    }

    #[test]
    fn prop_severity_is_monotonic(a in 0.0f64..500.0, b in 0.0f64..500.0, threshold in 1.0f64..50.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(classify_severity(low, threshold) <= classify_severity(high, threshold));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_generator_totals_add_up(concurrency in 0usize..6, fail_every in 1usize..5) {
        let report = tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let target = target::from_fn(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    if n % fail_every == 0 {
                        Err(anyhow::anyhow!("rejected"))
                    } else {
                        Ok(())
                    }
                }
            });
            let generator = LoadGenerator::new(GeneratorConfig {
                sample_resources: false,
                ..Default::default()
            });
            let spec = LoadTestSpec::concurrency("prop", concurrency, Duration::from_millis(20))
                .with_ramp_down(Duration::from_millis(200));
            generator.run(&spec, target).await
        })
        .unwrap();

        prop_assert!(report.is_consistent());
        prop_assert_eq!(
            report.total_requests,
            report.successful_requests + report.failed_requests + report.timed_out_requests
        );
        prop_assert!((0.0..=1.0).contains(&report.error_rate));
        if concurrency == 0 {
            prop_assert_eq!(report.total_requests, 0);
        }
    }
}

//! Splitting a load test across workers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{LoadTestSpec, Schedule};
use crate::utils::duration_millis;

/// The share of a load test assigned to one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPartition {
    pub worker_index: usize,
    /// Virtual users in concurrency mode; 0 for rate partitions
    pub users: usize,
    /// Arrival rate share in rate mode
    pub requests_per_second: Option<f64>,
    /// Delay before this worker begins its own ramp-up
    #[serde(with = "duration_millis")]
    pub ramp_up_offset: Duration,
}

impl WorkerPartition {
    /// The spec this worker runs
    pub fn worker_spec(&self, spec: &LoadTestSpec) -> LoadTestSpec {
        let mut worker_spec = spec.clone();
        worker_spec.name = format!("{}/worker-{}", spec.name, self.worker_index);
        match self.requests_per_second {
            Some(rate) => {
                worker_spec.concurrency = None;
                worker_spec.requests_per_second = Some(rate);
            }
            None => {
                worker_spec.concurrency = Some(self.users);
                worker_spec.requests_per_second = None;
            }
        }
        worker_spec
    }

    /// Requests charged as failed if this worker is lost
    ///
    /// One per virtual user, or the partition's share of `rate * duration`.
    pub fn expected_requests(&self, duration: Duration) -> usize {
        match self.requests_per_second {
            Some(rate) => (rate * duration.as_secs_f64()).round() as usize,
            None => self.users,
        }
    }
}

/// Split `total` users over `workers`, giving the remainder to the last worker
pub fn split_users(total: usize, workers: usize) -> Vec<usize> {
    if workers == 0 {
        return Vec::new();
    }
    let base = total / workers;
    let mut shares = vec![base; workers];
    if let Some(last) = shares.last_mut() {
        *last += total % workers;
    }
    shares
}

/// Partition a validated schedule over at most `parallelism` workers
pub fn partition(
    schedule: &Schedule,
    ramp_up: Duration,
    parallelism: usize,
) -> Vec<WorkerPartition> {
    let parallelism = parallelism.max(1);
    let shares: Vec<(usize, Option<f64>)> = match *schedule {
        Schedule::Concurrency { concurrency } => {
            split_users(concurrency, concurrency.min(parallelism))
                .into_iter()
                .map(|users| (users, None))
                .collect()
        }
        Schedule::Rate {
            requests_per_second,
        } => {
            let workers = (requests_per_second.ceil() as usize).clamp(1, parallelism);
            let share = requests_per_second / workers as f64;
            vec![(0, Some(share)); workers]
        }
    };

    let count = shares.len() as u32;
    shares
        .into_iter()
        .enumerate()
        .map(|(worker_index, (users, requests_per_second))| WorkerPartition {
            worker_index,
            users,
            requests_per_second,
            ramp_up_offset: ramp_up * worker_index as u32 / count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_users_remainder_to_last() {
        assert_eq!(split_users(100, 4), vec![25, 25, 25, 25]);
        assert_eq!(split_users(10, 4), vec![2, 2, 2, 4]);
        assert_eq!(split_users(3, 3), vec![1, 1, 1]);
        assert!(split_users(5, 0).is_empty());
    }

    #[test]
    fn test_partition_caps_workers_at_users() {
        let parts = partition(
            &Schedule::Concurrency { concurrency: 3 },
            Duration::ZERO,
            16,
        );
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.users == 1));
    }

    #[test]
    fn test_partition_offsets() {
        let parts = partition(
            &Schedule::Concurrency { concurrency: 100 },
            Duration::from_secs(8),
            4,
        );
        let offsets: Vec<u64> = parts
            .iter()
            .map(|p| p.ramp_up_offset.as_millis() as u64)
            .collect();
        assert_eq!(offsets, vec![0, 2_000, 4_000, 6_000]);
    }

    #[test]
    fn test_rate_partition() {
        let parts = partition(
            &Schedule::Rate {
                requests_per_second: 2.5,
            },
            Duration::ZERO,
            8,
        );
        assert_eq!(parts.len(), 3);
        let total: f64 = parts.iter().filter_map(|p| p.requests_per_second).sum();
        assert!((total - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_users_means_no_workers() {
        assert!(partition(&Schedule::Concurrency { concurrency: 0 }, Duration::ZERO, 4).is_empty());
    }

    #[test]
    fn test_worker_spec_and_expected_requests() {
        let spec = LoadTestSpec::rate("api", 40.0, Duration::from_secs(2));
        let part = WorkerPartition {
            worker_index: 1,
            users: 0,
            requests_per_second: Some(10.0),
            ramp_up_offset: Duration::ZERO,
        };
        let worker_spec = part.worker_spec(&spec);
        assert_eq!(worker_spec.name, "api/worker-1");
        assert_eq!(worker_spec.requests_per_second, Some(10.0));
        assert!(worker_spec.validate().is_ok());
        assert_eq!(part.expected_requests(spec.duration), 20);

        let users = WorkerPartition {
            users: 7,
            requests_per_second: None,
            ..part
        };
        assert_eq!(users.expected_requests(spec.duration), 7);
        assert_eq!(users.worker_spec(&spec).concurrency, Some(7));
    }
}

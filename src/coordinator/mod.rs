//! Distributed load generation across OS threads
//!
//! The [`DistributedCoordinator`] partitions a load test over several workers, each
//! running its own [`LoadGenerator`] on a dedicated thread and runtime. Worker
//! results are merged into one global report computed from the combined outcomes,
//! never from averaged per-worker statistics.
//!
//! Each worker samples resources on its own cadence. Workers are threads of one
//! process, so each records its share of the process figures; the coordinator
//! sums the series after truncating them to the shortest one.
//!
//! A worker that dies before reporting does not abort the run. Its expected
//! requests are charged as failed outcomes and the failure is listed in
//! [`DistributedReport::workers`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use stampede::coordinator::{CoordinatorConfig, DistributedCoordinator};
//! use stampede::target;
//! use stampede::types::LoadTestSpec;
//!
//! # async fn example() -> stampede::Result<()> {
//! let coordinator = DistributedCoordinator::new(CoordinatorConfig::default());
//! let spec = LoadTestSpec::concurrency("search", 200, Duration::from_secs(60))
//!     .with_ramp_up(Duration::from_secs(10));
//! let distributed = coordinator
//!     .run(&spec, target::from_fn(|| async { Ok(()) }))
//!     .await?;
//! println!("{} workers failed", distributed.failed_workers());
//! # Ok(())
//! # }
//! ```

pub mod partition;
pub mod worker;

pub use partition::{partition, split_users, WorkerPartition};
pub use worker::{WorkerResult, WorkerTask};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StampedeConfig;
use crate::error::{RequestError, StampedeError};
use crate::generator::{build_report, GeneratorConfig, LoadGenerator, ReportInput};
use crate::sampler::{detect_memory_leak, SamplerConfig};
use crate::target::Target;
use crate::types::{
    LoadTestReport, LoadTestSpec, RequestOutcome, ResourceSample, RunId, Schedule,
};
use crate::utils::duration_millis;
use crate::Result as StampedeResult;
use worker::{spawn_worker, WorkerSettings};

/// Request ids of worker `n` start at `n << REQUEST_ID_SHIFT`
const REQUEST_ID_SHIFT: u32 = 40;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on workers; defaults to the number of logical CPUs
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    #[serde(default)]
    pub thread_stack_size: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            thread_name_prefix: default_thread_name_prefix(),
            thread_stack_size: None,
        }
    }
}

fn default_thread_name_prefix() -> String {
    "stampede-worker".to_string()
}

/// How one worker fared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_index: usize,
    pub users: usize,
    pub requests_per_second: Option<f64>,
    #[serde(with = "duration_millis")]
    pub ramp_up_offset: Duration,
    /// Outcomes this worker contributed, including synthesized failures
    pub recorded_requests: usize,
    /// Why the worker was lost, if it was
    pub failure: Option<String>,
}

impl WorkerSummary {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Global report of a distributed run plus per-worker summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedReport {
    pub report: LoadTestReport,
    pub workers: Vec<WorkerSummary>,
}

impl DistributedReport {
    pub fn failed_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.succeeded()).count()
    }
}

/// Runs load tests partitioned across worker threads
pub struct DistributedCoordinator {
    config: CoordinatorConfig,
    generator_config: GeneratorConfig,
    sampler_config: SamplerConfig,
}

impl DistributedCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            generator_config: GeneratorConfig::default(),
            sampler_config: SamplerConfig::default(),
        }
    }

    /// Build a coordinator from the top-level configuration
    pub fn from_config(config: &StampedeConfig) -> Self {
        Self::new(config.coordinator.clone())
            .with_generator_config(config.generator.clone())
            .with_sampler_config(config.sampler.clone())
    }

    /// Generator settings used by every worker
    pub fn with_generator_config(mut self, generator_config: GeneratorConfig) -> Self {
        self.generator_config = generator_config;
        self
    }

    pub fn with_sampler_config(mut self, sampler_config: SamplerConfig) -> Self {
        self.sampler_config = sampler_config;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Maximum number of workers
    pub fn parallelism(&self) -> usize {
        self.config.max_workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Partition a spec without running it
    pub fn plan(&self, spec: &LoadTestSpec) -> StampedeResult<Vec<WorkerPartition>> {
        let schedule = spec.validate()?;
        Ok(partition(&schedule, spec.ramp_up, self.parallelism()))
    }

    /// Run a spec across workers and merge their outcomes
    pub async fn run(
        &self,
        spec: &LoadTestSpec,
        target: Arc<dyn Target>,
    ) -> StampedeResult<DistributedReport> {
        let schedule = spec.validate()?;
        let partitions = partition(&schedule, spec.ramp_up, self.parallelism());

        if partitions.is_empty() {
            // nothing to split; run in place so the run still spans its duration
            let report = LoadGenerator::new(self.generator_config.clone())
                .with_sampler_config(self.sampler_config.clone())
                .run(spec, target)
                .await?;
            return Ok(DistributedReport {
                report,
                workers: Vec::new(),
            });
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            %run_id,
            name = %spec.name,
            workers = partitions.len(),
            "Starting distributed load test"
        );

        let settings = WorkerSettings {
            thread_name_prefix: self.config.thread_name_prefix.clone(),
            stack_size: self.config.thread_stack_size,
            generator: self.generator_config.clone(),
            sampler: self.sampler_config.clone(),
            workers: partitions.len(),
        };

        let pending = partitions.iter().map(|part| {
            let task = WorkerTask {
                partition: part.clone(),
                spec: part.worker_spec(spec),
                request_id_base: request_id_base(part.worker_index),
            };
            let receiver = spawn_worker(&settings, task, Arc::clone(&target));
            let worker = part.worker_index;
            async move {
                match receiver?.await {
                    Ok(result) => match result.failure {
                        Some(message) => Err(StampedeError::worker_failure(worker, message)),
                        None => Ok(result),
                    },
                    Err(_) => Err(StampedeError::worker_failure(
                        worker,
                        "worker terminated without reporting a result",
                    )),
                }
            }
        });
        let replies = join_all(pending).await;
        let elapsed = clock.elapsed();
        let finished_at = Utc::now();

        let merged = merge(MergeInput {
            run_id,
            spec,
            schedule,
            started_at,
            finished_at,
            elapsed,
            partitions: &partitions,
            replies,
            sampler: &self.sampler_config,
            throughput_window: self.generator_config.throughput_window,
        });

        info!(
            %run_id,
            total = merged.report.total_requests,
            error_rate = merged.report.error_rate,
            failed_workers = merged.failed_workers(),
            "Distributed load test completed"
        );
        Ok(merged)
    }
}

fn request_id_base(worker_index: usize) -> u64 {
    (worker_index as u64) << REQUEST_ID_SHIFT
}

struct MergeInput<'a> {
    run_id: RunId,
    spec: &'a LoadTestSpec,
    schedule: Schedule,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    elapsed: Duration,
    partitions: &'a [WorkerPartition],
    replies: Vec<StampedeResult<WorkerResult>>,
    sampler: &'a SamplerConfig,
    throughput_window: Duration,
}

/// Merge worker replies, in partition order, into the global report
fn merge(input: MergeInput<'_>) -> DistributedReport {
    let mut outcomes: Vec<RequestOutcome> = Vec::new();
    let mut workers = Vec::with_capacity(input.partitions.len());
    let mut abandoned = 0;
    let mut skipped = 0;
    let mut series: Vec<Vec<ResourceSample>> = Vec::new();

    for (part, reply) in input.partitions.iter().zip(input.replies) {
        let (recorded, failure) = match reply {
            Ok(result) => {
                let recorded = result.outcomes.len();
                outcomes.extend(result.outcomes);
                abandoned += result.abandoned_requests;
                skipped += result.skipped_requests;
                if !result.resource_samples.is_empty() {
                    series.push(result.resource_samples);
                }
                (recorded, None)
            }
            Err(err) => {
                let expected = part.expected_requests(input.spec.duration);
                warn!(
                    worker = part.worker_index,
                    expected, "Worker lost, charging its requests as failed: {}", err
                );
                let lost = RequestError::WorkerLost {
                    worker: part.worker_index,
                    message: err.to_string(),
                };
                let base = request_id_base(part.worker_index);
                outcomes.extend((0..expected).map(|i| {
                    RequestOutcome::failure(base + i as u64, input.started_at, Duration::ZERO, &lost)
                }));
                (expected, Some(err.to_string()))
            }
        };

        workers.push(WorkerSummary {
            worker_index: part.worker_index,
            users: part.users,
            requests_per_second: part.requests_per_second,
            ramp_up_offset: part.ramp_up_offset,
            recorded_requests: recorded,
            failure,
        });
    }

    let resource_samples = sum_series(&series);
    let memory_leak = detect_memory_leak(
        &resource_samples,
        input.sampler.leak_window,
        input.sampler.leak_threshold_bytes,
    );

    let report = build_report(ReportInput {
        run_id: input.run_id,
        name: input.spec.name.clone(),
        schedule: input.schedule,
        started_at: input.started_at,
        finished_at: input.finished_at,
        elapsed: input.elapsed,
        outcomes: &outcomes,
        abandoned_requests: abandoned,
        skipped_requests: skipped,
        resource_samples,
        memory_leak,
        throughput_window: input.throughput_window,
    });

    DistributedReport { report, workers }
}

/// Element-wise sum of per-worker series, truncated to the shortest one
fn sum_series(series: &[Vec<ResourceSample>]) -> Vec<ResourceSample> {
    let Some(shortest) = series.iter().map(Vec::len).min() else {
        return Vec::new();
    };
    (0..shortest)
        .filter_map(|i| {
            let mut samples = series.iter().map(|worker| &worker[i]);
            let first = samples.next()?.clone();
            Some(samples.fold(first, |acc, sample| acc.combine(sample)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoadAverage;

    fn sample(memory: u64) -> ResourceSample {
        ResourceSample {
            timestamp: Utc::now(),
            cpu_percent: 1.0,
            memory_bytes: memory,
            load_average: LoadAverage::default(),
        }
    }

    fn result(worker_index: usize, successes: usize, memory: &[u64]) -> WorkerResult {
        let start = Utc::now();
        WorkerResult {
            worker_index,
            outcomes: (0..successes)
                .map(|i| RequestOutcome::success(i as u64, start, Duration::from_millis(5)))
                .collect(),
            abandoned_requests: 1,
            skipped_requests: 0,
            resource_samples: memory.iter().map(|m| sample(*m)).collect(),
            failure: None,
        }
    }

    #[test]
    fn test_sum_series_truncates_to_shortest() {
        let summed = sum_series(&[
            vec![sample(10), sample(20), sample(30)],
            vec![sample(1), sample(2)],
        ]);
        assert_eq!(summed.len(), 2);
        assert_eq!(summed[0].memory_bytes, 11);
        assert_eq!(summed[1].memory_bytes, 22);
        assert_eq!(summed[1].cpu_percent, 2.0);
        assert!(sum_series(&[]).is_empty());
    }

    #[test]
    fn test_merge_charges_lost_worker() {
        let spec = LoadTestSpec::concurrency("merge", 12, Duration::from_secs(1));
        let partitions = partition(&Schedule::Concurrency { concurrency: 12 }, Duration::ZERO, 3);
        let replies = vec![
            Ok(result(0, 8, &[10, 20, 30])),
            Err(StampedeError::worker_failure(1, "panicked")),
            Ok(result(2, 6, &[5, 5])),
        ];

        let merged = merge(MergeInput {
            run_id: Uuid::new_v4(),
            spec: &spec,
            schedule: Schedule::Concurrency { concurrency: 12 },
            started_at: Utc::now(),
            finished_at: Utc::now(),
            elapsed: Duration::from_secs(1),
            partitions: &partitions,
            replies,
            sampler: &SamplerConfig::default(),
            throughput_window: Duration::from_secs(1),
        });

        let report = &merged.report;
        assert!(report.is_consistent());
        assert_eq!(report.total_requests, 8 + 4 + 6);
        assert_eq!(report.successful_requests, 14);
        assert_eq!(report.failed_requests, 4);
        assert_eq!(report.abandoned_requests, 2);
        assert_eq!(merged.failed_workers(), 1);
        assert!(!merged.workers[1].succeeded());
        assert_eq!(merged.workers[1].recorded_requests, 4);
        assert_eq!(report.resource_samples.len(), 2);
        assert_eq!(report.resource_samples[1].memory_bytes, 25);
        assert_eq!(report.memory.peak_bytes, 25);
    }

    #[test]
    fn test_plan_respects_max_workers() {
        let coordinator = DistributedCoordinator::new(CoordinatorConfig {
            max_workers: Some(4),
            ..Default::default()
        });
        let spec = LoadTestSpec::concurrency("plan", 10, Duration::from_secs(1));
        let plan = coordinator.plan(&spec).unwrap();
        let users: Vec<usize> = plan.iter().map(|p| p.users).collect();
        assert_eq!(users, vec![2, 2, 2, 4]);
    }

    #[test]
    fn test_plan_rejects_invalid_spec() {
        let coordinator = DistributedCoordinator::new(CoordinatorConfig::default());
        let mut spec = LoadTestSpec::concurrency("plan", 10, Duration::from_secs(1));
        spec.requests_per_second = Some(5.0);
        assert!(matches!(
            coordinator.plan(&spec),
            Err(StampedeError::InvalidSpec { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_across_threads() {
        let coordinator = DistributedCoordinator::new(CoordinatorConfig {
            max_workers: Some(3),
            ..Default::default()
        })
        .with_generator_config(GeneratorConfig {
            sample_resources: false,
            ..Default::default()
        });
        let spec = LoadTestSpec::concurrency("threads", 6, Duration::from_millis(100))
            .with_ramp_down(Duration::from_millis(200));
        let target = crate::target::from_fn(|| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        });

        let distributed = coordinator.run(&spec, target).await.unwrap();

        assert_eq!(distributed.workers.len(), 3);
        assert_eq!(distributed.failed_workers(), 0);
        assert!(distributed.report.is_consistent());
        assert!(distributed.report.total_requests > 6);
        let recorded: usize = distributed.workers.iter().map(|w| w.recorded_requests).sum();
        assert_eq!(recorded, distributed.report.total_requests);
    }
}

//! Worker threads.
//!
//! Each worker is an OS thread with its own current-thread runtime. It receives
//! exactly one [`WorkerTask`] and sends back exactly one [`WorkerResult`]; nothing
//! else is shared with the coordinator while the worker runs.
//!
//! Workers are threads of one process, so each records its `1 / workers` share of
//! the process resource figures and the coordinator sums the shares.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::partition::WorkerPartition;
use crate::error::StampedeError;
use crate::generator::{GeneratorConfig, LoadGenerator};
use crate::target::Target;
use crate::sampler::SamplerConfig;
use crate::types::{LoadTestSpec, RequestOutcome, ResourceSample};
use crate::Result as StampedeResult;

/// Input message for one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerTask {
    pub partition: WorkerPartition,
    /// The worker's share of the load test, already validated
    pub spec: LoadTestSpec,
    /// First request id this worker hands out
    pub request_id_base: u64,
}

/// Output message of one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_index: usize,
    pub outcomes: Vec<RequestOutcome>,
    pub abandoned_requests: usize,
    pub skipped_requests: usize,
    /// This worker's share of the process resource samples
    pub resource_samples: Vec<ResourceSample>,
    /// Set when the worker could not run its partition
    pub failure: Option<String>,
}

impl WorkerResult {
    pub fn failed(worker_index: usize, message: impl Into<String>) -> Self {
        Self {
            worker_index,
            outcomes: Vec::new(),
            abandoned_requests: 0,
            skipped_requests: 0,
            resource_samples: Vec::new(),
            failure: Some(message.into()),
        }
    }
}

/// Thread settings shared by all workers of a coordinator
#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    pub generator: GeneratorConfig,
    pub sampler: SamplerConfig,
    /// Number of workers sharing the process
    pub workers: usize,
}

/// Start a worker thread and hand it its task
///
/// The returned receiver yields the worker's result, or an error if the worker
/// died without sending one.
pub(crate) fn spawn_worker(
    settings: &WorkerSettings,
    task: WorkerTask,
    target: Arc<dyn Target>,
) -> StampedeResult<oneshot::Receiver<WorkerResult>> {
    let worker = task.partition.worker_index;
    let (task_tx, task_rx) = oneshot::channel::<WorkerTask>();
    let (result_tx, result_rx) = oneshot::channel::<WorkerResult>();

    let mut builder =
        thread::Builder::new().name(format!("{}-{}", settings.thread_name_prefix, worker));
    if let Some(stack_size) = settings.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let generator = LoadGenerator::new(settings.generator.clone())
        .with_sampler_config(settings.sampler.clone())
        .with_resource_share(settings.workers);
    builder
        .spawn(move || worker_main(task_rx, result_tx, target, generator))
        .map_err(|e| {
            StampedeError::worker_failure(worker, format!("failed to spawn thread: {}", e))
        })?;

    task_tx.send(task).map_err(|_| {
        StampedeError::worker_failure(worker, "worker exited before receiving its task")
    })?;

    Ok(result_rx)
}

fn worker_main(
    task_rx: oneshot::Receiver<WorkerTask>,
    result_tx: oneshot::Sender<WorkerResult>,
    target: Arc<dyn Target>,
    generator: LoadGenerator,
) {
    let Ok(task) = task_rx.blocking_recv() else {
        debug!("Worker dropped before a task arrived");
        return;
    };
    let worker = task.partition.worker_index;

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(worker, "Failed to build worker runtime: {}", e);
            let _ = result_tx.send(WorkerResult::failed(
                worker,
                format!("failed to build runtime: {}", e),
            ));
            return;
        }
    };

    let result = runtime.block_on(run_task(task, target, generator));
    if result_tx.send(result).is_err() {
        debug!(worker, "Coordinator no longer waiting for worker result");
    }
}

async fn run_task(
    task: WorkerTask,
    target: Arc<dyn Target>,
    generator: LoadGenerator,
) -> WorkerResult {
    let WorkerTask {
        partition,
        spec,
        request_id_base,
    } = task;
    let worker = partition.worker_index;

    if !partition.ramp_up_offset.is_zero() {
        debug!(
            worker,
            offset_ms = partition.ramp_up_offset.as_millis() as u64,
            "Delaying worker start"
        );
        tokio::time::sleep(partition.ramp_up_offset).await;
    }

    let generator = generator.with_request_id_base(request_id_base);

    match generator.execute(&spec, target).await {
        Ok(output) => WorkerResult {
            worker_index: worker,
            outcomes: output.outcomes,
            abandoned_requests: output.report.abandoned_requests,
            skipped_requests: output.report.skipped_requests,
            resource_samples: output.report.resource_samples,
            failure: None,
        },
        Err(e) => WorkerResult::failed(worker, e.to_string()),
    }
}

//! Single-process load generation.
//!
//! A [`LoadGenerator`] drives one [`Target`] through the phases of a load test:
//!
//! 1. **Warmup** - a fixed number of requests, not measured
//! 2. **Ramp-up** - load rises to the target level in discrete steps
//! 3. **Sustained** - the target concurrency or arrival rate is held for `duration`
//! 4. **Ramp-down** - no new requests; in-flight requests get a grace period
//! 5. **Cooldown** - a fixed number of requests, not measured
//!
//! All outstanding requests are interleaved on the calling task. Each target call is
//! spawned as its own task and raced against the request timeout. When the timer
//! wins, the outcome is recorded as timed out and the target task is left to finish
//! on its own.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use stampede::generator::{GeneratorConfig, LoadGenerator};
//! use stampede::target;
//! use stampede::types::LoadTestSpec;
//!
//! # async fn example() -> stampede::Result<()> {
//! let generator = LoadGenerator::new(GeneratorConfig::default());
//! let target = target::from_fn(|| async {
//!     tokio::time::sleep(Duration::from_millis(5)).await;
//!     Ok(())
//! });
//!
//! let spec = LoadTestSpec::concurrency("checkout", 50, Duration::from_secs(30))
//!     .with_ramp_up(Duration::from_secs(5))
//!     .with_ramp_down(Duration::from_secs(2));
//! let report = generator.run(&spec, target).await?;
//! println!("p99: {:.1}ms", report.latency.p99_ms);
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod report;
pub mod schedule;

pub use events::{LoadTestEvent, Phase};
pub use report::{build_report, ReportInput};
pub use schedule::{arrival_interval, ramp_steps, RampStep, MAX_RAMP_STEPS};

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::StampedeConfig;
use crate::error::RequestError;
use crate::metrics::DEFAULT_THROUGHPUT_WINDOW;
use crate::sampler::{ResourceSampler, SamplerConfig};
use crate::target::Target;
use crate::types::{LoadTestReport, LoadTestSpec, RequestOutcome, RunId, Schedule};
use crate::utils::duration_millis;

/// Generator tuning that is not part of an individual test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Upper bound on the number of ramp-up steps
    #[serde(default = "default_max_ramp_steps")]
    pub max_ramp_steps: usize,
    /// Requests kept in flight during warmup and cooldown bursts
    #[serde(default = "default_warmup_concurrency")]
    pub warmup_concurrency: usize,
    /// How often `Progress` events are published
    #[serde(with = "duration_millis", default = "default_progress_interval")]
    pub progress_interval: Duration,
    /// Window used for per-window throughput counts
    #[serde(with = "duration_millis", default = "default_throughput_window")]
    pub throughput_window: Duration,
    /// Capacity of the event channel; slow subscribers miss older events
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Run a [`ResourceSampler`] alongside the measured phases
    #[serde(default = "default_sample_resources")]
    pub sample_resources: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_ramp_steps: default_max_ramp_steps(),
            warmup_concurrency: default_warmup_concurrency(),
            progress_interval: default_progress_interval(),
            throughput_window: default_throughput_window(),
            event_buffer: default_event_buffer(),
            sample_resources: default_sample_resources(),
        }
    }
}

fn default_max_ramp_steps() -> usize {
    10
}

fn default_warmup_concurrency() -> usize {
    4
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_throughput_window() -> Duration {
    DEFAULT_THROUGHPUT_WINDOW
}

fn default_event_buffer() -> usize {
    256
}

fn default_sample_resources() -> bool {
    true
}

/// A finished run: the report plus the raw outcomes it was computed from
#[derive(Debug, Clone)]
pub struct GeneratorOutput {
    pub report: LoadTestReport,
    /// Measured outcomes in completion order
    pub outcomes: Vec<RequestOutcome>,
    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

/// Drives load against a target
pub struct LoadGenerator {
    config: GeneratorConfig,
    sampler_config: SamplerConfig,
    events: broadcast::Sender<LoadTestEvent>,
    cancel: CancellationToken,
    request_id_base: u64,
    resource_share: usize,
}

impl LoadGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            config,
            sampler_config: SamplerConfig::default(),
            events,
            cancel: CancellationToken::new(),
            request_id_base: 0,
            resource_share: 1,
        }
    }

    /// Build a generator from the top-level configuration
    pub fn from_config(config: &StampedeConfig) -> Self {
        Self::new(config.generator.clone()).with_sampler_config(config.sampler.clone())
    }

    pub fn with_sampler_config(mut self, sampler_config: SamplerConfig) -> Self {
        self.sampler_config = sampler_config;
        self
    }

    /// Observe an externally owned token instead of the generator's own
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Number request ids from `base` upwards
    pub fn with_request_id_base(mut self, base: u64) -> Self {
        self.request_id_base = base;
        self
    }

    /// Record `1 / parts` of each resource sample
    ///
    /// Used when several generators share one process, so that their series sum
    /// to the process figures.
    pub fn with_resource_share(mut self, parts: usize) -> Self {
        self.resource_share = parts.max(1);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Receive lifecycle events for every subsequent run
    pub fn subscribe(&self) -> broadcast::Receiver<LoadTestEvent> {
        self.events.subscribe()
    }

    /// Token that stops the current run early
    ///
    /// Cancelling sends the run straight to ramp-down. The token stays cancelled,
    /// so later runs on this generator only ramp down; use a fresh generator
    /// instead.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run a load test and return its report
    pub async fn run(
        &self,
        spec: &LoadTestSpec,
        target: Arc<dyn Target>,
    ) -> crate::Result<LoadTestReport> {
        Ok(self.execute(spec, target).await?.report)
    }

    /// Run a load test and return the report together with the raw outcomes
    ///
    /// Only an invalid spec is an error. Failing, panicking and timed out requests
    /// are recorded as outcomes.
    pub async fn execute(
        &self,
        spec: &LoadTestSpec,
        target: Arc<dyn Target>,
    ) -> crate::Result<GeneratorOutput> {
        let schedule = spec.validate()?;
        let spec = spec.clone();
        let run_id = Uuid::new_v4();

        info!(
            %run_id,
            name = %spec.name,
            ?schedule,
            duration_ms = spec.duration.as_millis() as u64,
            "Starting load test"
        );
        self.emit(LoadTestEvent::RunStarted {
            run_id,
            name: spec.name.clone(),
            schedule,
        });

        if let Some(count) = spec.warmup_requests.filter(|n| *n > 0) {
            self.run_burst(run_id, Phase::Warmup, count, &target, spec.request_timeout)
                .await;
        }

        let mut sampler = ResourceSampler::new(self.sampler_config.clone());
        if self.config.sample_resources {
            sampler.start();
        }

        let started_at = Utc::now();
        let mut runner = PhaseRunner::new(
            run_id,
            Arc::clone(&target),
            &spec,
            self.cancel.clone(),
            self.events.clone(),
            self.config.progress_interval,
            self.request_id_base,
        );

        let steps = ramp_steps(&schedule, spec.ramp_up, self.config.max_ramp_steps);
        let mut proceed = true;
        if !steps.is_empty() {
            self.phase_started(run_id, Phase::RampUp);
            let ramp_start = Instant::now();
            for step in &steps {
                debug!(%run_id, level = step.level, "Ramp-up step");
                proceed = runner
                    .hold(&schedule, step.level, ramp_start + step.end, Phase::RampUp)
                    .await;
                if !proceed {
                    break;
                }
            }
            self.phase_completed(run_id, Phase::RampUp, runner.outcomes.len());
        }

        if proceed {
            self.phase_started(run_id, Phase::Sustained);
            let deadline = Instant::now() + spec.duration;
            proceed = runner
                .hold(&schedule, schedule.target_level(), deadline, Phase::Sustained)
                .await;
            self.phase_completed(run_id, Phase::Sustained, runner.outcomes.len());
        }

        let cancelled = !proceed;
        if cancelled {
            info!(%run_id, "Load test cancelled, ramping down");
        }

        self.phase_started(run_id, Phase::RampDown);
        let abandoned = runner.ramp_down(spec.ramp_down).await;
        self.phase_completed(run_id, Phase::RampDown, runner.outcomes.len());

        let elapsed = runner.clock.elapsed();
        let finished_at = Utc::now();
        let mut resource_samples = sampler.stop().await;
        if self.resource_share > 1 {
            resource_samples = resource_samples
                .iter()
                .map(|sample| sample.share(self.resource_share))
                .collect();
        }

        if !cancelled {
            if let Some(count) = spec.cooldown_requests.filter(|n| *n > 0) {
                self.run_burst(run_id, Phase::Cooldown, count, &target, spec.request_timeout)
                    .await;
            }
        }

        let memory_leak = sampler.detect_memory_leak(&resource_samples);
        let PhaseRunner {
            outcomes, skipped, ..
        } = runner;

        let report = build_report(ReportInput {
            run_id,
            name: spec.name.clone(),
            schedule,
            started_at,
            finished_at,
            elapsed,
            outcomes: &outcomes,
            abandoned_requests: abandoned,
            skipped_requests: skipped,
            resource_samples,
            memory_leak,
            throughput_window: self.config.throughput_window,
        });

        info!(
            %run_id,
            total = report.total_requests,
            successful = report.successful_requests,
            failed = report.failed_requests,
            timed_out = report.timed_out_requests,
            success_rate = report.success_rate(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Load test completed"
        );
        self.emit(LoadTestEvent::RunCompleted {
            run_id,
            total_requests: report.total_requests,
            error_rate: report.error_rate,
            cancelled,
        });

        Ok(GeneratorOutput {
            report,
            outcomes,
            cancelled,
        })
    }

    /// Fire `count` unmeasured requests at the warmup concurrency and wait for them
    async fn run_burst(
        &self,
        run_id: RunId,
        phase: Phase,
        count: usize,
        target: &Arc<dyn Target>,
        request_timeout: Duration,
    ) {
        self.phase_started(run_id, phase);
        let width = self.config.warmup_concurrency.max(1);
        let mut pending = FuturesUnordered::new();
        let mut issued = 0usize;
        let mut failures = 0usize;

        loop {
            while issued < count && pending.len() < width && !self.cancel.is_cancelled() {
                pending.push(execute_request(
                    issued as u64,
                    Arc::clone(target),
                    request_timeout,
                ));
                issued += 1;
            }
            match pending.next().await {
                Some(outcome) if !outcome.is_success() => failures += 1,
                Some(_) => {}
                None => break,
            }
        }

        debug!(%run_id, %phase, issued, failures, "Unmeasured burst finished");
        self.phase_completed(run_id, phase, 0);
    }

    fn phase_started(&self, run_id: RunId, phase: Phase) {
        info!(%run_id, %phase, measured = phase.is_measured(), "Phase started");
        self.emit(LoadTestEvent::PhaseStarted { run_id, phase });
    }

    fn phase_completed(&self, run_id: RunId, phase: Phase, completed: usize) {
        self.emit(LoadTestEvent::PhaseCompleted {
            run_id,
            phase,
            completed,
        });
    }

    fn emit(&self, event: LoadTestEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Mutable state of the measured phases
struct PhaseRunner {
    run_id: RunId,
    target: Arc<dyn Target>,
    request_timeout: Duration,
    max_in_flight: Option<usize>,
    in_flight: FuturesUnordered<BoxFuture<'static, RequestOutcome>>,
    outcomes: Vec<RequestOutcome>,
    next_id: u64,
    next_arrival: Option<Instant>,
    skipped: usize,
    cancel: CancellationToken,
    events: broadcast::Sender<LoadTestEvent>,
    progress_interval: Duration,
    next_progress: Instant,
    clock: Instant,
}

enum Wake {
    Cancelled,
    Settled(RequestOutcome),
    Timer,
}

impl PhaseRunner {
    fn new(
        run_id: RunId,
        target: Arc<dyn Target>,
        spec: &LoadTestSpec,
        cancel: CancellationToken,
        events: broadcast::Sender<LoadTestEvent>,
        progress_interval: Duration,
        first_id: u64,
    ) -> Self {
        let clock = Instant::now();
        let progress_interval = progress_interval.max(Duration::from_millis(1));
        Self {
            run_id,
            target,
            request_timeout: spec.request_timeout,
            max_in_flight: spec.max_in_flight,
            in_flight: FuturesUnordered::new(),
            outcomes: Vec::new(),
            next_id: first_id,
            next_arrival: None,
            skipped: 0,
            cancel,
            events,
            progress_interval,
            next_progress: clock + progress_interval,
            clock,
        }
    }

    /// Hold a load level until `deadline`; returns false if cancelled
    async fn hold(
        &mut self,
        schedule: &Schedule,
        level: f64,
        deadline: Instant,
        phase: Phase,
    ) -> bool {
        match schedule {
            Schedule::Concurrency { .. } => {
                self.hold_concurrency(level as usize, deadline, phase).await
            }
            Schedule::Rate { .. } => self.hold_rate(level, deadline, phase).await,
        }
    }

    async fn hold_concurrency(&mut self, level: usize, deadline: Instant, phase: Phase) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            if Instant::now() >= deadline {
                return true;
            }

            while self.in_flight.len() < level {
                self.issue();
            }

            let wake_at = deadline.min(self.next_progress);
            if !self.wait(wake_at, phase).await {
                return false;
            }
        }
    }

    async fn hold_rate(&mut self, rate: f64, deadline: Instant, phase: Phase) -> bool {
        let interval = arrival_interval(rate);
        let now = Instant::now();
        // a faster rate must not wait out the previous, slower interval
        let first = match self.next_arrival {
            Some(next) => next.min(now + interval),
            None => now,
        };
        self.next_arrival = Some(first);
        let mut next_arrival = first;

        loop {
            if self.cancel.is_cancelled() {
                self.next_arrival = Some(next_arrival);
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                self.next_arrival = Some(next_arrival);
                return true;
            }

            // issue every arrival that is due, catching up if we fell behind
            while next_arrival <= now && next_arrival < deadline {
                match self.max_in_flight {
                    Some(cap) if self.in_flight.len() >= cap => {
                        self.skipped += 1;
                        debug!(run_id = %self.run_id, cap, "In-flight cap reached, skipping arrival");
                    }
                    _ => self.issue(),
                }
                next_arrival += interval;
            }

            let wake_at = deadline.min(next_arrival).min(self.next_progress);
            if !self.wait(wake_at, phase).await {
                self.next_arrival = Some(next_arrival);
                return false;
            }
        }
    }

    /// Wait for a completion, the wake-up time or cancellation
    async fn wait(&mut self, wake_at: Instant, phase: Phase) -> bool {
        let wake = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Wake::Cancelled,
            Some(outcome) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                Wake::Settled(outcome)
            }
            _ = sleep_until(wake_at) => Wake::Timer,
        };

        match wake {
            Wake::Cancelled => return false,
            Wake::Settled(outcome) => self.outcomes.push(outcome),
            Wake::Timer => {}
        }
        self.maybe_report_progress(phase);
        true
    }

    fn issue(&mut self) {
        let id = self.next_id;
        self.next_id += 1;
        self.in_flight.push(execute_request(
            id,
            Arc::clone(&self.target),
            self.request_timeout,
        ));
    }

    fn maybe_report_progress(&mut self, phase: Phase) {
        let now = Instant::now();
        if now < self.next_progress {
            return;
        }
        while self.next_progress <= now {
            self.next_progress += self.progress_interval;
        }
        let _ = self.events.send(LoadTestEvent::Progress {
            run_id: self.run_id,
            phase,
            completed: self.outcomes.len(),
            in_flight: self.in_flight.len(),
            elapsed: self.clock.elapsed(),
        });
    }

    /// Stop admissions and give in-flight requests up to `grace` to settle
    ///
    /// Returns the number of requests abandoned at the deadline.
    async fn ramp_down(&mut self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        while !self.in_flight.is_empty() {
            match timeout_at(deadline, self.in_flight.next()).await {
                Ok(Some(outcome)) => self.outcomes.push(outcome),
                Ok(None) | Err(_) => break,
            }
        }

        let abandoned = self.in_flight.len();
        if abandoned > 0 {
            error!(
                run_id = %self.run_id,
                abandoned,
                grace_ms = grace.as_millis() as u64,
                "Requests still in flight after ramp-down were abandoned"
            );
        }
        // dropping the races detaches the target tasks
        self.in_flight = FuturesUnordered::new();
        abandoned
    }
}

/// Call the target once, racing it against `request_timeout`
fn execute_request(
    id: u64,
    target: Arc<dyn Target>,
    request_timeout: Duration,
) -> BoxFuture<'static, RequestOutcome> {
    async move {
        let started_at = Utc::now();
        let clock = Instant::now();
        let call = tokio::spawn(async move { target.call().await });

        let error = match timeout(request_timeout, call).await {
            Ok(Ok(Ok(()))) => return RequestOutcome::success(id, started_at, clock.elapsed()),
            Ok(Ok(Err(e))) => RequestError::Failed(format!("{:#}", e)),
            Ok(Err(join_error)) if join_error.is_panic() => {
                RequestError::Panicked(panic_message(join_error.into_panic()))
            }
            Ok(Err(join_error)) => RequestError::Failed(join_error.to_string()),
            Err(_) => RequestError::TimedOut {
                timeout_ms: request_timeout.as_millis() as u64,
            },
        };
        RequestOutcome::failure(id, started_at, clock.elapsed(), &error)
    }
    .boxed()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        warn!("Target panicked with a non-string payload");
        "non-string panic payload".to_string()
    }
}

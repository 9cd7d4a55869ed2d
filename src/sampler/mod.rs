//! Periodic process resource sampling
//!
//! A [`ResourceSampler`] snapshots process CPU usage, resident memory and the OS
//! load average on a fixed cadence between [`start`](ResourceSampler::start) and
//! [`stop`](ResourceSampler::stop). The background task owns the sample buffer and
//! hands it back when stopped, so nothing else can observe a half-written series.
//!
//! ```rust,no_run
//! use stampede::sampler::{ResourceSampler, SamplerConfig};
//!
//! # async fn example() {
//! let mut sampler = ResourceSampler::new(SamplerConfig::default());
//! sampler.start();
//! // ... generate load ...
//! let samples = sampler.stop().await;
//! if let Some(leak) = sampler.detect_memory_leak(&samples) {
//!     println!("memory grew by {:.0} bytes", leak.growth_bytes);
//! }
//! # }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::{get_current_pid, Pid, ProcessExt, System, SystemExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::mean;
use crate::types::{LeakReport, LoadAverage, ResourceSample};
use crate::utils::{bytes_to_mb, duration_millis};

/// Sampler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Time between samples
    #[serde(with = "duration_millis", default = "default_interval")]
    pub interval: Duration,
    /// Memory growth above which a leak is suspected
    #[serde(default = "default_leak_threshold")]
    pub leak_threshold_bytes: u64,
    /// Number of samples averaged at each end of the series
    #[serde(default = "default_leak_window")]
    pub leak_window: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            leak_threshold_bytes: default_leak_threshold(),
            leak_window: default_leak_window(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_leak_threshold() -> u64 {
    50 * 1024 * 1024 // 50MB
}

fn default_leak_window() -> usize {
    5
}

/// Reads resource figures for the current process
pub struct SystemProbe {
    system: System,
    pid: Option<Pid>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        let pid = match get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Unable to resolve current pid, process metrics disabled: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Take one snapshot
    ///
    /// CPU usage is measured relative to the previous call, so the first snapshot
    /// of a probe reports 0%.
    pub fn snapshot(&mut self) -> ResourceSample {
        let (cpu_percent, memory_bytes) = match self.pid {
            Some(pid) if self.system.refresh_process(pid) => self
                .system
                .process(pid)
                .map(|p| (p.cpu_usage() as f64, p.memory()))
                .unwrap_or((0.0, 0)),
            _ => (0.0, 0),
        };
        let load = self.system.load_average();

        ResourceSample {
            timestamp: Utc::now(),
            cpu_percent,
            memory_bytes,
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
        }
    }
}

/// Background resource sampler
pub struct ResourceSampler {
    config: SamplerConfig,
    stop_token: CancellationToken,
    handle: Option<JoinHandle<Vec<ResourceSample>>>,
    probe: Option<SystemProbe>,
}

impl ResourceSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            stop_token: CancellationToken::new(),
            handle: None,
            probe: None,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Whether a sampling task is currently running
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start sampling in the background
    ///
    /// The first sample is taken immediately. Calling `start` on a running sampler
    /// does nothing.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            debug!("Resource sampler already running");
            return;
        }

        let stop_token = CancellationToken::new();
        self.stop_token = stop_token.clone();
        let interval = self.config.interval.max(Duration::from_millis(1));

        self.handle = Some(tokio::spawn(async move {
            let mut probe = SystemProbe::new();
            let mut samples = Vec::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_token.cancelled() => break,
                    _ = ticker.tick() => samples.push(probe.snapshot()),
                }
            }

            samples.push(probe.snapshot());
            samples
        }));
        debug!(interval_ms = interval.as_millis() as u64, "Resource sampler started");
    }

    /// Stop sampling and return the full series
    ///
    /// Returns an empty series if the sampler was never started.
    pub async fn stop(&mut self) -> Vec<ResourceSample> {
        let Some(handle) = self.handle.take() else {
            return Vec::new();
        };
        self.stop_token.cancel();
        match handle.await {
            Ok(samples) => {
                debug!(samples = samples.len(), "Resource sampler stopped");
                samples
            }
            Err(e) => {
                warn!("Resource sampler task ended abnormally: {}", e);
                Vec::new()
            }
        }
    }

    /// Take a single on-demand sample, independent of the background series
    ///
    /// The probe is kept between calls, so CPU usage covers the time since the
    /// previous `snapshot`.
    pub fn snapshot(&mut self) -> ResourceSample {
        self.probe.get_or_insert_with(SystemProbe::new).snapshot()
    }

    /// Apply the leak heuristic with this sampler's configuration
    pub fn detect_memory_leak(&self, samples: &[ResourceSample]) -> Option<LeakReport> {
        detect_memory_leak(
            samples,
            self.config.leak_window,
            self.config.leak_threshold_bytes,
        )
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        self.stop_token.cancel();
    }
}

/// Compare mean memory of the first and last `window` samples
///
/// Short series use the whole series for both windows, so growth is only reported
/// once there is more than one sample. Returns `None` for an empty series.
pub fn detect_memory_leak(
    samples: &[ResourceSample],
    window: usize,
    threshold_bytes: u64,
) -> Option<LeakReport> {
    if samples.is_empty() {
        return None;
    }
    let window = window.clamp(1, samples.len());
    let memory: Vec<f64> = samples.iter().map(|s| s.memory_bytes as f64).collect();
    let initial_mean_bytes = mean(&memory[..window]);
    let final_mean_bytes = mean(&memory[memory.len() - window..]);
    let growth_bytes = final_mean_bytes - initial_mean_bytes;
    let suspected = growth_bytes > threshold_bytes as f64;

    if suspected {
        warn!(
            growth_mb = bytes_to_mb(growth_bytes),
            "Possible memory leak: resident memory kept growing during the run"
        );
    }

    Some(LeakReport {
        initial_mean_bytes,
        final_mean_bytes,
        growth_bytes,
        suspected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(memory_mb: u64) -> ResourceSample {
        ResourceSample {
            timestamp: Utc::now(),
            cpu_percent: 0.0,
            memory_bytes: memory_mb * 1024 * 1024,
            load_average: LoadAverage::default(),
        }
    }

    #[test]
    fn test_leak_detected_above_threshold() {
        let samples: Vec<_> = (0..10).map(|i| sample(100 + i * 20)).collect();
        let report = detect_memory_leak(&samples, 5, 50 * 1024 * 1024).unwrap();
        // first five average 140MB, last five average 240MB
        assert_eq!(report.growth_bytes, 100.0 * 1024.0 * 1024.0);
        assert!(report.suspected);
    }

    #[test]
    fn test_flat_memory_not_suspected() {
        let samples: Vec<_> = (0..10).map(|_| sample(200)).collect();
        let report = detect_memory_leak(&samples, 5, 50 * 1024 * 1024).unwrap();
        assert_eq!(report.growth_bytes, 0.0);
        assert!(!report.suspected);
    }

    #[test]
    fn test_leak_detection_empty_series() {
        assert!(detect_memory_leak(&[], 5, 1).is_none());
    }

    #[test]
    fn test_probe_snapshot() {
        let mut probe = SystemProbe::new();
        let sample = probe.snapshot();
        assert!(sample.cpu_percent >= 0.0);
        assert!(sample.load_average.one >= 0.0);
    }

    #[tokio::test]
    async fn test_sampler_collects_series() {
        let mut sampler = ResourceSampler::new(SamplerConfig {
            interval: Duration::from_millis(20),
            ..Default::default()
        });
        sampler.start();
        assert!(sampler.is_running());
        tokio::time::sleep(Duration::from_millis(110)).await;
        let samples = sampler.stop().await;

        assert!(!sampler.is_running());
        // immediate tick, a few interval ticks, and the final snapshot
        assert!(samples.len() >= 3);
        assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_on_demand_snapshots_are_ordered() {
        let mut sampler = ResourceSampler::new(SamplerConfig::default());
        let first = sampler.snapshot();
        let second = sampler.snapshot();
        assert!(first.timestamp <= second.timestamp);
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut sampler = ResourceSampler::new(SamplerConfig::default());
        assert!(sampler.stop().await.is_empty());
    }
}

//! Ramp-up step planning.
//!
//! Ramp-up raises the load from zero to the target in discrete steps instead of
//! starting at full load. These functions are pure so the plan can be inspected and
//! tested without running anything.

use std::time::Duration;

use crate::types::Schedule;

/// One ramp-up step: hold `level` from `start` until `end` (offsets from ramp start)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampStep {
    pub start: Duration,
    pub end: Duration,
    /// Concurrency (rounded up to a whole request) or arrival rate
    pub level: f64,
}

/// Upper bound on the number of ramp-up steps, whatever the configuration asks for
pub const MAX_RAMP_STEPS: usize = 1000;

/// Plan the ramp-up for a schedule
///
/// Uses at most `max_steps` steps (never more than [`MAX_RAMP_STEPS`]), and fewer
/// when the target concurrency is smaller than that. Step `k` (1-based) of `n` runs at `target * k / n`, rounded up for
/// concurrency. Returns no steps when there is nothing to ramp.
pub fn ramp_steps(schedule: &Schedule, ramp_up: Duration, max_steps: usize) -> Vec<RampStep> {
    let target = schedule.target_level();
    if ramp_up.is_zero() || target <= 0.0 || max_steps == 0 {
        return Vec::new();
    }

    let max_steps = max_steps.min(MAX_RAMP_STEPS);
    let whole_requests = matches!(schedule, Schedule::Concurrency { .. });
    let steps = if whole_requests {
        max_steps.min(target as usize)
    } else {
        max_steps
    };
    let step_duration = ramp_up / steps as u32;

    (1..=steps)
        .map(|k| {
            let fraction = target * k as f64 / steps as f64;
            let level = if whole_requests {
                fraction.ceil()
            } else {
                fraction
            };
            let start = step_duration * (k as u32 - 1);
            let end = if k == steps {
                ramp_up
            } else {
                step_duration * k as u32
            };
            RampStep { start, end, level }
        })
        .collect()
}

/// Longest interval returned by [`arrival_interval`]
pub const MAX_ARRIVAL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Inter-arrival interval for a rate in requests per second (`1000 / rate` ms)
///
/// Capped at [`MAX_ARRIVAL_INTERVAL`] so vanishing rates stay representable.
pub fn arrival_interval(requests_per_second: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / requests_per_second)
        .map(|interval| interval.min(MAX_ARRIVAL_INTERVAL))
        .unwrap_or(MAX_ARRIVAL_INTERVAL)
}

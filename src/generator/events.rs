//! Run lifecycle events.
//!
//! Events for one run are emitted in phase order. Runs on different generators are
//! not ordered relative to each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::{RunId, Schedule};

/// Phases of a load test, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    RampUp,
    Sustained,
    RampDown,
    Cooldown,
}

impl Phase {
    /// Whether outcomes from this phase are part of the report
    pub fn is_measured(&self) -> bool {
        matches!(self, Phase::RampUp | Phase::Sustained | Phase::RampDown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Warmup => "warmup",
            Phase::RampUp => "ramp-up",
            Phase::Sustained => "sustained",
            Phase::RampDown => "ramp-down",
            Phase::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

/// Notification published while a load test runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadTestEvent {
    RunStarted {
        run_id: RunId,
        name: String,
        schedule: Schedule,
    },
    PhaseStarted {
        run_id: RunId,
        phase: Phase,
    },
    Progress {
        run_id: RunId,
        phase: Phase,
        completed: usize,
        in_flight: usize,
        elapsed: Duration,
    },
    PhaseCompleted {
        run_id: RunId,
        phase: Phase,
        /// Outcomes recorded so far by the measured phases; 0 for warmup and cooldown
        completed: usize,
    },
    RunCompleted {
        run_id: RunId,
        total_requests: usize,
        error_rate: f64,
        cancelled: bool,
    },
}

impl LoadTestEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            LoadTestEvent::RunStarted { run_id, .. }
            | LoadTestEvent::PhaseStarted { run_id, .. }
            | LoadTestEvent::Progress { run_id, .. }
            | LoadTestEvent::PhaseCompleted { run_id, .. }
            | LoadTestEvent::RunCompleted { run_id, .. } => *run_id,
        }
    }
}

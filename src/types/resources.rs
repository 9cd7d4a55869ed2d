//! System resource samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OS load average over the usual three windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// A point-in-time resource snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    /// Process CPU usage since the previous sample, in percent of one core
    pub cpu_percent: f64,
    /// Process resident memory
    pub memory_bytes: u64,
    pub load_average: LoadAverage,
}

impl ResourceSample {
    /// Element-wise sum, keeping the earlier timestamp
    pub fn combine(&self, other: &ResourceSample) -> ResourceSample {
        ResourceSample {
            timestamp: self.timestamp.min(other.timestamp),
            cpu_percent: self.cpu_percent + other.cpu_percent,
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
            load_average: LoadAverage {
                one: self.load_average.one + other.load_average.one,
                five: self.load_average.five + other.load_average.five,
                fifteen: self.load_average.fifteen + other.load_average.fifteen,
            },
        }
    }

    /// One of `parts` equal shares of this sample
    ///
    /// Workers that run as threads of one process each see the whole process, so
    /// they record a share and the shares add back up to the process figure.
    pub fn share(&self, parts: usize) -> ResourceSample {
        let parts = parts.max(1);
        let divisor = parts as f64;
        ResourceSample {
            timestamp: self.timestamp,
            cpu_percent: self.cpu_percent / divisor,
            memory_bytes: self.memory_bytes / parts as u64,
            load_average: LoadAverage {
                one: self.load_average.one / divisor,
                five: self.load_average.five / divisor,
                fifteen: self.load_average.fifteen / divisor,
            },
        }
    }
}

/// Outcome of the memory growth heuristic
///
/// A suspected leak is a hint, not proof: allocators and caches routinely grow
/// during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakReport {
    /// Mean memory over the first window of samples
    pub initial_mean_bytes: f64,
    /// Mean memory over the last window of samples
    pub final_mean_bytes: f64,
    pub growth_bytes: f64,
    pub suspected: bool,
}

//! Static per-event performance parameters and job resource estimates

use serde::{Deserialize, Serialize};

/// Default wall time per event in seconds
pub const DEFAULT_TIME_PER_EVENT: f64 = 12.0;

/// Default output size per event in KB
pub const DEFAULT_SIZE_PER_EVENT: f64 = 512.0;

/// Default memory per event in MB
pub const DEFAULT_MEMORY_PER_EVENT: f64 = 0.5;

/// Per-event cost figures used to size jobs
///
/// Values read from configuration may be missing or nonsensical; use
/// [`PerformanceParams::sanitized`] before computing with them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceParams {
    /// Wall-clock seconds per event
    #[serde(default = "default_time_per_event")]
    pub time_per_event: f64,

    /// Output KB per event
    #[serde(default = "default_size_per_event")]
    pub size_per_event: f64,

    /// Memory MB per event
    #[serde(default = "default_memory_per_event")]
    pub memory_per_event: f64,
}

impl Default for PerformanceParams {
    fn default() -> Self {
        Self {
            time_per_event: DEFAULT_TIME_PER_EVENT,
            size_per_event: DEFAULT_SIZE_PER_EVENT,
            memory_per_event: DEFAULT_MEMORY_PER_EVENT,
        }
    }
}

impl PerformanceParams {
    /// Replace every non-finite or non-positive value with its default
    pub fn sanitized(&self) -> Self {
        Self {
            time_per_event: positive_or(self.time_per_event, DEFAULT_TIME_PER_EVENT),
            size_per_event: positive_or(self.size_per_event, DEFAULT_SIZE_PER_EVENT),
            memory_per_event: positive_or(self.memory_per_event, DEFAULT_MEMORY_PER_EVENT),
        }
    }

    /// Same parameters with a different time per event
    pub fn with_time_per_event(self, time_per_event: f64) -> Self {
        Self {
            time_per_event: positive_or(time_per_event, self.time_per_event),
            ..self
        }
    }

    /// Estimated wall time for `events` events
    pub fn wall_time(&self, events: u64) -> f64 {
        events as f64 * self.time_per_event
    }
}

/// Resources a job is expected to need
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    /// Wall time in seconds
    pub wall_time_secs: f64,
    /// Disk in KB
    pub disk_kb: f64,
    /// Memory in MB
    pub memory_mb: f64,
}

impl ResourceEstimate {
    /// Scale `params` linearly by `events`
    pub fn for_events(params: &PerformanceParams, events: u64) -> Self {
        let n = events as f64;
        Self {
            wall_time_secs: n * params.time_per_event,
            disk_kb: n * params.size_per_event,
            memory_mb: n * params.memory_per_event,
        }
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

fn default_time_per_event() -> f64 {
    DEFAULT_TIME_PER_EVENT
}

fn default_size_per_event() -> f64 {
    DEFAULT_SIZE_PER_EVENT
}

fn default_memory_per_event() -> f64 {
    DEFAULT_MEMORY_PER_EVENT
}

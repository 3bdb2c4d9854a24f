//! Memory sensors consulted by eviction triggers

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::System;

/// Source of memory statistics
pub trait MemorySensor: Send + Sync {
    /// System-wide memory in use, as a percentage (0.0 - 100.0)
    fn used_percent(&self) -> f64;

    /// Memory the process may use, in bytes
    fn allotted_bytes(&self) -> u64;
}

/// Default minimum time between two system memory reads
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

struct Sample {
    used_percent: f64,
    allotted_bytes: u64,
    taken_at: Instant,
}

struct SystemState {
    system: System,
    last: Option<Sample>,
    refreshes: u64,
}

/// Sensor backed by `sysinfo`
///
/// Readings are cached and refreshed at most once per refresh interval, so
/// the local tier's write path does not hit `/proc` on every insert.
pub struct SystemMemorySensor {
    state: Mutex<SystemState>,
    refresh_interval: Duration,
}

impl SystemMemorySensor {
    /// Create a new system sensor
    pub fn new() -> Self {
        Self::with_refresh_interval(DEFAULT_REFRESH_INTERVAL)
    }

    /// Create a sensor that re-reads system memory at most every `interval`
    pub fn with_refresh_interval(interval: Duration) -> Self {
        Self {
            state: Mutex::new(SystemState {
                system: System::new(),
                last: None,
                refreshes: 0,
            }),
            refresh_interval: interval,
        }
    }

    /// Number of system memory reads performed so far
    pub fn refresh_count(&self) -> u64 {
        self.state.lock().refreshes
    }

    fn sample(&self) -> (f64, u64) {
        let mut state = self.state.lock();
        if let Some(last) = &state.last {
            if last.taken_at.elapsed() < self.refresh_interval {
                return (last.used_percent, last.allotted_bytes);
            }
        }

        state.system.refresh_memory();
        state.refreshes += 1;
        let total = state.system.total_memory();
        let used_percent = if total == 0 {
            0.0
        } else {
            state.system.used_memory() as f64 / total as f64 * 100.0
        };
        // Containers report their cgroup limit; bare hosts fall back to total RAM
        let allotted_bytes = match state.system.cgroup_limits() {
            Some(limits) if limits.total_memory > 0 => limits.total_memory,
            _ => total,
        };

        state.last = Some(Sample {
            used_percent,
            allotted_bytes,
            taken_at: Instant::now(),
        });
        (used_percent, allotted_bytes)
    }
}

impl Default for SystemMemorySensor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySensor for SystemMemorySensor {
    fn used_percent(&self) -> f64 {
        self.sample().0
    }

    fn allotted_bytes(&self) -> u64 {
        self.sample().1
    }
}

/// Sensor returning fixed readings
#[derive(Debug, Clone, Copy)]
pub struct FixedMemorySensor {
    used_percent: f64,
    allotted_bytes: u64,
}

impl FixedMemorySensor {
    /// Create a sensor that always reports the given values
    pub fn new(used_percent: f64, allotted_bytes: u64) -> Self {
        Self {
            used_percent,
            allotted_bytes,
        }
    }
}

impl MemorySensor for FixedMemorySensor {
    fn used_percent(&self) -> f64 {
        self.used_percent
    }

    fn allotted_bytes(&self) -> u64 {
        self.allotted_bytes
    }
}

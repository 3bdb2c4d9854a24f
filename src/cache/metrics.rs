//! Cache Metrics Collection
//!
//! Per-tier counters kept by the cache manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one tier
#[derive(Debug)]
pub struct TierMetrics {
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    backfills: AtomicU64,
    // Exponential moving average, microseconds
    read_latency_us: AtomicU64,
}

impl TierMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            backfills: AtomicU64::new(0),
            read_latency_us: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill(&self) {
        self.backfills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_latency(&self, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1; // EMA smoothing factor

        loop {
            let current = self.read_latency_us.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if self
                .read_latency_us
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn backfills(&self) -> u64 {
        self.backfills.load(Ordering::Relaxed)
    }

    pub fn read_latency(&self) -> Duration {
        Duration::from_micros(self.read_latency_us.load(Ordering::Relaxed))
    }

    /// Hits over lookups; errors count as lookups
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64 + self.errors() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn snapshot(&self) -> TierMetricsSnapshot {
        TierMetricsSnapshot {
            name: self.name.clone(),
            hits: self.hits(),
            misses: self.misses(),
            errors: self.errors(),
            backfills: self.backfills(),
            hit_ratio: self.hit_ratio(),
            read_latency: self.read_latency(),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.backfills.store(0, Ordering::Relaxed);
        self.read_latency_us.store(0, Ordering::Relaxed);
    }
}

/// Cache metrics collector
#[derive(Debug)]
pub struct CacheMetrics {
    tiers: Vec<TierMetrics>,
    // Lookups that missed on every tier
    total_misses: AtomicU64,
    fallback_loads: AtomicU64,
}

impl CacheMetrics {
    /// Create a collector with one slot per tier, in tier order
    pub fn new<I, S>(tier_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tiers: tier_names.into_iter().map(TierMetrics::new).collect(),
            total_misses: AtomicU64::new(0),
            fallback_loads: AtomicU64::new(0),
        }
    }

    /// Counters for the tier at `index`
    pub fn tier(&self, index: usize) -> Option<&TierMetrics> {
        self.tiers.get(index)
    }

    pub fn record_total_miss(&self) {
        self.total_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_load(&self) {
        self.fallback_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses.load(Ordering::Relaxed)
    }

    pub fn fallback_loads(&self) -> u64 {
        self.fallback_loads.load(Ordering::Relaxed)
    }

    /// Get overall cache hit ratio
    pub fn overall_hit_ratio(&self) -> f64 {
        let total_hits: u64 = self.tiers.iter().map(TierMetrics::hits).sum();
        let total = total_hits + self.total_misses();

        if total == 0 {
            0.0
        } else {
            total_hits as f64 / total as f64
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tiers: self.tiers.iter().map(TierMetrics::snapshot).collect(),
            total_misses: self.total_misses(),
            fallback_loads: self.fallback_loads(),
            overall_hit_ratio: self.overall_hit_ratio(),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for tier in &self.tiers {
            tier.reset();
        }
        self.total_misses.store(0, Ordering::Relaxed);
        self.fallback_loads.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of one tier's counters
#[derive(Debug, Clone, PartialEq)]
pub struct TierMetricsSnapshot {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub backfills: u64,
    pub hit_ratio: f64,
    pub read_latency: Duration,
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Per tier, in tier order
    pub tiers: Vec<TierMetricsSnapshot>,
    pub total_misses: u64,
    pub fallback_loads: u64,
    pub overall_hit_ratio: f64,
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Eviction Subsystem
//!
//! Runs after every local-tier write, in two independent steps:
//!
//! 1. Expire sweep: pop heap entries whose expiry has passed and delete the
//!    map entries they were created for. Always runs.
//! 2. Strategy eviction: if any [`TriggerStrategy`] fires, run the
//!    [`EvictionPolicy`] once.

use tracing::{debug, warn};

use super::entry::now_millis;
use super::local::LocalStore;
use super::sensor::MemorySensor;

/// Read-only view of local tier state handed to trigger strategies
pub struct TierSnapshot<'a> {
    store: &'a LocalStore,
    sensor: &'a dyn MemorySensor,
}

impl<'a> TierSnapshot<'a> {
    pub(crate) fn new(store: &'a LocalStore, sensor: &'a dyn MemorySensor) -> Self {
        Self { store, sensor }
    }

    /// System-wide memory in use (percentage)
    pub fn memory_usage(&self) -> f64 {
        self.sensor.used_percent()
    }

    /// Memory allotted to the process (bytes)
    pub fn allotted_bytes(&self) -> u64 {
        self.sensor.allotted_bytes()
    }

    /// Running byte size of the map contents
    pub fn store_size(&self) -> u64 {
        self.store.store_size()
    }

    /// Running byte size of the heap contents
    pub fn heap_byte_size(&self) -> u64 {
        self.store.heap().total_byte_size()
    }

    /// Heap entries (inserts minus pops)
    pub fn heap_size(&self) -> usize {
        self.store.heap().size()
    }
}

/// Predicate deciding whether the eviction policy should run
pub trait TriggerStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Check whether the resource threshold is exceeded
    fn check_condition(&self, tier: &TierSnapshot<'_>) -> bool;
}

/// Fires when system-wide memory usage exceeds a percentage
#[derive(Debug, Clone, Copy)]
pub struct RamPercentageTrigger {
    threshold: f64,
}

impl RamPercentageTrigger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl TriggerStrategy for RamPercentageTrigger {
    fn name(&self) -> &'static str {
        "ram-percentage"
    }

    fn check_condition(&self, tier: &TierSnapshot<'_>) -> bool {
        tier.memory_usage() > self.threshold
    }
}

/// Fires when the tier's own bytes reach a percentage of allotted memory
///
/// Counts both the map and the heap, since heap entries hold value copies.
#[derive(Debug, Clone, Copy)]
pub struct StoreSizeTrigger {
    threshold: f64,
}

impl StoreSizeTrigger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl TriggerStrategy for StoreSizeTrigger {
    fn name(&self) -> &'static str {
        "store-size"
    }

    fn check_condition(&self, tier: &TierSnapshot<'_>) -> bool {
        let allotted = tier.allotted_bytes();
        if allotted == 0 {
            warn!(trigger = self.name(), "Sensor reports no allotted memory; skipping trigger");
            return false;
        }
        let total = tier.store_size() + tier.heap_byte_size();
        total as f64 / allotted as f64 * 100.0 >= self.threshold
    }
}

/// Batch eviction algorithm
pub trait EvictionPolicy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Evict from the store, returning the number of map entries removed
    fn evict(&self, store: &mut LocalStore) -> usize;
}

/// Default share of heap entries evicted per pass
pub const DEFAULT_EVICTION_PERCENTAGE: f64 = 0.1;

/// Default number of heap pops per deletion batch
pub const DEFAULT_EVICTION_BATCH_SIZE: usize = 1000;

/// Evicts the soonest-to-expire share of heap-tracked entries
#[derive(Debug, Clone, Copy)]
pub struct FirstExpiringPolicy {
    /// Share of heap entries to pop per pass (0.0 - 1.0)
    pub percentage: f64,
    /// Pops per deletion batch
    pub batch_size: usize,
}

impl Default for FirstExpiringPolicy {
    fn default() -> Self {
        Self {
            percentage: DEFAULT_EVICTION_PERCENTAGE,
            batch_size: DEFAULT_EVICTION_BATCH_SIZE,
        }
    }
}

impl FirstExpiringPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of heap entries one pass pops for a heap of `heap_size`
    pub fn target_count(&self, heap_size: usize) -> usize {
        let target = (heap_size as f64 * self.percentage).ceil() as usize;
        target.min(heap_size)
    }
}

impl EvictionPolicy for FirstExpiringPolicy {
    fn name(&self) -> &'static str {
        "first-expiring"
    }

    fn evict(&self, store: &mut LocalStore) -> usize {
        let mut remaining = self.target_count(store.heap().size());
        let batch_size = self.batch_size.max(1);
        let mut removed = 0;

        while remaining > 0 {
            let mut batch = Vec::with_capacity(batch_size.min(remaining));
            for _ in 0..batch_size.min(remaining) {
                match store.heap_mut().pop() {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            remaining -= batch.len();
            removed += store.remove_matching(&batch);
        }

        store.record_evicted(removed);
        removed
    }
}

/// Policy that never evicts
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPolicy;

impl EvictionPolicy for NoopPolicy {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn evict(&self, _store: &mut LocalStore) -> usize {
        0
    }
}

/// Wires trigger strategies and one policy to the local tier
pub struct EvictionManager {
    triggers: Vec<Box<dyn TriggerStrategy>>,
    policy: Box<dyn EvictionPolicy>,
}

impl EvictionManager {
    pub fn new(triggers: Vec<Box<dyn TriggerStrategy>>, policy: Box<dyn EvictionPolicy>) -> Self {
        Self { triggers, policy }
    }

    /// Pops expired heap entries and deletes the live entries they point at
    pub fn evict_expired(&self, store: &mut LocalStore) -> usize {
        self.evict_expired_at(store, now_millis())
    }

    pub(crate) fn evict_expired_at(&self, store: &mut LocalStore, now: i64) -> usize {
        let mut expired = Vec::new();
        while let Some(top) = store.heap().peek() {
            if top.expiry > now {
                break;
            }
            if let Some(item) = store.heap_mut().pop() {
                expired.push(item);
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let removed = store.remove_matching(&expired);
        store.record_expired(removed);
        if removed > 0 {
            debug!(removed, popped = expired.len(), "Expired local entries swept");
        }
        removed
    }

    /// Runs the policy if any trigger fires; returns entries removed
    pub fn evict_by_strategy(&self, store: &mut LocalStore, sensor: &dyn MemorySensor) -> usize {
        let fired = {
            let snapshot = TierSnapshot::new(store, sensor);
            self.triggers
                .iter()
                .find(|trigger| trigger.check_condition(&snapshot))
                .map(|trigger| trigger.name())
        };

        match fired {
            Some(trigger) => {
                let removed = self.policy.evict(store);
                debug!(
                    trigger,
                    policy = self.policy.name(),
                    removed,
                    "Eviction triggered"
                );
                removed
            }
            None => 0,
        }
    }

    /// Full pipeline run after every local write
    pub fn on_state_changed(&self, store: &mut LocalStore, sensor: &dyn MemorySensor) {
        self.evict_expired(store);
        self.evict_by_strategy(store, sensor);
    }

    /// Installed trigger strategy count
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// Name of the installed policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Local Tier - bounded in-memory cache
//!
//! Key/value map plus an [`ExpiryHeap`], behind one mutex so that purge and
//! eviction never observe a half-cleared state.
//!
//! # Design
//!
//! - Every `set` pushes a heap entry and then runs the eviction pipeline
//!   synchronously (expire sweep, then strategy-triggered eviction)
//! - `del` only touches the map; its heap entry is discarded when popped
//! - `get` runs the expire sweep first, `mget` does not
//! - Byte sizes are captured once per insert and tracked incrementally

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::codec;
use super::entry::{expiry_from_ttl, HeapItem, StoredItem};
use super::eviction::{
    EvictionManager, EvictionPolicy, FirstExpiringPolicy, RamPercentageTrigger, TriggerStrategy,
};
use super::heap::ExpiryHeap;
use super::sensor::{MemorySensor, SystemMemorySensor};
use super::tier::CacheTier;
use super::{CacheValue, DEFAULT_TTL};
use crate::error::Result;

/// Map, heap and accounting owned by the local tier
#[derive(Debug, Default)]
pub struct LocalStore {
    map: HashMap<String, StoredItem>,
    heap: ExpiryHeap,
    store_size: u64,
    expired: u64,
    evicted: u64,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`, pushing a fresh heap entry
    pub fn insert(&mut self, key: String, item: StoredItem) {
        self.heap.insert(HeapItem::from_stored(key.clone(), &item));
        self.store_size += item.byte_size;
        if let Some(old) = self.map.insert(key, item) {
            self.store_size = self.store_size.saturating_sub(old.byte_size);
        }
    }

    /// Live map entry for `key`
    pub fn get(&self, key: &str) -> Option<&StoredItem> {
        self.map.get(key)
    }

    /// Remove `key` from the map; the heap is left alone
    pub fn remove(&mut self, key: &str) -> Option<StoredItem> {
        let removed = self.map.remove(key)?;
        self.store_size = self.store_size.saturating_sub(removed.byte_size);
        Some(removed)
    }

    /// Remove the map entries the given heap items were created for
    ///
    /// Stale heap items (key overwritten or already deleted) remove nothing.
    pub fn remove_matching(&mut self, items: &[HeapItem]) -> usize {
        let mut removed = 0;
        for item in items {
            let live = self
                .map
                .get(&item.key)
                .is_some_and(|stored| item.matches(stored));
            if live && self.remove(&item.key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn heap(&self) -> &ExpiryHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ExpiryHeap {
        &mut self.heap
    }

    /// Running byte size of the map contents
    pub fn store_size(&self) -> u64 {
        self.store_size
    }

    /// Live map entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }

    pub(crate) fn record_evicted(&mut self, count: usize) {
        self.evicted += count as u64;
    }

    /// Drop map and heap together
    pub fn clear(&mut self) {
        self.map.clear();
        self.heap.clear();
        self.store_size = 0;
    }

    pub fn stats(&self) -> LocalStats {
        LocalStats {
            entries: self.map.len(),
            heap_entries: self.heap.size(),
            store_bytes: self.store_size,
            heap_bytes: self.heap.total_byte_size(),
            expired: self.expired,
            evicted: self.evicted,
        }
    }
}

/// Local tier statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalStats {
    /// Live map entries
    pub entries: usize,
    /// Heap entries, including stale ones
    pub heap_entries: usize,
    /// Map byte total
    pub store_bytes: u64,
    /// Heap byte total
    pub heap_bytes: u64,
    /// Entries removed by the expire sweep
    pub expired: u64,
    /// Entries removed by the eviction policy
    pub evicted: u64,
}

/// Local tier configuration
pub struct LocalTierConfig {
    /// Trigger strategies; the policy runs if any fires
    pub triggers: Vec<Box<dyn TriggerStrategy>>,
    /// Eviction policy
    pub policy: Box<dyn EvictionPolicy>,
    /// Memory sensor consulted by triggers
    pub sensor: Arc<dyn MemorySensor>,
    /// TTL applied by [`LocalTier::insert`]
    pub default_ttl: Duration,
}

impl Default for LocalTierConfig {
    fn default() -> Self {
        Self {
            triggers: vec![Box::new(RamPercentageTrigger::new(80.0))],
            policy: Box::new(FirstExpiringPolicy::default()),
            sensor: Arc::new(SystemMemorySensor::new()),
            default_ttl: DEFAULT_TTL,
        }
    }
}

/// Local Tier - in-process, bounded
pub struct LocalTier {
    store: Mutex<LocalStore>,
    eviction: EvictionManager,
    sensor: Arc<dyn MemorySensor>,
    default_ttl: Duration,
}

impl LocalTier {
    /// Create a local tier with default configuration
    pub fn new() -> Self {
        Self::with_config(LocalTierConfig::default())
    }

    /// Create a local tier with custom configuration
    ///
    /// Construction runs no eviction.
    pub fn with_config(config: LocalTierConfig) -> Self {
        Self {
            store: Mutex::new(LocalStore::new()),
            eviction: EvictionManager::new(config.triggers, config.policy),
            sensor: config.sensor,
            default_ttl: config.default_ttl,
        }
    }

    fn put(&self, store: &mut LocalStore, key: String, value: CacheValue, ttl: Duration) {
        let byte_size = codec::byte_len(&value);
        let item = StoredItem::new(value, expiry_from_ttl(ttl), byte_size);
        store.insert(key, item);
    }

    /// Store with the tier's default TTL
    pub fn insert(&self, key: &str, value: CacheValue) -> CacheValue {
        self.insert_with_ttl(key, value, self.default_ttl)
    }

    /// Store a value and run the eviction pipeline
    pub fn insert_with_ttl(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheValue {
        let mut store = self.store.lock();
        self.put(&mut store, key.to_string(), value.clone(), ttl);
        self.eviction.on_state_changed(&mut store, self.sensor.as_ref());
        value
    }

    /// Look up a key after sweeping expired entries
    pub fn lookup(&self, key: &str) -> Option<CacheValue> {
        let mut store = self.store.lock();
        self.eviction.evict_expired(&mut store);
        store.get(key).map(|item| item.value.clone())
    }

    /// Remove a key from the map
    pub fn remove(&self, key: &str) -> bool {
        self.store.lock().remove(key).is_some()
    }

    /// Clear map and heap
    pub fn purge(&self) {
        self.store.lock().clear();
    }

    /// Run the expire sweep now
    pub fn evict_expired(&self) -> usize {
        let mut store = self.store.lock();
        self.eviction.evict_expired(&mut store)
    }

    /// Evaluate triggers and run the policy now
    pub fn evict_by_strategy(&self) -> usize {
        let mut store = self.store.lock();
        self.eviction.evict_by_strategy(&mut store, self.sensor.as_ref())
    }

    /// System-wide memory in use (percentage)
    pub fn memory_usage(&self) -> f64 {
        self.sensor.used_percent()
    }

    /// Running byte size of the map contents
    pub fn store_size(&self) -> u64 {
        self.store.lock().store_size()
    }

    /// Heap entries (inserts minus pops)
    pub fn heap_size(&self) -> usize {
        self.store.lock().heap().size()
    }

    /// Running byte size of the heap contents
    pub fn heap_byte_size(&self) -> u64 {
        self.store.lock().heap().total_byte_size()
    }

    /// Live entries
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().get(key).is_some()
    }

    pub fn stats(&self) -> LocalStats {
        self.store.lock().stats()
    }
}

impl Default for LocalTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<CacheValue> {
        Ok(self.insert_with_ttl(key, value, ttl))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.remove(key);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<CacheValue>>> {
        let store = self.store.lock();
        Ok(keys
            .iter()
            .map(|key| store.get(key).map(|item| item.value.clone()))
            .collect())
    }

    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Duration) -> Result<()> {
        let mut store = self.store.lock();
        for (key, value) in entries {
            self.put(&mut store, key, value, ttl);
        }
        self.eviction.on_state_changed(&mut store, self.sensor.as_ref());
        Ok(())
    }

    async fn mdel(&self, keys: &[String]) -> Result<()> {
        let mut store = self.store.lock();
        for key in keys {
            store.remove(key);
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        self.purge();
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

//! In-process key/value store
//!
//! Behaves like a single Redis node for the commands the shared tier uses:
//! per-key TTLs with lazy expiry and token-guarded locks. Used for tests and
//! for running without a server.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Cap for expiries whose TTL would overflow the clock
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

fn expires_in(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: expires_in(ttl),
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-memory store backed by DashMap
pub struct InMemoryStore {
    name: String,
    data: DashMap<String, Slot>,
    /// While false every command fails
    available: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

/// Command counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    pub keys: usize,
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::named("memory-store")
    }
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a distinct name, e.g. one per simulated node
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: DashMap::new(),
            available: AtomicBool::new(true),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Simulate the node going away (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Remaining TTL of a live key
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.data
            .get(key)
            .filter(|slot| slot.is_live())
            .map(|slot| slot.expires_at.saturating_duration_since(Instant::now()))
    }

    pub fn stats(&self) -> InMemoryStoreStats {
        let keys = self.data.iter().filter(|slot| slot.is_live()).count();
        InMemoryStoreStats {
            keys,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Store(format!("{} is unavailable", self.name)))
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let slot = self.data.get(key)?;
        if slot.is_live() {
            return Some(slot.value.clone());
        }
        drop(slot);
        self.data.remove_if(key, |_, slot| !slot.is_live());
        None
    }

    fn write(&self, key: &str, value: String, ttl: Duration) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.data.insert(key.to_string(), Slot::new(value, ttl));
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.write(key, value, Duration::from_secs(super::ttl_seconds(ttl)));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.check_available()?;
        let mut removed = 0;
        for key in keys {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            if let Some((_, slot)) = self.data.remove(key) {
                if slot.is_live() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check_available()?;
        Ok(keys.iter().map(|key| self.read(key)).collect())
    }

    async fn mset(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        self.check_available()?;
        let ttl = Duration::from_secs(super::ttl_seconds(ttl));
        for (key, value) in entries {
            self.write(key, value.clone(), ttl);
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        self.check_available()?;
        self.data.clear();
        Ok(())
    }

    async fn try_lock(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let ttl = Duration::from_millis(super::ttl_millis(ttl));
        match self.data.entry(resource.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().is_live() {
                    return Ok(false);
                }
                held.insert(Slot::new(token.to_string(), ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(token.to_string(), ttl));
                Ok(true)
            }
        }
    }

    async fn unlock(&self, resource: &str, token: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self
            .data
            .remove_if(resource, |_, slot| slot.is_live() && slot.value == token)
            .is_some())
    }

    async fn extend_lock(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let ttl = Duration::from_millis(super::ttl_millis(ttl));
        match self.data.get_mut(resource) {
            Some(mut slot) if slot.is_live() && slot.value == token => {
                slot.expires_at = expires_in(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

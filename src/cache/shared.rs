//! Shared Tier - networked key/value store
//!
//! Adapts a [`KeyValueStore`] to the [`CacheTier`] interface: values are
//! JSON-encoded on the way in and decoded on the way out, TTLs become whole
//! seconds, and the tier is lock-capable through [`Redlock`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::codec;
use super::lock::{Lease, LockSettings, Redlock};
use super::tier::{lock_key, version_key, CacheTier, Lockable};
use super::CacheValue;
use crate::error::Result;
use crate::store::KeyValueStore;

/// Shared Tier - cross-process cache over a key/value store
pub struct SharedTier {
    store: Arc<dyn KeyValueStore>,
    redlock: Arc<Redlock>,
}

impl SharedTier {
    /// Wrap a store, locking on that same store with default settings
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_lock_settings(store, LockSettings::default())
    }

    /// Wrap a store, locking on that same store
    pub fn with_lock_settings(store: Arc<dyn KeyValueStore>, settings: LockSettings) -> Self {
        let redlock = Arc::new(Redlock::new(vec![Arc::clone(&store)], settings));
        Self { store, redlock }
    }

    /// Wrap a data store and lock across a separate set of nodes
    pub fn with_lock_nodes(
        store: Arc<dyn KeyValueStore>,
        lock_nodes: Vec<Arc<dyn KeyValueStore>>,
        settings: LockSettings,
    ) -> Self {
        Self {
            store,
            redlock: Arc::new(Redlock::new(lock_nodes, settings)),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Run `callback` while holding the lock for `key`
    ///
    /// The lease is released whether the callback succeeds or fails. If
    /// the lease cannot be acquired the callback never runs.
    pub async fn lock<T, F, Fut>(&self, key: &str, ttl: Duration, callback: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        let lease = self.acquire_lock(key, ttl).await?;
        Ok(lease.run(callback()).await)
    }
}

#[async_trait]
impl CacheTier for SharedTier {
    fn name(&self) -> &str {
        "shared"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let raw = self.store.get(key).await?;
        Ok(raw.as_deref().map(codec::decode))
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<CacheValue> {
        if ttl.is_zero() {
            // Already expired
            self.store.del(&[key.to_string()]).await?;
            return Ok(value);
        }
        let payload = codec::encode(&value)?;
        self.store.set(key, payload, ttl).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let removed = self
            .store
            .del(&[key.to_string(), version_key(key)])
            .await?;
        debug!(key, removed, "Shared tier DEL");
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<CacheValue>>> {
        let raw = self.store.mget(keys).await?;
        Ok(raw
            .iter()
            .map(|payload| payload.as_deref().map(codec::decode))
            .collect())
    }

    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            let keys: Vec<String> = entries.into_iter().map(|(key, _)| key).collect();
            self.store.del(&keys).await?;
            return Ok(());
        }
        let encoded = entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), codec::encode(value)?)))
            .collect::<Result<Vec<_>>>()?;
        self.store.mset(&encoded, ttl).await
    }

    async fn mdel(&self, keys: &[String]) -> Result<()> {
        self.store.del(keys).await?;
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        self.store.flush_all().await
    }

    fn lockable(self: Arc<Self>) -> Option<Arc<dyn Lockable>> {
        Some(self)
    }
}

#[async_trait]
impl Lockable for SharedTier {
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<Lease> {
        self.redlock.acquire(&lock_key(key), ttl).await
    }
}

// =============================================================================
// Tests
// =============================================================================

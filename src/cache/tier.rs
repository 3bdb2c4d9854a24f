//! Tier traits
//!
//! Every tier implements [`CacheTier`]. Tiers that can host a distributed
//! lease additionally implement [`Lockable`] and advertise it through
//! [`CacheTier::lockable`], which the manager queries once at construction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::lock::Lease;
use super::CacheValue;
use crate::error::Result;

/// One layer of the tiered cache
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Tier name for logs and metrics
    fn name(&self) -> &str;

    /// Look up a key; `None` on miss
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Store a value, returning the stored value
    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<CacheValue>;

    /// Remove a key
    async fn del(&self, key: &str) -> Result<()>;

    /// Look up several keys; results are positional
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<CacheValue>>>;

    /// Store several values with one TTL
    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Duration) -> Result<()>;

    /// Remove several keys
    async fn mdel(&self, keys: &[String]) -> Result<()>;

    /// Remove every key held by the tier
    async fn flush_all(&self) -> Result<()>;

    /// Get a key, storing `default` under it on miss
    async fn get_or_set(&self, key: &str, default: CacheValue, ttl: Duration) -> Result<CacheValue> {
        match self.get(key).await? {
            Some(value) => Ok(value),
            None => self.set(key, default, ttl).await,
        }
    }

    /// Lock capability, if the tier has one
    fn lockable(self: Arc<Self>) -> Option<Arc<dyn Lockable>> {
        None
    }
}

/// Tier capability: distributed mutual exclusion
#[async_trait]
pub trait Lockable: Send + Sync {
    /// Acquire the lease guarding `key` for `ttl`
    ///
    /// The lease is extended automatically until released or dropped.
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<Lease>;
}

/// Lock resource name for a cache key
pub fn lock_key(key: &str) -> String {
    format!("lock:{}", key)
}

/// Version counter key for a key or namespace
pub fn version_key(key: &str) -> String {
    format!("{}:version", key)
}

/// Physical key for a logical key at a given version
pub fn versioned_key(key: &str, version: u64) -> String {
    format!("{}:{}", key, version)
}

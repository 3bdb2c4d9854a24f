//! Key/value backends for the shared tier
//!
//! A [`KeyValueStore`] speaks strings only. Value encoding happens one level
//! up in the shared tier, and lock semantics (quorum, retries, extension)
//! live in the Redlock client; backends only provide the single-node
//! compare-token primitives.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::{InMemoryStore, InMemoryStoreStats};
pub use self::redis::RedisStore;

/// String key/value backend
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Fetch a raw payload
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a raw payload with a TTL (whole seconds, at least one)
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Fetch several payloads, positionally
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Store several payloads with one TTL in a single round trip
    async fn mset(&self, entries: &[(String, String)], ttl: Duration) -> Result<()>;

    /// Remove every key in the backend
    async fn flush_all(&self) -> Result<()>;

    /// Set `resource` to `token` only if absent, expiring after `ttl`
    async fn try_lock(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Delete `resource` only if it still holds `token`
    async fn unlock(&self, resource: &str, token: &str) -> Result<bool>;

    /// Reset the expiry of `resource` only if it still holds `token`
    async fn extend_lock(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;
}

/// TTL in whole seconds as sent to the backend
pub fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Lock TTL in milliseconds as sent to the backend
pub fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

//! Cache Manager - Unified Tiered Cache
//!
//! Orchestrates an ordered list of tiers. Index 0 is the nearest tier and is
//! consulted first on every read.
//!
//! # Protocol
//!
//! - Reads walk the tiers in order. A tier error counts as a miss. The first
//!   hit is written back into every earlier tier.
//! - Writes and deletes fan out to every tier in parallel; one failing tier
//!   never fails the call.
//! - With versioning on, logical keys resolve to `<key>:<version>` once per
//!   call, against tier 0's counter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::codec;
use super::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use super::tier::{versioned_key, CacheTier, Lockable};
use super::versioning::VersionedTier;
use super::{CacheValue, DEFAULT_LOCK_TTL, DEFAULT_TTL};
use crate::error::{Error, Result};

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// TTL for writes that do not name one
    pub default_ttl: Duration,
    /// Lease TTL for `lock` calls that do not name one
    pub default_lock_ttl: Duration,
    /// Resolve keys through version counters
    pub versioning: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            default_lock_ttl: DEFAULT_LOCK_TTL,
            versioning: false,
        }
    }
}

type LoaderFn<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, anyhow::Result<T>> + Send + 'a>;

/// What [`CacheManager::get_or`] returns when every tier misses
pub enum Fallback<'a, T> {
    /// Returned as is; nothing is written back
    Literal(T),
    /// Invoked once; its result is stored through `set` and returned
    Loader(LoaderFn<'a, T>),
}

impl<'a, T> Fallback<'a, T> {
    /// Wrap an async loader
    pub fn loader<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'a,
    {
        Fallback::Loader(Box::new(move || Box::pin(f())))
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Fallback<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fallback::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Fallback::Loader(_) => f.write_str("Loader(..)"),
        }
    }
}

/// Unified cache manager
pub struct CacheManager {
    /// Tiers in priority order
    tiers: Vec<Arc<dyn CacheTier>>,
    /// First lock-capable tier, resolved at construction
    lock_tier: Option<Arc<dyn Lockable>>,
    /// Configuration
    config: CacheConfig,
    /// Metrics collector
    metrics: Arc<CacheMetrics>,
}

impl CacheManager {
    /// Create a new cache manager with default configuration
    pub fn new(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self::with_config(CacheConfig::default(), tiers)
    }

    /// Create a new cache manager with custom configuration
    pub fn with_config(config: CacheConfig, tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        let lock_tier = tiers.iter().find_map(|tier| Arc::clone(tier).lockable());
        let metrics = Arc::new(CacheMetrics::new(tiers.iter().map(|tier| tier.name().to_string())));

        debug!(
            tiers = tiers.len(),
            versioning = config.versioning,
            locking = lock_tier.is_some(),
            "Cache manager created"
        );

        Self {
            tiers,
            lock_tier,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Tiers in priority order
    pub fn tiers(&self) -> &[Arc<dyn CacheTier>] {
        &self.tiers
    }

    /// Whether `lock` can succeed at all
    pub fn supports_locking(&self) -> bool {
        self.lock_tier.is_some()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a typed value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_in(key, None).await
    }

    /// Read a typed value, versioned by `namespace` if given
    pub async fn get_in<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> Result<Option<T>> {
        self.get_raw(key, namespace)
            .await?
            .map(codec::from_value)
            .transpose()
    }

    /// Read the stored value without conversion
    pub async fn get_raw(&self, key: &str, namespace: Option<&str>) -> Result<Option<CacheValue>> {
        let physical = self.physical_key(key, namespace, "get").await?;
        Ok(self.read_through(&physical, self.config.default_ttl).await)
    }

    /// Read a typed value, falling back on a total miss
    ///
    /// A [`Fallback::Loader`] runs at most once and its result is stored
    /// with `ttl`; a [`Fallback::Literal`] is returned without being stored.
    pub async fn get_or<T>(
        &self,
        key: &str,
        fallback: Fallback<'_, T>,
        ttl: Option<Duration>,
        namespace: Option<&str>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let physical = self.physical_key(key, namespace, "get").await?;
        if let Some(value) = self.read_through(&physical, ttl).await {
            return codec::from_value(value);
        }

        match fallback {
            Fallback::Literal(value) => Ok(value),
            Fallback::Loader(load) => {
                self.metrics.record_fallback_load();
                let value = load().await.map_err(Error::Loader)?;
                self.set_in(key, &value, Some(ttl), namespace).await?;
                Ok(value)
            }
        }
    }

    async fn read_through(&self, physical: &str, backfill_ttl: Duration) -> Option<CacheValue> {
        for (index, tier) in self.tiers.iter().enumerate() {
            let tracker = LatencyTracker::start();
            let result = tier.get(physical).await;
            let metrics = self.metrics.tier(index);

            match result {
                Ok(Some(value)) => {
                    if let Some(m) = metrics {
                        m.record_hit();
                        m.record_read_latency(tracker.elapsed());
                    }
                    debug!(key = physical, tier = tier.name(), "Cache HIT");
                    self.backfill(index, physical, &value, backfill_ttl).await;
                    return Some(value);
                }
                Ok(None) => {
                    if let Some(m) = metrics {
                        m.record_miss();
                    }
                    debug!(key = physical, tier = tier.name(), "Cache MISS");
                }
                Err(e) => {
                    if let Some(m) = metrics {
                        m.record_error();
                    }
                    warn!(
                        key = physical,
                        tier = tier.name(),
                        error = %e,
                        "Failed to get, gracefully continuing with next tier"
                    );
                }
            }
        }

        self.metrics.record_total_miss();
        None
    }

    /// Write a value found at `found_at` into every earlier tier
    async fn backfill(&self, found_at: usize, physical: &str, value: &CacheValue, ttl: Duration) {
        if found_at == 0 {
            return;
        }

        let writes = self.tiers[..found_at]
            .iter()
            .map(|tier| tier.set(physical, value.clone(), ttl));
        let results = join_all(writes).await;

        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(_) => {
                    if let Some(m) = self.metrics.tier(index) {
                        m.record_backfill();
                    }
                }
                Err(e) => warn!(
                    key = physical,
                    tier = self.tiers[index].name(),
                    error = %e,
                    "Backfill failed"
                ),
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a value to every tier with the default TTL
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_in(key, value, None, None).await
    }

    /// Write a value to every tier with an explicit TTL
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        self.set_in(key, value, Some(ttl), None).await
    }

    /// Write a value to every tier, versioned by `namespace` if given
    ///
    /// Fails only when the value cannot be serialized or, with versioning
    /// on, when there are no tiers.
    pub async fn set_in<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        namespace: Option<&str>,
    ) -> Result<()> {
        let value = codec::to_value(value)?;
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let physical = self.physical_key(key, namespace, "set").await?;

        let writes = self
            .tiers
            .iter()
            .map(|tier| tier.set(&physical, value.clone(), ttl));
        let results = join_all(writes).await;
        self.log_failures("set", &physical, results);
        Ok(())
    }

    /// Delete a key from every tier
    pub async fn del(&self, key: &str) -> Result<()> {
        self.del_in(key, None).await
    }

    /// Delete a key from every tier, versioned by `namespace` if given
    pub async fn del_in(&self, key: &str, namespace: Option<&str>) -> Result<()> {
        let physical = self.physical_key(key, namespace, "del").await?;

        let results = join_all(self.tiers.iter().map(|tier| tier.del(&physical))).await;
        self.log_failures("del", &physical, results);
        Ok(())
    }

    /// Bump the version counter of a key or namespace on every tier
    ///
    /// No-op without versioning. Each tier keeps its own counter.
    pub async fn invalidate_key(&self, key_or_namespace: &str) {
        if !self.config.versioning {
            return;
        }

        let bumps = self.tiers.iter().map(|tier| async move {
            VersionedTier::new(Arc::clone(tier))
                .invalidate(key_or_namespace)
                .await
        });
        let results = join_all(bumps).await;

        for (tier, result) in self.tiers.iter().zip(results) {
            match result {
                Ok(version) => {
                    debug!(key = key_or_namespace, tier = tier.name(), version, "Invalidated")
                }
                Err(e) => warn!(
                    key = key_or_namespace,
                    tier = tier.name(),
                    error = %e,
                    "Failed to invalidate, gracefully continuing with next tier"
                ),
            }
        }
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Run `callback` while holding the distributed lock for `key`
    ///
    /// Uses the first lock-capable tier. The lease is released before the
    /// callback's output is returned. The callback never runs if no tier can
    /// lock or the lease cannot be acquired.
    pub async fn lock<T, F, Fut>(&self, key: &str, callback: F, ttl: Option<Duration>) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        let tier = self.lock_tier.as_ref().ok_or(Error::LockNotSupported)?;
        let ttl = ttl.unwrap_or(self.config.default_lock_ttl);
        let lease = tier.acquire_lock(key, ttl).await?;
        Ok(lease.run(callback()).await)
    }

    // =========================================================================
    // Batch operations
    // =========================================================================

    /// Read several typed values, positionally
    ///
    /// An entry that does not decode into `T` comes back as `None`.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<Option<T>>> {
        let values = self.mget_raw(keys).await;
        Ok(keys
            .iter()
            .zip(values)
            .map(|(key, value)| {
                value.and_then(|value| match codec::from_value(value) {
                    Ok(decoded) => Some(decoded),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to decode batch entry; treating as miss");
                        None
                    }
                })
            })
            .collect())
    }

    /// Read several values without conversion
    ///
    /// Keys missing from a tier are backfilled into it once a later tier
    /// supplies them.
    pub async fn mget_raw(&self, keys: &[String]) -> Vec<Option<CacheValue>> {
        let mut found: Vec<Option<CacheValue>> = vec![None; keys.len()];
        let mut pending: Vec<usize> = (0..keys.len()).collect();
        let mut missed_by_tier: Vec<Vec<usize>> = Vec::with_capacity(self.tiers.len());

        for (index, tier) in self.tiers.iter().enumerate() {
            if pending.is_empty() {
                break;
            }

            let lookup: Vec<String> = pending.iter().map(|&i| keys[i].clone()).collect();
            let metrics = self.metrics.tier(index);
            let mut still_pending = Vec::new();

            match tier.mget(&lookup).await {
                Ok(values) => {
                    let mut values = values.into_iter();
                    for &i in &pending {
                        match values.next().flatten() {
                            Some(value) => {
                                if let Some(m) = metrics {
                                    m.record_hit();
                                }
                                found[i] = Some(value);
                            }
                            None => {
                                if let Some(m) = metrics {
                                    m.record_miss();
                                }
                                still_pending.push(i);
                            }
                        }
                    }
                }
                Err(e) => {
                    if let Some(m) = metrics {
                        m.record_error();
                    }
                    warn!(
                        tier = tier.name(),
                        keys = lookup.len(),
                        error = %e,
                        "Failed to mget, gracefully continuing with next tier"
                    );
                    still_pending = pending.clone();
                }
            }

            missed_by_tier.push(still_pending.clone());
            pending = still_pending;
        }

        for _ in &pending {
            self.metrics.record_total_miss();
        }

        self.backfill_batch(keys, &found, &missed_by_tier).await;
        found
    }

    async fn backfill_batch(
        &self,
        keys: &[String],
        found: &[Option<CacheValue>],
        missed_by_tier: &[Vec<usize>],
    ) {
        let ttl = self.config.default_ttl;
        let writes = missed_by_tier
            .iter()
            .enumerate()
            .filter_map(|(index, missed)| {
                let entries: Vec<(String, CacheValue)> = missed
                    .iter()
                    .filter_map(|&i| found[i].clone().map(|value| (keys[i].clone(), value)))
                    .collect();
                (!entries.is_empty()).then_some((index, entries))
            })
            .map(|(index, entries)| async move {
                let count = entries.len();
                (index, count, self.tiers[index].mset(entries, ttl).await)
            });

        for (index, count, result) in join_all(writes).await {
            match result {
                Ok(()) => {
                    if let Some(m) = self.metrics.tier(index) {
                        for _ in 0..count {
                            m.record_backfill();
                        }
                    }
                }
                Err(e) => warn!(
                    tier = self.tiers[index].name(),
                    keys = count,
                    error = %e,
                    "Batch backfill failed"
                ),
            }
        }
    }

    /// Write several values to every tier with one TTL
    pub async fn mset<T: Serialize>(
        &self,
        entries: &[(String, T)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let values = entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), codec::to_value(value)?)))
            .collect::<Result<Vec<_>>>()?;

        let writes = self.tiers.iter().map(|tier| tier.mset(values.clone(), ttl));
        let results = join_all(writes).await;
        self.log_failures("mset", &format!("{} keys", values.len()), results);
        Ok(())
    }

    /// Delete several keys from every tier
    pub async fn mdel(&self, keys: &[String]) {
        let results = join_all(self.tiers.iter().map(|tier| tier.mdel(keys))).await;
        self.log_failures("mdel", &format!("{} keys", keys.len()), results);
    }

    /// Remove everything from every tier
    ///
    /// On a shared tier this wipes the whole backing store, including keys
    /// written by other applications.
    pub async fn flush_all(&self) {
        let results = join_all(self.tiers.iter().map(|tier| tier.flush_all())).await;
        self.log_failures("flush_all", "*", results);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Physical key for one call; resolves the version once when enabled
    async fn physical_key(
        &self,
        key: &str,
        namespace: Option<&str>,
        operation: &'static str,
    ) -> Result<String> {
        if !self.config.versioning {
            return Ok(key.to_string());
        }

        let first = self.tiers.first().ok_or(Error::NoTiers { operation })?;
        let version = VersionedTier::new(Arc::clone(first))
            .get_current_version(namespace.unwrap_or(key))
            .await;
        Ok(versioned_key(key, version))
    }

    fn log_failures<T>(&self, operation: &str, key: &str, results: Vec<Result<T>>) {
        for (index, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                if let Some(m) = self.metrics.tier(index) {
                    m.record_error();
                }
                warn!(
                    operation,
                    key,
                    tier = self.tiers[index].name(),
                    error = %e,
                    "Tier write failed, gracefully continuing with next tier"
                );
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

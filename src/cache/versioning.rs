//! Versioning Layer
//!
//! Wraps one tier so that logical keys map to `<key>:<version>` physical
//! keys. The version counter lives in the same tier under `<key>:version`
//! (or `<namespace>:version`). Invalidating bumps the counter, which makes
//! every entry written under the old version unreachable without deleting
//! anything.
//!
//! Counter updates are read-then-write; two concurrent invalidations may
//! collapse into a single increment.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::error;

use super::tier::{version_key, versioned_key, CacheTier};
use super::{CacheValue, VERSION_TTL};
use crate::error::Result;

/// Version assumed when no counter exists or it cannot be read
pub const INITIAL_VERSION: u64 = 1;

/// Tier wrapper resolving logical keys to versioned keys
#[derive(Clone)]
pub struct VersionedTier {
    tier: Arc<dyn CacheTier>,
}

impl VersionedTier {
    pub fn new(tier: Arc<dyn CacheTier>) -> Self {
        Self { tier }
    }

    /// Wrapped tier
    pub fn inner(&self) -> &Arc<dyn CacheTier> {
        &self.tier
    }

    /// Current version for a key or namespace, creating the counter at 1
    ///
    /// Never fails: read errors and unreadable counters fall back to 1.
    pub async fn get_current_version(&self, key_or_namespace: &str) -> u64 {
        let counter_key = version_key(key_or_namespace);
        match self
            .tier
            .get_or_set(&counter_key, json!(INITIAL_VERSION), VERSION_TTL)
            .await
        {
            Ok(value) => parse_version(&value).unwrap_or_else(|| {
                error!(
                    tier = self.tier.name(),
                    key = %counter_key,
                    value = %value,
                    "Unreadable version counter. Falling back to 1"
                );
                INITIAL_VERSION
            }),
            Err(e) => {
                error!(
                    tier = self.tier.name(),
                    key = %counter_key,
                    error = %e,
                    "Failed to get version. Falling back to 1"
                );
                INITIAL_VERSION
            }
        }
    }

    /// Versioned physical key for `key`, versioned by `namespace` if given
    pub async fn get_or_set_versioned_key_lookup(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> String {
        let version = self.get_current_version(namespace.unwrap_or(key)).await;
        versioned_key(key, version)
    }

    /// Bump the counter for a key or namespace, returning the new version
    pub async fn invalidate(&self, key_or_namespace: &str) -> Result<u64> {
        let current = self.get_current_version(key_or_namespace).await;
        let next = current + 1;
        self.tier
            .set(&version_key(key_or_namespace), json!(next), VERSION_TTL)
            .await?;
        Ok(next)
    }

    /// Read `key` at a version the caller already resolved
    pub async fn get_with_version(&self, key: &str, version: u64) -> Result<Option<CacheValue>> {
        self.tier.get(&versioned_key(key, version)).await
    }

    /// Write `key` at a version the caller already resolved
    pub async fn set_with_version(
        &self,
        key: &str,
        value: CacheValue,
        version: u64,
        ttl: Duration,
    ) -> Result<CacheValue> {
        self.tier.set(&versioned_key(key, version), value, ttl).await
    }

    /// Delete `key` at a version the caller already resolved
    pub async fn del_with_version(&self, key: &str, version: u64) -> Result<()> {
        self.tier.del(&versioned_key(key, version)).await
    }

    /// Read the current version of `key`
    pub async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<CacheValue>> {
        let physical = self.get_or_set_versioned_key_lookup(key, namespace).await;
        self.tier.get(&physical).await
    }

    /// Write the current version of `key`, returning the version used
    pub async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
        namespace: Option<&str>,
    ) -> Result<u64> {
        let version = self.get_current_version(namespace.unwrap_or(key)).await;
        self.set_with_version(key, value, version, ttl).await?;
        Ok(version)
    }

    /// Delete the current version of `key`, returning the version used
    pub async fn del(&self, key: &str, namespace: Option<&str>) -> Result<u64> {
        let version = self.get_current_version(namespace.unwrap_or(key)).await;
        self.del_with_version(key, version).await?;
        Ok(version)
    }
}

/// Counter payloads are numbers, but accept numeric strings written by other clients
fn parse_version(value: &CacheValue) -> Option<u64> {
    let version = match value {
        CacheValue::Number(n) => n.as_u64(),
        CacheValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (version >= INITIAL_VERSION).then_some(version)
}

// =============================================================================
// Tests
// =============================================================================

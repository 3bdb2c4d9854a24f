//! Tiered Cache
//!
//! A bounded in-process tier in front of a shared networked tier:
//!
//! ```text
//! CacheManager ──► LocalTier  (map + expiry heap + eviction)
//!              └─► SharedTier (KeyValueStore + Redlock)
//! ```
//!
//! # Modules
//!
//! - [`manager`] - Orchestrates reads, writes, backfill, versioning and locks
//! - [`local`] - In-memory tier
//! - [`heap`] - Expiry-ordered min-heap
//! - [`eviction`] - Trigger strategies and eviction policies
//! - [`shared`] - Networked tier over a [`crate::store::KeyValueStore`]
//! - [`lock`] - Redlock client and leases
//! - [`versioning`] - Generation counters for O(1) invalidation

pub mod codec;
pub mod entry;
pub mod eviction;
pub mod heap;
pub mod local;
pub mod lock;
pub mod manager;
pub mod metrics;
pub mod sensor;
pub mod shared;
pub mod tier;
pub mod versioning;

use std::time::Duration;

pub use eviction::{
    EvictionManager, EvictionPolicy, FirstExpiringPolicy, NoopPolicy, RamPercentageTrigger,
    StoreSizeTrigger, TierSnapshot, TriggerStrategy,
};
pub use heap::ExpiryHeap;
pub use local::{LocalStats, LocalTier, LocalTierConfig};
pub use lock::{Lease, LockSettings, Redlock};
pub use manager::{CacheConfig, CacheManager, Fallback};
pub use metrics::{CacheMetrics, MetricsSnapshot, TierMetricsSnapshot};
pub use sensor::{FixedMemorySensor, MemorySensor, SystemMemorySensor};
pub use shared::SharedTier;
pub use tier::{CacheTier, Lockable};
pub use versioning::VersionedTier;

/// Value held by every tier
pub type CacheValue = serde_json::Value;

/// Default TTL for cache writes
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default lease TTL for distributed locks
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// TTL of version counters
pub const VERSION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

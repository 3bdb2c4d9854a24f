//! tiercache - Tiered Cache with Versioned Invalidation
//!
//! A bounded in-memory tier in front of a shared Redis tier, presented as one
//! cache. Reads fall through the tiers in order and backfill nearer tiers on
//! a hit; writes fan out to every tier in parallel; a failing tier degrades
//! to a miss instead of failing the call.
//!
//! # Features
//!
//! - Local tier with an expiry heap and pluggable eviction (memory pressure
//!   or own-size triggers, first-expiring policy)
//! - Shared tier over any [`store::KeyValueStore`] (Redis or in-process)
//! - Version counters for O(1) invalidation of keys and namespaces
//! - Redlock-based distributed locks with automatic lease extension
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tiercache::cache::{CacheConfig, CacheManager, LocalTier, SharedTier};
//! use tiercache::store::RedisStore;
//!
//! # async fn run() -> tiercache::Result<()> {
//! let redis = Arc::new(RedisStore::connect("redis://127.0.0.1:6379").await?);
//! let cache = CacheManager::with_config(
//!     CacheConfig { versioning: true, ..CacheConfig::default() },
//!     vec![Arc::new(LocalTier::new()), Arc::new(SharedTier::new(redis))],
//! );
//!
//! cache.set("user:1", &"Ada").await?;
//! let name: Option<String> = cache.get("user:1").await?;
//! cache.invalidate_key("user:1").await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Tiers, eviction, versioning, locking and the manager
//! - [`store`] - Key/value backends for the shared tier
//! - [`config`] - Settings file for the binary
//! - [`error`] - Error types

pub mod cache;
pub mod config;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheManager, CacheTier, CacheValue, Fallback, LocalTier, SharedTier};
pub use error::{Error, Result};

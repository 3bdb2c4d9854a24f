//! Cache Entry Types
//!
//! Items held by the local tier's map and its expiry heap.

use std::cmp::Ordering;
use std::time::Duration;

use super::CacheValue;

/// Current wall-clock time in epoch milliseconds
#[inline]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Absolute expiry for a TTL starting now
#[inline]
pub fn expiry_from_ttl(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(ttl_ms)
}

/// Value stored in the local tier's map
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    /// Cached value
    pub value: CacheValue,
    /// Absolute expiry (epoch milliseconds)
    pub expiry: i64,
    /// Serialized length of `value`, captured once at insert time
    pub byte_size: u64,
}

impl StoredItem {
    /// Create a new stored item
    pub fn new(value: CacheValue, expiry: i64, byte_size: u64) -> Self {
        Self {
            value,
            expiry,
            byte_size,
        }
    }

    /// Check if the item has expired relative to `now`
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiry <= now
    }
}

/// Heap entry: a stored item plus its key
///
/// One is pushed per local `set`. Overwrites and deletes leave older entries
/// behind; they are recognised at pop time because their expiry no longer
/// matches the live map entry.
#[derive(Debug, Clone)]
pub struct HeapItem {
    /// Key the item was stored under
    pub key: String,
    /// Value at insert time
    pub value: CacheValue,
    /// Absolute expiry (epoch milliseconds)
    pub expiry: i64,
    /// Serialized length of `value`
    pub byte_size: u64,
}

impl HeapItem {
    /// Build the heap entry for an item stored under `key`
    pub fn from_stored(key: impl Into<String>, item: &StoredItem) -> Self {
        Self {
            key: key.into(),
            value: item.value.clone(),
            expiry: item.expiry,
            byte_size: item.byte_size,
        }
    }

    /// Whether `stored` is the map entry this heap entry was created for
    #[inline]
    pub fn matches(&self, stored: &StoredItem) -> bool {
        self.expiry == stored.expiry
    }
}

// Ordering considers expiry only; ties are unordered.
impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.expiry == other.expiry
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expiry.cmp(&other.expiry)
    }
}

// =============================================================================
// Tests
// =============================================================================

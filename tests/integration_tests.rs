//! tiercache Integration Tests
//!
//! End-to-end behaviour of the cache manager over a local tier and a shared
//! tier backed by the in-process store:
//! - Round-trips, tier priority and backfill
//! - Versioned keys, namespaces and invalidation
//! - Degradation with a failing tier
//! - Expiry, eviction and distributed locking

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tiercache::cache::{
    CacheConfig, CacheManager, CacheTier, CacheValue, FirstExpiringPolicy, FixedMemorySensor,
    LocalTier, LocalTierConfig, Lockable, LockSettings, SharedTier, TierSnapshot, TriggerStrategy,
};
use tiercache::store::{InMemoryStore, KeyValueStore};
use tiercache::{Error, Fallback, Result};

const HOUR: Duration = Duration::from_secs(3600);

// =============================================================================
// Test Tiers
// =============================================================================

/// Forwards to an inner tier, counting calls
struct CountingTier {
    inner: Arc<dyn CacheTier>,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingTier {
    fn new(inner: Arc<dyn CacheTier>) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        }
    }

    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheTier for CountingTier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<CacheValue> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.inner.del(key).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<CacheValue>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.mget(keys).await
    }

    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.mset(entries, ttl).await
    }

    async fn mdel(&self, keys: &[String]) -> Result<()> {
        self.inner.mdel(keys).await
    }

    async fn flush_all(&self) -> Result<()> {
        self.inner.flush_all().await
    }

    fn lockable(self: Arc<Self>) -> Option<Arc<dyn Lockable>> {
        Arc::clone(&self.inner).lockable()
    }
}

/// Fails every operation
struct FaultyTier;

fn tier_down<T>() -> Result<T> {
    Err(Error::Store("tier is down".to_string()))
}

#[async_trait]
impl CacheTier for FaultyTier {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn get(&self, _key: &str) -> Result<Option<CacheValue>> {
        tier_down()
    }

    async fn set(&self, _key: &str, _value: CacheValue, _ttl: Duration) -> Result<CacheValue> {
        tier_down()
    }

    async fn del(&self, _key: &str) -> Result<()> {
        tier_down()
    }

    async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<CacheValue>>> {
        tier_down()
    }

    async fn mset(&self, _entries: Vec<(String, CacheValue)>, _ttl: Duration) -> Result<()> {
        tier_down()
    }

    async fn mdel(&self, _keys: &[String]) -> Result<()> {
        tier_down()
    }

    async fn flush_all(&self) -> Result<()> {
        tier_down()
    }
}

struct AlwaysTrigger;

impl TriggerStrategy for AlwaysTrigger {
    fn name(&self) -> &'static str {
        "always"
    }

    fn check_condition(&self, _tier: &TierSnapshot<'_>) -> bool {
        true
    }
}

fn make_local() -> Arc<LocalTier> {
    Arc::new(LocalTier::with_config(LocalTierConfig {
        sensor: Arc::new(FixedMemorySensor::new(10.0, u64::MAX)),
        ..LocalTierConfig::default()
    }))
}

fn fast_lock_settings() -> LockSettings {
    LockSettings {
        retry_count: 50,
        retry_delay: Duration::from_millis(20),
        retry_jitter: Duration::from_millis(10),
        ..LockSettings::default()
    }
}

fn make_shared(store: Arc<InMemoryStore>) -> Arc<SharedTier> {
    Arc::new(SharedTier::with_lock_settings(store, fast_lock_settings()))
}

fn versioned_config() -> CacheConfig {
    CacheConfig {
        versioning: true,
        ..CacheConfig::default()
    }
}

// =============================================================================
// Round-trip
// =============================================================================

mod round_trip_tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u128,
        customer: String,
        lines: Vec<(String, u32)>,
        notes: Option<String>,
    }

    fn sample_values() -> Vec<CacheValue> {
        vec![
            json!("plain string"),
            json!(-17),
            json!(u64::MAX),
            serde_json::to_value(u128::MAX).unwrap(),
            json!({"nested": {"deep": [1, {"x": true}]}}),
            json!([1, "two", null, 3.5]),
            json!("Grüße, 世界 🚀"),
        ]
    }

    #[tokio::test]
    async fn test_every_tier_round_trips() {
        let tiers: Vec<Arc<dyn CacheTier>> = vec![
            make_local(),
            make_shared(Arc::new(InMemoryStore::new())),
        ];

        for tier in &tiers {
            for (i, value) in sample_values().into_iter().enumerate() {
                let key = format!("value-{}", i);
                tier.set(&key, value.clone(), HOUR).await.unwrap();
                assert_eq!(tier.get(&key).await.unwrap(), Some(value), "tier {}", tier.name());
            }
        }
    }

    #[tokio::test]
    async fn test_manager_round_trips_typed_values() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CacheManager::new(vec![make_local(), make_shared(store)]);

        let order = Order {
            id: u128::MAX - 1,
            customer: "Zoë".to_string(),
            lines: vec![("widget".into(), 3), ("gadget".into(), 1)],
            notes: None,
        };
        manager.set("order:1", &order).await.unwrap();
        assert_eq!(manager.get::<Order>("order:1").await.unwrap(), Some(order));

        for (i, value) in sample_values().into_iter().enumerate() {
            let key = format!("raw-{}", i);
            manager.set(&key, &value).await.unwrap();
            assert_eq!(manager.get_raw(&key, None).await.unwrap(), Some(value));
        }
    }

    #[tokio::test]
    async fn test_big_integer_survives_shared_tier_only() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CacheManager::new(vec![make_shared(store.clone())]);

        manager.set("big", &u128::MAX).await.unwrap();
        assert_eq!(
            store.get("big").await.unwrap().as_deref(),
            Some("340282366920938463463374607431768211455")
        );
        assert_eq!(manager.get::<u128>("big").await.unwrap(), Some(u128::MAX));
    }
}

// =============================================================================
// Tier priority and backfill
// =============================================================================

mod tier_order_tests {
    use super::*;

    #[tokio::test]
    async fn test_nearest_hit_skips_later_tiers() {
        let local = make_local();
        let far = Arc::new(CountingTier::new(make_shared(Arc::new(InMemoryStore::new()))));
        let manager = CacheManager::new(vec![local.clone(), far.clone()]);

        local.insert("k", json!("near"));
        assert_eq!(manager.get::<String>("k").await.unwrap().as_deref(), Some("near"));
        assert_eq!(far.gets(), 0);
    }

    #[tokio::test]
    async fn test_lower_tier_hit_is_backfilled() {
        let local = make_local();
        let shared = make_shared(Arc::new(InMemoryStore::new()));
        let manager = CacheManager::new(vec![local.clone(), shared.clone()]);

        shared.set("k", json!({"v": 1}), HOUR).await.unwrap();
        assert!(local.lookup("k").is_none());

        assert_eq!(manager.get_raw("k", None).await.unwrap(), Some(json!({"v": 1})));
        assert_eq!(local.lookup("k"), Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn test_backfill_skips_tiers_after_the_hit() {
        let first = Arc::new(CountingTier::new(make_local()));
        let middle = make_shared(Arc::new(InMemoryStore::new()));
        let last = Arc::new(CountingTier::new(make_shared(Arc::new(InMemoryStore::new()))));
        let manager = CacheManager::new(vec![first.clone(), middle.clone(), last.clone()]);

        middle.set("k", json!(2), HOUR).await.unwrap();
        manager.get::<u32>("k").await.unwrap();

        assert_eq!(first.sets(), 1);
        assert_eq!(last.gets(), 0);
        assert_eq!(last.sets(), 0);
    }

    #[tokio::test]
    async fn test_mget_backfills_per_tier() {
        let local = make_local();
        let shared = make_shared(Arc::new(InMemoryStore::new()));
        let manager = CacheManager::new(vec![local.clone(), shared.clone()]);

        local.insert("a", json!("A"));
        shared
            .mset(vec![("b".into(), json!("B")), ("c".into(), json!("C"))], HOUR)
            .await
            .unwrap();

        let keys: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let values: Vec<Option<String>> = manager.mget(&keys).await.unwrap();
        assert_eq!(
            values,
            vec![Some("A".into()), Some("B".into()), Some("C".into()), None]
        );
        assert_eq!(local.lookup("b"), Some(json!("B")));
        assert_eq!(local.lookup("c"), Some(json!("C")));
        assert!(local.lookup("d").is_none());
    }
}

// =============================================================================
// Versioning
// =============================================================================

mod versioning_tests {
    use super::*;

    #[tokio::test]
    async fn test_versioned_round_trip_and_invalidation() {
        let store = Arc::new(InMemoryStore::new());
        let local = make_local();
        let manager = CacheManager::with_config(
            versioned_config(),
            vec![local.clone(), make_shared(store.clone())],
        );

        manager.set("k", "v1").await.unwrap();
        assert_eq!(local.lookup("k:1"), Some(json!("v1")));
        assert_eq!(store.get("k:1").await.unwrap().as_deref(), Some("\"v1\""));

        manager.invalidate_key("k").await;
        assert_eq!(manager.get::<String>("k").await.unwrap(), None);

        manager.set("k", "v2").await.unwrap();
        assert_eq!(local.lookup("k:2"), Some(json!("v2")));
        assert_eq!(manager.get::<String>("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_namespace_invalidation_hides_every_member() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CacheManager::with_config(
            versioned_config(),
            vec![make_local(), make_shared(store.clone())],
        );

        manager
            .set_in("user:1", "Ada", None, Some("users"))
            .await
            .unwrap();
        manager
            .set_in("user:2", "Grace", None, Some("users"))
            .await
            .unwrap();
        assert_eq!(
            manager
                .get_in::<String>("user:1", Some("users"))
                .await
                .unwrap()
                .as_deref(),
            Some("Ada")
        );

        manager.invalidate_key("users").await;
        assert_eq!(manager.get_in::<String>("user:1", Some("users")).await.unwrap(), None);
        assert_eq!(manager.get_in::<String>("user:2", Some("users")).await.unwrap(), None);

        // Old generation is still physically present
        assert!(store.get("user:1:1").await.unwrap().is_some());
        assert!(store.get("user:2:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_versioned_del_targets_current_version() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CacheManager::with_config(
            versioned_config(),
            vec![make_local(), make_shared(store.clone())],
        );

        manager.set("k", &1).await.unwrap();
        manager.invalidate_key("k").await;
        manager.set("k", &2).await.unwrap();
        manager.del("k").await.unwrap();

        assert!(store.get("k:2").await.unwrap().is_none());
        assert!(store.get("k:1").await.unwrap().is_some());
        assert_eq!(manager.get::<u32>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_each_tier_keeps_its_own_counter() {
        let store = Arc::new(InMemoryStore::new());
        let local = make_local();
        let manager = CacheManager::with_config(
            versioned_config(),
            vec![local.clone(), make_shared(store.clone())],
        );

        manager.invalidate_key("k").await;
        manager.invalidate_key("k").await;

        assert_eq!(local.lookup("k:version"), Some(json!(3)));
        assert_eq!(store.get("k:version").await.unwrap().as_deref(), Some("3"));
    }
}

// =============================================================================
// Degradation
// =============================================================================

mod degradation_tests {
    use super::*;

    fn degraded_manager(config: CacheConfig) -> (Arc<InMemoryStore>, CacheManager) {
        let store = Arc::new(InMemoryStore::new());
        let manager = CacheManager::with_config(
            config,
            vec![Arc::new(FaultyTier), make_shared(store.clone())],
        );
        (store, manager)
    }

    #[tokio::test]
    async fn test_failing_first_tier_is_skipped() {
        let (store, manager) = degraded_manager(CacheConfig::default());

        tokio_test::assert_ok!(manager.set("k", "v").await);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("\"v\""));
        assert_eq!(manager.get::<String>("k").await.unwrap().as_deref(), Some("v"));

        tokio_test::assert_ok!(manager.del("k").await);
        assert_eq!(manager.get::<String>("k").await.unwrap(), None);

        let snapshot = manager.metrics_snapshot();
        assert!(snapshot.tiers[0].errors >= 3);
        assert_eq!(snapshot.tiers[1].hits, 1);
    }

    #[tokio::test]
    async fn test_failing_first_tier_batch_operations() {
        let (_, manager) = degraded_manager(CacheConfig::default());
        let keys = vec!["a".to_string(), "b".to_string()];

        manager
            .mset(&[("a".to_string(), 1), ("b".to_string(), 2)], None)
            .await
            .unwrap();
        let values: Vec<Option<u32>> = manager.mget(&keys).await.unwrap();
        assert_eq!(values, vec![Some(1), Some(2)]);

        manager.mdel(&keys).await;
        let values: Vec<Option<u32>> = manager.mget(&keys).await.unwrap();
        assert_eq!(values, vec![None, None]);

        manager.flush_all().await;
    }

    #[tokio::test]
    async fn test_versioning_survives_failing_counter_tier() {
        let (store, manager) = degraded_manager(versioned_config());

        manager.set("k", "v").await.unwrap();
        // Counter lookup against the failing tier falls back to version 1
        assert!(store.get("k:1").await.unwrap().is_some());
        assert_eq!(manager.get::<String>("k").await.unwrap().as_deref(), Some("v"));

        manager.invalidate_key("k").await;
        tokio_test::assert_ok!(manager.del("k").await);
    }

    #[tokio::test]
    async fn test_shared_store_outage_degrades_to_local() {
        let store = Arc::new(InMemoryStore::new());
        let local = make_local();
        let manager = CacheManager::new(vec![local.clone(), make_shared(store.clone())]);

        store.set_available(false);
        manager.set("k", &5).await.unwrap();
        assert_eq!(manager.get::<u32>("k").await.unwrap(), Some(5));

        store.set_available(true);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_tiers_failing_is_a_miss() {
        let manager = CacheManager::new(vec![Arc::new(FaultyTier), Arc::new(FaultyTier)]);
        assert_eq!(manager.get::<u32>("k").await.unwrap(), None);
        tokio_test::assert_ok!(manager.set("k", &1).await);
    }
}

// =============================================================================
// Total miss and fallbacks
// =============================================================================

mod fallback_tests {
    use super::*;

    #[tokio::test]
    async fn test_total_miss_returns_none() {
        let plain = CacheManager::new(vec![make_local(), make_shared(Arc::new(InMemoryStore::new()))]);
        assert_eq!(plain.get_raw("missing", None).await.unwrap(), None);

        let versioned = CacheManager::with_config(
            versioned_config(),
            vec![make_local(), make_shared(Arc::new(InMemoryStore::new()))],
        );
        assert_eq!(versioned.get_raw("missing", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_loader_invoked_once_then_cached() {
        for config in [CacheConfig::default(), versioned_config()] {
            let manager = CacheManager::with_config(
                config,
                vec![make_local(), make_shared(Arc::new(InMemoryStore::new()))],
            );
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);

            let loaded: Vec<u32> = manager
                .get_or(
                    "expensive",
                    Fallback::loader(move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![1, 2, 3])
                    }),
                    Some(HOUR),
                    None,
                )
                .await
                .unwrap();

            assert_eq!(loaded, vec![1, 2, 3]);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(
                manager.get::<Vec<u32>>("expensive").await.unwrap(),
                Some(vec![1, 2, 3])
            );
        }
    }

    #[tokio::test]
    async fn test_literal_fallback_is_returned_not_stored() {
        let manager = CacheManager::new(vec![make_local()]);
        let value = manager
            .get_or("k", Fallback::Literal("default".to_string()), None, None)
            .await
            .unwrap();
        assert_eq!(value, "default");
        assert_eq!(manager.get::<String>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fallback_unused_on_hit() {
        let manager = CacheManager::new(vec![make_local()]);
        manager.set("k", &10u32).await.unwrap();

        let value: u32 = manager
            .get_or(
                "k",
                Fallback::loader(|| async { Err(anyhow::anyhow!("must not run")) }),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, 10);
    }
}

// =============================================================================
// Expiry and eviction
// =============================================================================

mod expiry_tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_ttl_absent_and_swept() {
        let local = make_local();
        let manager = CacheManager::new(vec![local.clone()]);

        manager.set_with_ttl("short", "gone", Duration::ZERO).await.unwrap();
        manager.set_with_ttl("long", "kept", HOUR).await.unwrap();

        assert_eq!(manager.get::<String>("short").await.unwrap(), None);
        assert_eq!(manager.get::<String>("long").await.unwrap().as_deref(), Some("kept"));
        assert_eq!(local.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_is_accepted() {
        let store = Arc::new(InMemoryStore::new());
        let local = make_local();
        let manager = CacheManager::new(vec![local.clone(), make_shared(store.clone())]);

        manager.set_with_ttl("k", "v", Duration::MAX).await.unwrap();
        assert_eq!(local.lookup("k"), Some(json!("v")));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("\"v\""));

        let out = manager
            .lock("k", || async { "held" }, Some(Duration::MAX))
            .await
            .unwrap();
        assert_eq!(out, "held");
    }

    #[tokio::test]
    async fn test_zero_ttl_on_shared_tier_deletes() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CacheManager::new(vec![make_shared(store.clone())]);

        manager.set("k", "v").await.unwrap();
        manager.set_with_ttl("k", "v", Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eviction_removes_ten_percent_per_pass() {
        let local = Arc::new(LocalTier::with_config(LocalTierConfig {
            triggers: vec![Box::new(AlwaysTrigger)],
            policy: Box::new(FirstExpiringPolicy::default()),
            sensor: Arc::new(FixedMemorySensor::new(10.0, u64::MAX)),
            default_ttl: HOUR,
        }));
        let entries: Vec<(String, CacheValue)> =
            (0..100).map(|i| (format!("k{}", i), json!(i))).collect();

        local.mset(entries, HOUR).await.unwrap();
        assert_eq!(local.len(), 90);

        // 90 -> 81 -> ... converges without error
        let mut passes = 0;
        while !local.is_empty() {
            local.evict_by_strategy();
            passes += 1;
            assert!(passes < 100);
        }
        assert_eq!(local.evict_by_strategy(), 0);
        assert_eq!(local.heap_size(), 0);
    }
}

// =============================================================================
// Locking
// =============================================================================

mod lock_tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_locks_are_exclusive() {
        // Two managers sharing one store behave like two processes
        let store = Arc::new(InMemoryStore::new());
        let first = CacheManager::new(vec![make_local(), make_shared(store.clone())]);
        let second = CacheManager::new(vec![make_local(), make_shared(store.clone())]);

        let in_section = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let critical = |label: &'static str| {
            let in_section = Arc::clone(&in_section);
            let overlaps = Arc::clone(&overlaps);
            move || async move {
                if in_section.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                in_section.store(false, Ordering::SeqCst);
                label
            }
        };

        let (a, b) = tokio::join!(
            first.lock("job", critical("first"), Some(Duration::from_secs(5))),
            second.lock("job", critical("second"), Some(Duration::from_secs(5))),
        );

        assert_eq!(a.unwrap(), "first");
        assert_eq!(b.unwrap(), "second");
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lock_failure_never_runs_callback() {
        let store = Arc::new(InMemoryStore::new());
        assert!(store
            .try_lock("lock:job", "someone-else", Duration::from_secs(30))
            .await
            .unwrap());

        let shared = Arc::new(SharedTier::with_lock_settings(
            store,
            LockSettings {
                retry_count: 2,
                retry_delay: Duration::from_millis(5),
                retry_jitter: Duration::ZERO,
                ..LockSettings::default()
            },
        ));
        let manager = CacheManager::new(vec![shared]);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let result = manager
            .lock("job", move || async move { flag.store(true, Ordering::SeqCst) }, None)
            .await;

        assert!(matches!(result, Err(Error::LockAcquisition { attempts: 3, .. })));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_lock_without_capable_tier() {
        let manager = CacheManager::new(vec![make_local(), Arc::new(FaultyTier)]);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let result = manager
            .lock("job", move || async move { flag.store(true, Ordering::SeqCst) }, None)
            .await;

        assert!(matches!(result, Err(Error::LockNotSupported)));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_lock_found_behind_wrapper_tier() {
        let shared = make_shared(Arc::new(InMemoryStore::new()));
        let wrapped = Arc::new(CountingTier::new(shared));
        let manager = CacheManager::new(vec![make_local(), wrapped]);

        assert!(manager.supports_locking());
        let out = manager.lock("job", || async { 1 + 1 }, None).await.unwrap();
        assert_eq!(out, 2);
    }

    #[tokio::test]
    async fn test_callback_error_is_returned_and_lock_released() {
        let store = Arc::new(InMemoryStore::new());
        let manager = CacheManager::new(vec![make_shared(store.clone())]);

        let result: Result<std::result::Result<(), String>> = manager
            .lock("job", || async { Err("report failed".to_string()) }, None)
            .await;
        assert_eq!(result.unwrap(), Err("report failed".to_string()));

        assert!(store
            .try_lock("lock:job", "next", Duration::from_secs(1))
            .await
            .unwrap());
    }
}

// =============================================================================
// Live Redis (requires REDIS_URL)
// =============================================================================

#[cfg(feature = "redis-tests")]
mod redis_tests {
    use super::*;
    use tiercache::store::RedisStore;

    async fn connect() -> Arc<RedisStore> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Arc::new(RedisStore::connect(&url).await.unwrap())
    }

    #[tokio::test]
    async fn test_manager_over_redis() {
        let redis = connect().await;
        let local = make_local();
        let manager = CacheManager::with_config(
            versioned_config(),
            vec![local.clone(), Arc::new(SharedTier::new(redis))],
        );

        let key = format!("tiercache-it:{}", uuid::Uuid::new_v4());
        manager.set(&key, &u128::MAX).await.unwrap();
        local.purge();
        assert_eq!(manager.get::<u128>(&key).await.unwrap(), Some(u128::MAX));

        manager.invalidate_key(&key).await;
        assert_eq!(manager.get::<u128>(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lock_over_redis() {
        let redis = connect().await;
        let manager = CacheManager::new(vec![Arc::new(SharedTier::new(redis))]);
        let key = format!("tiercache-it:{}", uuid::Uuid::new_v4());

        let out = manager
            .lock(&key, || async { "locked" }, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(out, "locked");
    }
}

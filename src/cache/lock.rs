//! Distributed Lock
//!
//! Redlock over one or more [`KeyValueStore`] nodes:
//!
//! - acquire on every node with a random token, succeed on quorum (n/2 + 1)
//!   if the remaining validity (ttl - elapsed - drift) is still positive
//! - on failure release partial acquisitions and retry with jittered delay
//! - while held, a background task re-extends the lease shortly before it
//!   expires
//!
//! A [`Lease`] releases on every node when [`Lease::release`] is called or,
//! failing that, when it is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::KeyValueStore;

/// Cap for lease deadlines whose TTL would overflow the clock
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// Redlock tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockSettings {
    /// Clock drift allowance as a fraction of the TTL
    pub drift_factor: f64,
    /// Retries after the first attempt
    pub retry_count: u32,
    /// Base delay between attempts
    pub retry_delay: Duration,
    /// Maximum random deviation added to or removed from the delay
    pub retry_jitter: Duration,
    /// Extend the lease this long before it expires
    pub automatic_extension_threshold: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            drift_factor: 0.01,
            retry_count: 10,
            retry_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(200),
            automatic_extension_threshold: Duration::from_millis(500),
        }
    }
}

/// Redlock client
pub struct Redlock {
    stores: Vec<Arc<dyn KeyValueStore>>,
    settings: LockSettings,
}

impl Redlock {
    pub fn new(stores: Vec<Arc<dyn KeyValueStore>>, settings: LockSettings) -> Self {
        Self { stores, settings }
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Nodes that must agree for an acquisition to count
    pub fn quorum(&self) -> usize {
        self.stores.len() / 2 + 1
    }

    /// Acquire `resource` for `ttl`, retrying per [`LockSettings`]
    pub async fn acquire(self: &Arc<Self>, resource: &str, ttl: Duration) -> Result<Lease> {
        let token = Uuid::new_v4().to_string();
        let attempts = self.settings.retry_count.saturating_add(1);

        for attempt in 1..=attempts {
            if let Some(expiration) = self.attempt(resource, &token, ttl).await {
                debug!(resource, attempt, "Lock acquired");
                return Ok(Lease::start(
                    Arc::clone(self),
                    resource.to_string(),
                    token,
                    ttl,
                    expiration,
                ));
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry_wait()).await;
            }
        }

        Err(Error::LockAcquisition {
            resource: resource.to_string(),
            attempts,
        })
    }

    /// Extend a held lease, returning its new expiration
    pub async fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<Instant> {
        let start = Instant::now();
        let results = join_all(
            self.stores
                .iter()
                .map(|store| store.extend_lock(resource, token, ttl)),
        )
        .await;
        let extended = self.count_successes(resource, results);

        match self.validity(start, ttl) {
            Some(validity) if extended >= self.quorum() => Ok(deadline(start, validity)),
            _ => Err(Error::LockExtension {
                resource: resource.to_string(),
            }),
        }
    }

    /// Release `resource` wherever it still holds `token`
    pub async fn release(&self, resource: &str, token: &str) -> usize {
        let results = join_all(self.stores.iter().map(|store| store.unlock(resource, token))).await;
        self.count_successes(resource, results)
    }

    async fn attempt(&self, resource: &str, token: &str, ttl: Duration) -> Option<Instant> {
        let start = Instant::now();
        let results = join_all(
            self.stores
                .iter()
                .map(|store| store.try_lock(resource, token, ttl)),
        )
        .await;
        let acquired = self.count_successes(resource, results);

        if let Some(validity) = self.validity(start, ttl) {
            if acquired >= self.quorum() {
                return Some(deadline(start, validity));
            }
        }

        if acquired > 0 {
            self.release(resource, token).await;
        }
        None
    }

    /// Remaining validity of an acquisition that started at `start`
    fn validity(&self, start: Instant, ttl: Duration) -> Option<Duration> {
        let drift = ttl.mul_f64(self.settings.drift_factor) + Duration::from_millis(2);
        ttl.checked_sub(start.elapsed())?
            .checked_sub(drift)
            .filter(|validity| !validity.is_zero())
    }

    fn retry_wait(&self) -> Duration {
        let delay = self.settings.retry_delay.as_millis() as i64;
        let jitter = self.settings.retry_jitter.as_millis() as i64;
        let offset = if jitter > 0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0
        };
        Duration::from_millis((delay + offset).max(0) as u64)
    }

    fn count_successes(&self, resource: &str, results: Vec<Result<bool>>) -> usize {
        results
            .into_iter()
            .zip(&self.stores)
            .filter(|(result, store)| match result {
                Ok(ok) => *ok,
                Err(e) => {
                    debug!(resource, store = store.name(), error = %e, "Lock node unavailable");
                    false
                }
            })
            .count()
    }
}

/// A held distributed lock
///
/// Kept alive by a background extension task until released or dropped.
pub struct Lease {
    redlock: Arc<Redlock>,
    resource: String,
    token: String,
    expiration: Arc<Mutex<Instant>>,
    cancel: CancellationToken,
    extender: Option<JoinHandle<()>>,
    released: bool,
}

impl Lease {
    fn start(
        redlock: Arc<Redlock>,
        resource: String,
        token: String,
        ttl: Duration,
        expiration: Instant,
    ) -> Self {
        let expiration = Arc::new(Mutex::new(expiration));
        let cancel = CancellationToken::new();
        let extender = tokio::spawn(extend_loop(
            Arc::clone(&redlock),
            resource.clone(),
            token.clone(),
            ttl,
            Arc::clone(&expiration),
            cancel.clone(),
        ));

        Self {
            redlock,
            resource,
            token,
            expiration,
            cancel,
            extender: Some(extender),
            released: false,
        }
    }

    /// Locked resource name
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Random token identifying this holder
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Current expiration as last acquired or extended
    pub fn expiration(&self) -> Instant {
        *self.expiration.lock()
    }

    /// Whether the extension task has stopped, e.g. after a failed extension
    pub fn is_extension_stopped(&self) -> bool {
        self.extender
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stop extending and release on every node
    ///
    /// Returns the number of nodes that released the lock.
    pub async fn release(mut self) -> usize {
        self.released = true;
        self.cancel.cancel();
        if let Some(handle) = self.extender.take() {
            let _ = handle.await;
        }

        let released = self.redlock.release(&self.resource, &self.token).await;
        if released < self.redlock.quorum() {
            warn!(
                resource = %self.resource,
                released,
                "Lock released on fewer nodes than quorum"
            );
        } else {
            debug!(resource = %self.resource, "Lock released");
        }
        released
    }

    /// Await `fut` while holding the lease, then release it
    pub async fn run<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        let output = fut.await;
        self.release().await;
        output
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("resource", &self.resource)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.cancel.cancel();

        let redlock = Arc::clone(&self.redlock);
        let resource = std::mem::take(&mut self.resource);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    redlock.release(&resource, &token).await;
                });
            }
            Err(_) => {
                warn!(resource = %resource, "Lease dropped outside a runtime; left to expire");
            }
        }
    }
}

fn deadline(start: Instant, validity: Duration) -> Instant {
    start
        .checked_add(validity)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

async fn extend_loop(
    redlock: Arc<Redlock>,
    resource: String,
    token: String,
    ttl: Duration,
    expiration: Arc<Mutex<Instant>>,
    cancel: CancellationToken,
) {
    // Never extend more often than every half TTL
    let threshold = redlock
        .settings()
        .automatic_extension_threshold
        .min(ttl / 2);

    loop {
        let wake_at = expiration
            .lock()
            .checked_sub(threshold)
            .unwrap_or_else(Instant::now);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(wake_at) => {}
        }

        match redlock.extend(&resource, &token, ttl).await {
            Ok(next) => {
                *expiration.lock() = next;
                debug!(resource = %resource, "Lock extended");
            }
            Err(e) => {
                warn!(resource = %resource, error = %e, "Lock extension failed; lease may lapse");
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

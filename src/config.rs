//! Settings file
//!
//! YAML settings for the `tiercache` binary. Every field has a default, so an
//! empty file (or no file) yields a working local + Redis setup.
//!
//! ```yaml
//! redis_urls:
//!   - redis://127.0.0.1:6379
//! default_ttl_secs: 3600
//! versioning: true
//! local:
//!   ram_threshold_percent: 80.0
//!   store_size_threshold_percent: 50.0
//! lock:
//!   retry_count: 5
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{
    CacheConfig, FirstExpiringPolicy, LocalTierConfig, LockSettings, MemorySensor,
    RamPercentageTrigger, StoreSizeTrigger, TriggerStrategy,
};
use crate::error::{Error, Result};

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Redis nodes. The first holds cache data; all of them take part in
    /// lock quorum.
    pub redis_urls: Vec<String>,
    pub default_ttl_secs: u64,
    pub default_lock_ttl_secs: u64,
    pub versioning: bool,
    pub local: LocalSettings,
    pub lock: LockSettingsFile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_urls: vec!["redis://127.0.0.1:6379".to_string()],
            default_ttl_secs: 3600,
            default_lock_ttl_secs: 30,
            versioning: false,
            local: LocalSettings::default(),
            lock: LockSettingsFile::default(),
        }
    }
}

/// Local tier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Put a memory tier in front of Redis
    pub enabled: bool,
    /// Evict when system memory use exceeds this percentage
    pub ram_threshold_percent: Option<f64>,
    /// Evict when the tier's own bytes reach this share of allotted memory
    pub store_size_threshold_percent: Option<f64>,
    /// Share of heap entries evicted per pass
    pub eviction_percentage: f64,
    pub eviction_batch_size: usize,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ram_threshold_percent: Some(80.0),
            store_size_threshold_percent: None,
            eviction_percentage: 0.1,
            eviction_batch_size: 1000,
        }
    }
}

/// Redlock settings as written in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettingsFile {
    pub drift_factor: f64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub automatic_extension_threshold_ms: u64,
}

impl Default for LockSettingsFile {
    fn default() -> Self {
        let defaults = LockSettings::default();
        Self {
            drift_factor: defaults.drift_factor,
            retry_count: defaults.retry_count,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            retry_jitter_ms: defaults.retry_jitter.as_millis() as u64,
            automatic_extension_threshold_ms: defaults.automatic_extension_threshold.as_millis()
                as u64,
        }
    }
}

impl Settings {
    /// Load and validate settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Parse and validate settings from YAML text
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let settings: Settings = if raw.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.redis_urls.is_empty() && !self.local.enabled {
            return Err(Error::Config(
                "no cache tiers: set redis_urls or enable the local tier".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.local.eviction_percentage) {
            return Err(Error::Config(format!(
                "local.eviction_percentage must be within 0.0..=1.0, got {}",
                self.local.eviction_percentage
            )));
        }
        if self.local.eviction_batch_size == 0 {
            return Err(Error::Config(
                "local.eviction_batch_size must be positive".to_string(),
            ));
        }
        if self.lock.drift_factor < 0.0 {
            return Err(Error::Config("lock.drift_factor must not be negative".to_string()));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            default_lock_ttl: Duration::from_secs(self.default_lock_ttl_secs),
            versioning: self.versioning,
        }
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            drift_factor: self.lock.drift_factor,
            retry_count: self.lock.retry_count,
            retry_delay: Duration::from_millis(self.lock.retry_delay_ms),
            retry_jitter: Duration::from_millis(self.lock.retry_jitter_ms),
            automatic_extension_threshold: Duration::from_millis(
                self.lock.automatic_extension_threshold_ms,
            ),
        }
    }

    /// Local tier configuration using `sensor` for memory readings
    pub fn local_tier_config(&self, sensor: Arc<dyn MemorySensor>) -> LocalTierConfig {
        let mut triggers: Vec<Box<dyn TriggerStrategy>> = Vec::new();
        if let Some(threshold) = self.local.ram_threshold_percent {
            triggers.push(Box::new(RamPercentageTrigger::new(threshold)));
        }
        if let Some(threshold) = self.local.store_size_threshold_percent {
            triggers.push(Box::new(StoreSizeTrigger::new(threshold)));
        }

        LocalTierConfig {
            triggers,
            policy: Box::new(FirstExpiringPolicy {
                percentage: self.local.eviction_percentage,
                batch_size: self.local.eviction_batch_size,
            }),
            sensor,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Error types for the tiered cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can surface from the tiered cache
///
/// Only configuration errors, lock failures and loader failures reach callers
/// of [`crate::cache::CacheManager`]; tier-level variants are logged and
/// degraded to a miss or a skipped tier by the manager.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Versioned operation without a first tier to host the version counter
    #[error("{operation}: versioning requires at least one cache tier")]
    NoTiers { operation: &'static str },

    /// No configured tier exposes the lock capability
    #[error("Locking not supported in the current cache tiers")]
    LockNotSupported,

    /// Lease could not be acquired before retries ran out
    #[error("Failed to acquire lock on {resource} after {attempts} attempts")]
    LockAcquisition { resource: String, attempts: u32 },

    /// Lease could not be extended on a quorum of stores
    #[error("Failed to extend lock on {resource}")]
    LockExtension { resource: String },

    /// Backing store error not covered by a more specific variant
    #[error("Store error: {0}")]
    Store(String),

    /// Redis client error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Value could not be converted to or from the wire format
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller-supplied fallback loader failed
    #[error("Fallback loader failed: {0}")]
    Loader(#[source] anyhow::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file parse error
    #[error("Failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether the error is a configuration problem rather than a runtime fault
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NoTiers { .. } | Error::LockNotSupported | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::NoTiers { operation: "set" };
        assert_eq!(
            err.to_string(),
            "set: versioning requires at least one cache tier"
        );

        let err = Error::LockAcquisition {
            resource: "lock:job".to_string(),
            attempts: 11,
        };
        assert_eq!(
            err.to_string(),
            "Failed to acquire lock on lock:job after 11 attempts"
        );
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::LockNotSupported.is_configuration());
        assert!(Error::NoTiers { operation: "get" }.is_configuration());
        assert!(!Error::Store("boom".into()).is_configuration());
    }
}

//! tiercache CLI
//!
//! Runs single cache operations against a memory tier in front of Redis.
//!
//! ```text
//! tiercache --redis-url redis://127.0.0.1:6379 set user:1 '{"name":"Ada"}'
//! tiercache --versioning get user:1 --namespace users
//! tiercache --versioning invalidate users
//! tiercache lock nightly-report --hold-ms 5000
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::cache::{codec, CacheManager, CacheTier, LocalTier, SharedTier, SystemMemorySensor};
use tiercache::config::Settings;
use tiercache::store::{KeyValueStore, RedisStore};

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiercache - tiered cache over Redis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (YAML)
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Redis node URL; repeat or comma-separate for lock quorum
    #[arg(long = "redis-url", env = "REDIS_URL", value_delimiter = ',')]
    redis_urls: Vec<String>,

    /// Resolve keys through version counters
    #[arg(long, env = "TIERCACHE_VERSIONING")]
    versioning: bool,

    /// Skip the local memory tier
    #[arg(long)]
    no_local: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get {
        key: String,
        /// Version namespace
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Store a value (JSON, or a plain string)
    Set {
        key: String,
        value: String,
        /// TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Version namespace
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Delete a key from every tier
    Del {
        key: String,
        /// Version namespace
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Bump the version counter of a key or namespace
    Invalidate { key: String },
    /// Hold the distributed lock for a key
    Lock {
        key: String,
        /// How long to hold the lock
        #[arg(long, default_value = "1000")]
        hold_ms: u64,
        /// Lease TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Remove everything from every tier, including unrelated Redis keys
    Flush {
        /// Confirm the flush
        #[arg(long)]
        yes: bool,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let settings = load_settings(&args)?;
    let cache = build_cache(&settings).await?;

    match args.command {
        Command::Get { key, namespace } => {
            match cache.get_raw(&key, namespace.as_deref()).await? {
                Some(value) => println!("{}", codec::encode(&value)?),
                None => {
                    info!(key = %key, "Not found");
                    std::process::exit(1);
                }
            }
        }
        Command::Set {
            key,
            value,
            ttl,
            namespace,
        } => {
            let value = codec::decode(&value);
            cache
                .set_in(&key, &value, ttl.map(Duration::from_secs), namespace.as_deref())
                .await?;
            info!(key = %key, "Stored");
        }
        Command::Del { key, namespace } => {
            cache.del_in(&key, namespace.as_deref()).await?;
            info!(key = %key, "Deleted");
        }
        Command::Invalidate { key } => {
            if !settings.versioning {
                bail!("invalidate requires versioning (--versioning or `versioning: true`)");
            }
            cache.invalidate_key(&key).await;
            info!(key = %key, "Invalidated");
        }
        Command::Lock { key, hold_ms, ttl } => {
            let hold = Duration::from_millis(hold_ms);
            cache
                .lock(
                    &key,
                    || async move {
                        info!(hold_ms, "Lock held");
                        tokio::time::sleep(hold).await;
                    },
                    ttl.map(Duration::from_secs),
                )
                .await?;
            info!("Lock released");
        }
        Command::Flush { yes } => {
            if !yes {
                bail!("flush wipes every tier including the whole Redis database; pass --yes");
            }
            cache.flush_all().await;
            info!("Flushed all tiers");
        }
    }

    let snapshot = cache.metrics_snapshot();
    for tier in &snapshot.tiers {
        tracing::debug!(
            tier = %tier.name,
            hits = tier.hits,
            misses = tier.misses,
            errors = tier.errors,
            backfills = tier.backfills,
            "Tier metrics"
        );
    }

    Ok(())
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_yaml_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if !args.redis_urls.is_empty() {
        settings.redis_urls = args.redis_urls.clone();
    }
    if args.versioning {
        settings.versioning = true;
    }
    if args.no_local {
        settings.local.enabled = false;
    }
    settings.validate()?;
    Ok(settings)
}

async fn build_cache(settings: &Settings) -> anyhow::Result<CacheManager> {
    let mut tiers: Vec<Arc<dyn CacheTier>> = Vec::new();

    if settings.local.enabled {
        let sensor = Arc::new(SystemMemorySensor::new());
        tiers.push(Arc::new(LocalTier::with_config(
            settings.local_tier_config(sensor),
        )));
    }

    let mut nodes: Vec<Arc<dyn KeyValueStore>> = Vec::with_capacity(settings.redis_urls.len());
    for url in &settings.redis_urls {
        let store = RedisStore::connect(url)
            .await
            .with_context(|| format!("Failed to connect to {}", tiercache::store::redis::redact_url(url)))?;
        nodes.push(Arc::new(store));
    }

    if let Some(data) = nodes.first().cloned() {
        tiers.push(Arc::new(SharedTier::with_lock_nodes(
            data,
            nodes,
            settings.lock_settings(),
        )));
    }

    info!(
        tiers = tiers.len(),
        versioning = settings.versioning,
        "Cache ready"
    );
    Ok(CacheManager::with_config(settings.cache_config(), tiers))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "redis=warn".parse() {
        filter = filter.add_directive(directive);
    }

    // Logs go to stderr; stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! configuration files or environment variables.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::collector::{CollectorConfig, PoolConfig};
use crate::health::HealthThresholds;
use crate::recovery::RecoveryConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Beacon node configuration.
    pub beacon: BeaconSettings,
    /// Collection engine configuration.
    pub collector: CollectorSettings,
    /// Worker pool configuration.
    pub pool: PoolSettings,
    /// Error recovery configuration.
    pub recovery: RecoverySettings,
    /// Health thresholds.
    pub health: HealthSettings,
    /// Latest-snapshot cache configuration.
    pub cache: CacheSettings,
    /// Shutdown configuration.
    pub shutdown: ShutdownSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `MONITOR_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("beacon.url", "http://localhost:5052")?
            .set_default("beacon.request_timeout_ms", 30_000)?
            .set_default("beacon.retry_enabled", true)?
            .set_default("beacon.max_retries", 3)?
            .set_default("beacon.initial_backoff_ms", 100)?
            .set_default("beacon.max_backoff_ms", 5_000)?
            .set_default("beacon.backoff_factor", 2.0)?
            .set_default("collector.interval_ms", 12_000)?
            .set_default("collector.batch_size", 100)?
            .set_default("collector.flush_interval_ms", 2_000)?
            .set_default("collector.validators", Vec::<i64>::new())?
            .set_default("pool.workers", 10)?
            .set_default("pool.queue_size", 1_000)?
            .set_default("pool.max_retries", 3)?
            .set_default("pool.retry_delay_ms", 2_000)?
            .set_default("pool.task_timeout_ms", 30_000)?
            .set_default("recovery.threshold", 10)?
            .set_default("recovery.window_secs", 300)?
            .set_default("recovery.retry_backoff_ms", 1_000)?
            .set_default("recovery.max_backoff_ms", 30_000)?
            .set_default("health.staleness_limit_secs", 300)?
            .set_default("health.error_rate_limit", 0.10)?
            .set_default("health.queue_depth_limit", 800)?
            .set_default("cache.latest_ttl_secs", 60)?
            .set_default("cache.max_capacity", 100_000)?
            .set_default("shutdown.deadline_secs", 45)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (MONITOR_ prefix)
            .add_source(
                Environment::with_prefix("MONITOR")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Beacon validation
        if self.beacon.url.is_empty() {
            errors.push("beacon.url cannot be empty".into());
        }
        if self.beacon.backoff_factor < 1.0 {
            errors.push("beacon.backoff_factor must be at least 1.0".into());
        }
        if self.beacon.max_backoff_ms < self.beacon.initial_backoff_ms {
            errors.push("beacon.max_backoff_ms cannot be below initial_backoff_ms".into());
        }

        // Collector validation
        if self.collector.interval_ms == 0 {
            errors.push("collector.interval_ms must be non-zero".into());
        }
        if self.collector.batch_size == 0 {
            errors.push("collector.batch_size must be non-zero".into());
        }
        if self.collector.batch_size as usize > self.pool.queue_size {
            errors.push("collector.batch_size cannot exceed pool.queue_size".into());
        }

        // Pool validation
        if self.pool.workers == 0 {
            errors.push("pool.workers must be non-zero".into());
        }
        if self.pool.queue_size == 0 {
            errors.push("pool.queue_size must be non-zero".into());
        }

        // Health validation
        if !(0.0..=1.0).contains(&self.health.error_rate_limit) {
            errors.push("health.error_rate_limit must be within [0, 1]".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Beacon node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BeaconSettings {
    /// Beacon node HTTP URL.
    pub url: String,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Whether GETs retry on transient failures.
    pub retry_enabled: bool,
    /// Maximum retry attempts.
    pub max_retries: u32,
    /// Wait before the first retry in milliseconds.
    pub initial_backoff_ms: u64,
    /// Cap on the backoff wait in milliseconds.
    pub max_backoff_ms: u64,
    /// Backoff growth factor.
    pub backoff_factor: f64,
}

impl BeaconSettings {
    /// Build the beacon client configuration.
    #[must_use]
    pub fn client_config(&self) -> beacon_api::BeaconConfig {
        beacon_api::BeaconConfig::new()
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_retry_enabled(self.retry_enabled)
            .with_retry(
                beacon_api::RetryConfig::new()
                    .with_max_retries(self.max_retries)
                    .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
                    .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
                    .with_backoff_factor(self.backoff_factor),
            )
    }
}

/// Collection engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSettings {
    /// Collection interval in milliseconds.
    pub interval_ms: u64,
    /// Snapshots per committed batch.
    pub batch_size: u32,
    /// Fallback flush period in milliseconds.
    pub flush_interval_ms: u64,
    /// Validator indices to monitor.
    pub validators: Vec<u64>,
}

impl CollectorSettings {
    /// Build the engine configuration.
    #[must_use]
    pub fn collector_config(&self, cache: &CacheSettings) -> CollectorConfig {
        CollectorConfig {
            collection_interval: Duration::from_millis(self.interval_ms),
            batch_size: self.batch_size as usize,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            cache_ttl: Duration::from_secs(cache.latest_ttl_secs),
            pool_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Worker fibers to spawn.
    pub workers: usize,
    /// Task channel capacity.
    pub queue_size: usize,
    /// Retry attempts per task.
    pub max_retries: u32,
    /// Base retry wait in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout in milliseconds.
    pub task_timeout_ms: u64,
}

impl PoolSettings {
    /// Build the pool configuration.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            queue_size: self.queue_size,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            task_timeout: Duration::from_millis(self.task_timeout_ms),
        }
    }
}

/// Error recovery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoverySettings {
    /// Errors within the window that open the circuit.
    pub threshold: u32,
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Base retry wait in milliseconds.
    pub retry_backoff_ms: u64,
    /// Cap on the retry wait in milliseconds.
    pub max_backoff_ms: u64,
}

impl RecoverySettings {
    /// Build the recovery configuration.
    #[must_use]
    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            threshold: self.threshold,
            window: Duration::from_secs(self.window_secs),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_retries: 3,
        }
    }
}

/// Health thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    /// Longest tolerated gap since the last collection, in seconds.
    pub staleness_limit_secs: u64,
    /// Highest tolerated error rate.
    pub error_rate_limit: f64,
    /// Deepest tolerated task queue.
    pub queue_depth_limit: usize,
}

impl HealthSettings {
    /// Build the health thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            staleness_limit: Duration::from_secs(self.staleness_limit_secs),
            error_rate_limit: self.error_rate_limit,
            queue_depth_limit: self.queue_depth_limit,
        }
    }
}

/// Latest-snapshot cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// TTL for latest-snapshot entries, in seconds.
    pub latest_ttl_secs: u64,
    /// Maximum cached entries.
    pub max_capacity: u64,
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// Deadline for the whole shutdown sequence, in seconds.
    pub deadline_secs: u64,
}

impl ShutdownSettings {
    /// Shutdown deadline as a `Duration`.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (e.g. "info", "validator_monitor=debug").
    pub level: String,
    /// Output format: "json" or "pretty".
    pub format: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

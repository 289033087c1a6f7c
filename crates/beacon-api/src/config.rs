//! Configuration for the beacon-node client.
//!
//! This module provides [`BeaconConfig`] and [`RetryConfig`] for customizing
//! client behavior:
//!
//! - Request timeouts
//! - Retry count and capped exponential backoff
//!
//! # Example
//!
//! ```
//! use beacon_api::{BeaconConfig, RetryConfig};
//! use std::time::Duration;
//!
//! let config = BeaconConfig::default()
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_retry(RetryConfig::default().with_max_retries(5));
//! ```

use std::time::Duration;

use crate::error::{BeaconError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default timeout for HTTP requests to the beacon node.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum retry attempts (on top of the initial attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default cap on the backoff wait.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Default backoff growth factor.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Minimum allowed request timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum allowed request timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum allowed retry attempts.
pub const MAX_RETRIES_LIMIT: u32 = 20;

// ═══════════════════════════════════════════════════════════════════════════════
// RETRY CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Capped exponential backoff parameters for
/// [`RetryingClient`](crate::RetryingClient).
///
/// Attempt 0 fires immediately; attempt `k >= 1` waits
/// `min(initial_backoff * backoff_factor^(k-1), max_backoff)`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts on top of the initial attempt.
    ///
    /// Default: 3 (so at most 4 attempts total).
    pub max_retries: u32,

    /// Wait before the first retry.
    ///
    /// Default: 100ms.
    pub initial_backoff: Duration,

    /// Cap on the backoff wait.
    ///
    /// Default: 5 seconds.
    pub max_backoff: Duration,

    /// Multiplier applied to the wait for each further retry.
    ///
    /// Default: 2.0.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum retry attempts.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the wait before the first retry.
    #[must_use]
    pub const fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Set the cap on the backoff wait.
    #[must_use]
    pub const fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Set the backoff growth factor.
    #[must_use]
    pub const fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidConfig`] if:
    /// - `max_retries` exceeds [`MAX_RETRIES_LIMIT`]
    /// - `backoff_factor` is below 1.0 or not finite
    /// - `max_backoff` is shorter than `initial_backoff`
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(BeaconError::InvalidConfig(format!(
                "max_retries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(BeaconError::InvalidConfig(
                "backoff_factor must be finite and at least 1.0".into(),
            ));
        }

        if self.max_backoff < self.initial_backoff {
            return Err(BeaconError::InvalidConfig(
                "max_backoff must not be shorter than initial_backoff".into(),
            ));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BEACON CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration options for [`BeaconClient`](crate::BeaconClient).
///
/// # Timeouts and the event stream
///
/// `request_timeout` applies to the one-shot GET endpoints only. The SSE
/// event stream is long-lived by design and is bounded by cancellation,
/// not by a timeout.
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    /// Request timeout for one-shot HTTP calls.
    ///
    /// Default: 30 seconds. Range: 1-300 seconds.
    pub request_timeout: Duration,

    /// Whether GET endpoints go through the retrying client.
    ///
    /// Default: true.
    pub retry_enabled: bool,

    /// Backoff parameters used when `retry_enabled` is set.
    pub retry: RetryConfig,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_enabled: true,
            retry: RetryConfig::default(),
        }
    }
}

impl BeaconConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout for one-shot HTTP calls.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable retries on GET endpoints.
    #[must_use]
    pub const fn with_retry_enabled(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    /// Replace the retry/backoff parameters.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    ///
    /// Called automatically when creating a client.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidConfig`] if the timeout is out of range
    /// or the retry parameters are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout < MIN_TIMEOUT {
            return Err(BeaconError::InvalidConfig(format!(
                "request_timeout must be at least {MIN_TIMEOUT:?}"
            )));
        }

        if self.request_timeout > MAX_TIMEOUT {
            return Err(BeaconError::InvalidConfig(format!(
                "request_timeout must be at most {MAX_TIMEOUT:?}"
            )));
        }

        self.retry.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BeaconConfig::default();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.retry_enabled);
        assert_eq!(config.retry.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = BeaconConfig::new()
            .with_request_timeout(Duration::from_secs(10))
            .with_retry_enabled(false)
            .with_retry(RetryConfig::new().with_max_retries(1));

        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(!config.retry_enabled);
        assert_eq!(config.retry.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_timeout_out_of_range() {
        let low = BeaconConfig::new().with_request_timeout(Duration::from_millis(200));
        assert!(low.validate().is_err());

        let high = BeaconConfig::new().with_request_timeout(Duration::from_secs(600));
        assert!(high.validate().is_err());
    }

    #[test]
    fn validate_backoff_factor_below_one() {
        let config = RetryConfig::new().with_backoff_factor(0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_max_backoff_below_initial() {
        let config = RetryConfig::new()
            .with_initial_backoff(Duration::from_secs(10))
            .with_max_backoff(Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_too_many_retries() {
        let config = RetryConfig::new().with_max_retries(MAX_RETRIES_LIMIT + 1);
        assert!(config.validate().is_err());
    }
}

//! Per-component error recovery: sliding-window circuit breaking and
//! retry-with-backoff.
//!
//! Each component tag (e.g. `"beacon"`, `"store"`) accumulates errors in
//! a sliding window. Once the count reaches the threshold inside a
//! current window, the circuit is open and
//! [`ErrorRecovery::retry_with_backoff`] fails fast without invoking the
//! operation. Any success resets the component.
//!
//! ```text
//! ┌──────────┐  count >= threshold  ┌──────────┐  window slides /  ┌──────────┐
//! │  Closed  │ ────────────────────▶│   Open   │ ─────────────────▶│  Closed  │
//! │ (normal) │   within window      │(fail-fast)│  success recorded │ (normal) │
//! └──────────┘                      └──────────┘                   └──────────┘
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Recovery parameters.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Errors within the window that open the circuit.
    ///
    /// Default: 10.
    pub threshold: u32,

    /// Sliding window length.
    ///
    /// Default: 5 minutes.
    pub window: Duration,

    /// Base wait between retry attempts.
    ///
    /// Default: 1 second.
    pub retry_backoff: Duration,

    /// Cap on the retry wait.
    ///
    /// Default: 30 seconds.
    pub max_backoff: Duration,

    /// Attempts per [`ErrorRecovery::retry_with_backoff`] call.
    ///
    /// Default: 3.
    pub max_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            window: Duration::from_secs(300),
            retry_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR RECOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Error state for one component.
#[derive(Debug, Clone, Copy)]
struct ErrorWindow {
    count: u32,
    first_error: Instant,
    last_error: Instant,
}

/// Sliding-window error tracking with circuit breaking, keyed by
/// component tag.
#[derive(Debug)]
pub struct ErrorRecovery {
    config: RecoveryConfig,
    windows: RwLock<HashMap<String, ErrorWindow>>,
}

impl ErrorRecovery {
    /// Create a recovery tracker.
    #[must_use]
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Record an error for a component; returns the window's new count.
    ///
    /// A window older than the configured length is restarted at this
    /// error.
    pub fn record_error(&self, component: &str) -> u32 {
        let now = Instant::now();
        let mut windows = self.windows.write();

        let window = windows
            .entry(component.to_string())
            .and_modify(|window| {
                if now.duration_since(window.first_error) > self.config.window {
                    window.count = 1;
                    window.first_error = now;
                } else {
                    window.count = window.count.saturating_add(1);
                }
                window.last_error = now;
            })
            .or_insert(ErrorWindow {
                count: 1,
                first_error: now,
                last_error: now,
            });

        if window.count == self.config.threshold {
            warn!(
                component,
                errors = window.count,
                threshold = self.config.threshold,
                "Circuit opened"
            );
        }

        window.count
    }

    /// Record a success, resetting the component's window.
    pub fn record_success(&self, component: &str) {
        if self.windows.write().remove(component).is_some() {
            debug!(component, "Error window reset");
        }
    }

    /// Errors currently counted for a component.
    #[must_use]
    pub fn error_count(&self, component: &str) -> u32 {
        self.windows
            .read()
            .get(component)
            .map_or(0, |window| window.count)
    }

    /// Whether the circuit is open for a component.
    ///
    /// Open means the threshold was reached and the window is still
    /// current.
    #[must_use]
    pub fn should_circuit_break(&self, component: &str) -> bool {
        let windows = self.windows.read();
        let Some(window) = windows.get(component) else {
            return false;
        };

        window.count >= self.config.threshold
            && window.first_error.elapsed() <= self.config.window
    }

    /// Wait before the attempt after attempt `k` (0-based):
    /// `min(retry_backoff * 2^k, max_backoff)`.
    #[must_use]
    pub fn compute_retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.config
            .retry_backoff
            .checked_mul(factor)
            .map_or(self.config.max_backoff, |wait| {
                wait.min(self.config.max_backoff)
            })
    }

    /// Run an operation with retries, backoff and circuit breaking.
    ///
    /// Makes up to `max_retries` attempts. An open circuit at the start
    /// of any attempt fails fast without invoking the operation; a
    /// successful attempt resets the component.
    ///
    /// # Errors
    ///
    /// [`MonitorError::CircuitOpen`] when the breaker is open; otherwise
    /// the last error the operation returned.
    pub async fn retry_with_backoff<T, F, Fut>(&self, component: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            if self.should_circuit_break(component) {
                return Err(MonitorError::CircuitOpen(component.to_string()));
            }

            match op().await {
                Ok(value) => {
                    self.record_success(component);
                    return Ok(value);
                }
                Err(e) => {
                    let count = self.record_error(component);
                    debug!(component, attempt, errors = count, error = %e, "Attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt + 1 < self.config.max_retries {
                tokio::time::sleep(self.compute_retry_backoff(attempt)).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| MonitorError::Initialization("retry loop made no attempts".into())))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config() -> RecoveryConfig {
        RecoveryConfig {
            retry_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            ..RecoveryConfig::default()
        }
    }

    #[test]
    fn circuit_opens_at_threshold() {
        let recovery = ErrorRecovery::new(RecoveryConfig::default());

        for _ in 0..9 {
            recovery.record_error("beacon");
        }
        assert!(!recovery.should_circuit_break("beacon"));

        recovery.record_error("beacon");
        assert!(recovery.should_circuit_break("beacon"));
        assert_eq!(recovery.error_count("beacon"), 10);
    }

    #[test]
    fn success_resets_window() {
        let recovery = ErrorRecovery::new(RecoveryConfig::default());

        for _ in 0..10 {
            recovery.record_error("store");
        }
        assert!(recovery.should_circuit_break("store"));

        recovery.record_success("store");
        assert!(!recovery.should_circuit_break("store"));
        assert_eq!(recovery.error_count("store"), 0);
    }

    #[test]
    fn stale_window_restarts() {
        let recovery = ErrorRecovery::new(RecoveryConfig {
            window: Duration::from_millis(20),
            ..RecoveryConfig::default()
        });

        for _ in 0..10 {
            recovery.record_error("beacon");
        }
        std::thread::sleep(Duration::from_millis(40));

        // The next error lands in a fresh window.
        assert_eq!(recovery.record_error("beacon"), 1);
        assert!(!recovery.should_circuit_break("beacon"));
    }

    #[test]
    fn components_are_independent() {
        let recovery = ErrorRecovery::new(RecoveryConfig::default());

        for _ in 0..10 {
            recovery.record_error("beacon");
        }

        assert!(recovery.should_circuit_break("beacon"));
        assert!(!recovery.should_circuit_break("cache"));
    }

    #[test]
    fn retry_backoff_doubles_and_caps() {
        let recovery = ErrorRecovery::new(RecoveryConfig::default());

        assert_eq!(recovery.compute_retry_backoff(0), Duration::from_secs(1));
        assert_eq!(recovery.compute_retry_backoff(1), Duration::from_secs(2));
        assert_eq!(recovery.compute_retry_backoff(2), Duration::from_secs(4));
        assert_eq!(recovery.compute_retry_backoff(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let recovery = ErrorRecovery::new(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = recovery
            .retry_with_backoff("beacon", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(MonitorError::Sink("transient".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("retry should succeed"), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // The success reset the window.
        assert_eq!(recovery.error_count("beacon"), 0);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_invoking_op() {
        let recovery = ErrorRecovery::new(fast_config());

        for _ in 0..10 {
            recovery.record_error("beacon");
        }

        let invoked = Arc::new(AtomicU32::new(0));
        let counter = invoked.clone();
        let result: Result<()> = recovery
            .retry_with_backoff("beacon", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(MonitorError::CircuitOpen(component)) if component == "beacon"));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let recovery = ErrorRecovery::new(fast_config());

        let result: Result<()> = recovery
            .retry_with_backoff("cache", || async {
                Err(MonitorError::Sink("still down".into()))
            })
            .await;

        assert!(matches!(result, Err(MonitorError::Sink(message)) if message == "still down"));
        assert_eq!(recovery.error_count("cache"), 3);
    }
}

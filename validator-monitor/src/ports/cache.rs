//! Caching port for the freshest per-validator snapshot.
//!
//! After every committed batch the aggregator writes each snapshot under
//! [`latest_snapshot_key`] so API readers get the freshest record without
//! touching the time-series store. Cache writes are best-effort: they
//! happen after the store commit and are allowed to lag it (eventual
//! consistency).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::snapshot::ValidatorSnapshot;

/// Cache key holding the freshest snapshot of a validator.
#[must_use]
pub fn latest_snapshot_key(validator_index: u64) -> String {
    format!("validator:latest:{validator_index}")
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the fast key/value cache.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Treat `batch_set` as independent per-key writes (no atomicity
///   requirement across a batch)
/// - Apply the given TTL to every written entry
/// - Be thread-safe (this trait requires `Send + Sync`)
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Write a batch of snapshots, each under its own key, with a TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the caller logs and continues.
    async fn batch_set(
        &self,
        entries: HashMap<String, ValidatorSnapshot>,
        ttl: Duration,
    ) -> Result<()>;

    /// Read a cached snapshot.
    ///
    /// Returns `None` on a miss or after TTL expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn get(&self, key: &str) -> Result<Option<ValidatorSnapshot>>;

    /// Release the cache's resources during shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails; shutdown logs and continues.
    async fn close(&self) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOCKS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks {
    //! Mock implementations for testing.

    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::RwLock;

    use super::{Duration, HashMap, Result, SnapshotCache, ValidatorSnapshot, async_trait};
    use crate::error::MonitorError;

    /// In-memory cache that ignores TTLs and records writes.
    #[derive(Debug, Default)]
    pub struct MockSnapshotCache {
        entries: RwLock<HashMap<String, ValidatorSnapshot>>,
        should_fail: AtomicBool,
        closed: AtomicBool,
    }

    impl MockSnapshotCache {
        /// Create an empty mock cache.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent writes fail (or succeed again).
        pub fn set_should_fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }

        /// Number of cached entries.
        #[must_use]
        pub fn len(&self) -> usize {
            self.entries.read().len()
        }

        /// Whether the cache is empty.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.entries.read().is_empty()
        }

        /// Whether `close` was called.
        #[must_use]
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotCache for MockSnapshotCache {
        async fn batch_set(
            &self,
            entries: HashMap<String, ValidatorSnapshot>,
            _ttl: Duration,
        ) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(MonitorError::Sink("mock cache failure".into()));
            }
            self.entries.write().extend(entries);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<ValidatorSnapshot>> {
            Ok(self.entries.read().get(key).cloned())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_is_stable() {
        assert_eq!(latest_snapshot_key(0), "validator:latest:0");
        assert_eq!(latest_snapshot_key(123_456), "validator:latest:123456");
    }

    #[tokio::test]
    async fn mock_cache_round_trip() {
        use chrono::Utc;

        use super::mocks::MockSnapshotCache;
        use crate::types::snapshot::AttestationMetrics;

        let cache = MockSnapshotCache::new();
        let snapshot = ValidatorSnapshot {
            time: Utc::now(),
            validator_index: 9,
            balance: 1,
            effective_balance: 1,
            is_online: false,
            attestation: AttestationMetrics::default(),
        };

        let mut entries = HashMap::new();
        entries.insert(latest_snapshot_key(9), snapshot.clone());
        cache
            .batch_set(entries, Duration::from_secs(60))
            .await
            .expect("write failed");

        let cached = cache
            .get(&latest_snapshot_key(9))
            .await
            .expect("read failed");
        assert_eq!(cached, Some(snapshot));
        assert!(cache.get("validator:latest:404").await.expect("read failed").is_none());
    }
}

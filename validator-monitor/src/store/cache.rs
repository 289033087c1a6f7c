//! In-memory latest-snapshot cache backed by moka.
//!
//! Implements the [`SnapshotCache`] port with TTL-based expiration and
//! LRU eviction. The TTL is per entry (moka's `Expiry` hook), so the
//! engine's cache policy flows through the port unchanged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache as MokaCache;
use tracing::debug;

use crate::error::Result;
use crate::ports::cache::SnapshotCache;
use crate::types::snapshot::ValidatorSnapshot;

/// Default maximum cached entries.
const DEFAULT_MAX_CAPACITY: u64 = 100_000;

// ═══════════════════════════════════════════════════════════════════════════════
// MOKA SNAPSHOT CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Cached snapshot plus the TTL it was written with.
#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: ValidatorSnapshot,
    ttl: Duration,
}

/// Per-entry expiry reading the TTL stored with each value.
struct PerEntryTtl;

impl moka::Expiry<String, CachedSnapshot> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedSnapshot,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Latest-snapshot cache with TTL expiration and LRU eviction.
#[derive(Debug)]
pub struct MokaSnapshotCache {
    entries: MokaCache<String, CachedSnapshot>,
}

impl Default for MokaSnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

impl MokaSnapshotCache {
    /// Create a cache bounded to `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: MokaCache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    /// Entries currently cached (approximate until pending tasks run).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[async_trait]
impl SnapshotCache for MokaSnapshotCache {
    async fn batch_set(
        &self,
        entries: std::collections::HashMap<String, ValidatorSnapshot>,
        ttl: Duration,
    ) -> Result<()> {
        let count = entries.len();
        for (key, snapshot) in entries {
            self.entries.insert(key, CachedSnapshot { snapshot, ttl });
        }
        debug!(count, ?ttl, "Cache batch written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ValidatorSnapshot>> {
        Ok(self.entries.get(key).map(|cached| cached.snapshot))
    }

    async fn close(&self) -> Result<()> {
        self.entries.invalidate_all();
        debug!("Snapshot cache closed");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::ports::cache::latest_snapshot_key;
    use crate::types::snapshot::AttestationMetrics;

    fn snapshot(index: u64) -> ValidatorSnapshot {
        ValidatorSnapshot {
            time: Utc::now(),
            validator_index: index,
            balance: 32_000_000_000,
            effective_balance: 32_000_000_000,
            is_online: true,
            attestation: AttestationMetrics::default(),
        }
    }

    #[tokio::test]
    async fn round_trips_latest_snapshots() {
        let cache = MokaSnapshotCache::new(100);

        let mut entries = HashMap::new();
        entries.insert(latest_snapshot_key(1), snapshot(1));
        entries.insert(latest_snapshot_key(2), snapshot(2));
        cache
            .batch_set(entries, Duration::from_secs(60))
            .await
            .expect("write failed");

        let cached = cache
            .get(&latest_snapshot_key(1))
            .await
            .expect("read failed")
            .expect("entry missing");
        assert_eq!(cached.validator_index, 1);
        assert!(
            cache
                .get(&latest_snapshot_key(3))
                .await
                .expect("read failed")
                .is_none()
        );
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MokaSnapshotCache::new(100);

        let mut entries = HashMap::new();
        entries.insert(latest_snapshot_key(1), snapshot(1));
        cache
            .batch_set(entries, Duration::from_millis(30))
            .await
            .expect("write failed");

        assert!(
            cache
                .get(&latest_snapshot_key(1))
                .await
                .expect("read failed")
                .is_some()
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(
            cache
                .get(&latest_snapshot_key(1))
                .await
                .expect("read failed")
                .is_none(),
            "entry must expire after its TTL"
        );
    }

    #[tokio::test]
    async fn newer_write_replaces_older() {
        let cache = MokaSnapshotCache::new(100);

        let mut first = HashMap::new();
        let mut old = snapshot(1);
        old.balance = 1;
        first.insert(latest_snapshot_key(1), old);
        cache
            .batch_set(first, Duration::from_secs(60))
            .await
            .expect("write failed");

        let mut second = HashMap::new();
        second.insert(latest_snapshot_key(1), snapshot(1));
        cache
            .batch_set(second, Duration::from_secs(60))
            .await
            .expect("write failed");

        let cached = cache
            .get(&latest_snapshot_key(1))
            .await
            .expect("read failed")
            .expect("entry missing");
        assert_eq!(cached.balance, 32_000_000_000);
    }

    #[tokio::test]
    async fn close_clears_entries() {
        let cache = MokaSnapshotCache::new(100);

        let mut entries = HashMap::new();
        entries.insert(latest_snapshot_key(9), snapshot(9));
        cache
            .batch_set(entries, Duration::from_secs(60))
            .await
            .expect("write failed");

        cache.close().await.expect("close failed");
        assert!(
            cache
                .get(&latest_snapshot_key(9))
                .await
                .expect("read failed")
                .is_none()
        );
    }
}

//! Storage port for snapshot persistence.
//!
//! The aggregator commits snapshot batches through [`SnapshotStore`].
//! Implementations decide durability; the engine only requires that a
//! batch either lands completely or fails as a unit (a failed batch is
//! dropped and re-collected on a later tick).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::snapshot::ValidatorSnapshot;

// ═══════════════════════════════════════════════════════════════════════════════
// EFFECTIVENESS SCORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Attestation effectiveness from votes and inclusion delay.
///
/// The vote-weighted score is `0.5*head + 0.25*source + 0.25*target`,
/// scaled by the inclusion-delay penalty `1/delay`. The penalty is
/// monotone non-increasing in the delay and maps delay 1 to the full
/// vote-weighted score, so the result is always within `[0, 1]`.
///
/// Delays below 1 are invalid upstream data and clamp to 1.
#[must_use]
pub fn effectiveness_score(head: bool, source: bool, target: bool, inclusion_delay: i32) -> f64 {
    let vote_score =
        0.5 * f64::from(head) + 0.25 * f64::from(source) + 0.25 * f64::from(target);
    let delay = f64::from(inclusion_delay.max(1));

    vote_score / delay
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for snapshot persistence.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Make `insert_batch` all-or-nothing (single multi-row insert or
///   transaction); the engine drops the whole batch on failure
/// - Preserve the order of the slice within a batch (per-validator commit
///   ordering relies on it)
/// - Index on `(validator_index, time)` for time-series queries
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a batch of snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the caller treats the batch
    /// as not persisted.
    async fn insert_batch(&self, snapshots: &[ValidatorSnapshot]) -> Result<()>;

    /// Release the store's resources during shutdown.
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

    use parking_lot::Mutex;

    use super::{Result, SnapshotStore, ValidatorSnapshot, async_trait};
    use crate::error::MonitorError;

    /// In-memory store that records every committed batch.
    #[derive(Debug, Default)]
    pub struct MockSnapshotStore {
        /// Batches in commit order.
        batches: Mutex<Vec<Vec<ValidatorSnapshot>>>,
        /// When set, `insert_batch` fails.
        should_fail: AtomicBool,
        /// Whether `close` was called.
        closed: AtomicBool,
    }

    impl MockSnapshotStore {
        /// Create an empty mock store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent inserts fail (or succeed again).
        pub fn set_should_fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }

        /// Batches committed so far.
        #[must_use]
        pub fn batches(&self) -> Vec<Vec<ValidatorSnapshot>> {
            self.batches.lock().clone()
        }

        /// Total snapshots across all committed batches.
        #[must_use]
        pub fn snapshot_count(&self) -> usize {
            self.batches.lock().iter().map(Vec::len).sum()
        }

        /// Whether `close` was called.
        #[must_use]
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotStore for MockSnapshotStore {
        async fn insert_batch(&self, snapshots: &[ValidatorSnapshot]) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(MonitorError::Sink("mock insert failure".into()));
            }
            self.batches.lock().push(snapshots.to_vec());
            Ok(())
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
    fn full_votes_at_delay_one_scores_one() {
        let score = effectiveness_score(true, true, true, 1);
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn vote_weights() {
        assert!((effectiveness_score(true, false, false, 1) - 0.5).abs() < f64::EPSILON);
        assert!((effectiveness_score(false, true, false, 1) - 0.25).abs() < f64::EPSILON);
        assert!((effectiveness_score(false, false, true, 1) - 0.25).abs() < f64::EPSILON);
        assert!(effectiveness_score(false, false, false, 1).abs() < f64::EPSILON);
    }

    #[test]
    fn delay_penalty_is_monotone_non_increasing() {
        let mut previous = effectiveness_score(true, true, true, 1);
        for delay in 2..=64 {
            let current = effectiveness_score(true, true, true, delay);
            assert!(current <= previous, "score must not grow with delay");
            assert!(current > 0.0);
            previous = current;
        }
    }

    proptest::proptest! {
        #[test]
        fn score_stays_in_unit_interval(
            head in proptest::prelude::any::<bool>(),
            source in proptest::prelude::any::<bool>(),
            target in proptest::prelude::any::<bool>(),
            delay in 1i32..10_000,
        ) {
            let score = effectiveness_score(head, source, target, delay);
            proptest::prop_assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn invalid_delay_clamps_to_one() {
        let clamped = effectiveness_score(true, true, true, 0);
        assert!((clamped - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn mock_store_records_batches() {
        use chrono::Utc;

        use super::mocks::MockSnapshotStore;
        use crate::types::snapshot::AttestationMetrics;

        let store = MockSnapshotStore::new();
        let snapshot = ValidatorSnapshot {
            time: Utc::now(),
            validator_index: 1,
            balance: 32_000_000_000,
            effective_balance: 32_000_000_000,
            is_online: true,
            attestation: AttestationMetrics::default(),
        };

        store
            .insert_batch(&[snapshot.clone(), snapshot])
            .await
            .expect("insert failed");
        assert_eq!(store.snapshot_count(), 2);

        store.set_should_fail(true);
        let snapshot = store.batches()[0][0].clone();
        assert!(store.insert_batch(&[snapshot]).await.is_err());
        // Failed batches must not be recorded.
        assert_eq!(store.snapshot_count(), 2);
    }
}

//! In-memory snapshot store.
//!
//! Keeps the full time series in a vector and the freshest snapshot per
//! validator in a concurrent index. Suitable for single-process
//! deployments, demos and tests; a durable backend implements the same
//! port against TimescaleDB.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::ports::store::SnapshotStore;
use crate::types::snapshot::ValidatorSnapshot;

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only in-memory snapshot store.
///
/// `insert_batch` is all-or-nothing: the rows vector is extended under a
/// single write lock, so a reader never observes a partial batch.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Full time series in commit order.
    rows: RwLock<Vec<ValidatorSnapshot>>,
    /// Freshest snapshot per validator.
    latest: DashMap<u64, ValidatorSnapshot>,
    /// Set once `close` has run; later writes are rejected.
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total snapshots stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the store holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Freshest snapshot for a validator, if any.
    #[must_use]
    pub fn latest(&self, validator_index: u64) -> Option<ValidatorSnapshot> {
        self.latest
            .get(&validator_index)
            .map(|entry| entry.value().clone())
    }

    /// All snapshots for a validator, oldest first.
    #[must_use]
    pub fn history(&self, validator_index: u64) -> Vec<ValidatorSnapshot> {
        self.rows
            .read()
            .iter()
            .filter(|snapshot| snapshot.validator_index == validator_index)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn insert_batch(&self, snapshots: &[ValidatorSnapshot]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MonitorError::Sink("store is closed".into()));
        }

        self.rows.write().extend_from_slice(snapshots);
        for snapshot in snapshots {
            self.latest
                .insert(snapshot.validator_index, snapshot.clone());
        }

        debug!(batch_size = snapshots.len(), "Batch stored in memory");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        debug!(rows = self.len(), "Memory store closed");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

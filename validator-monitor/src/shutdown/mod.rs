//! Signal capture and ordered, deadline-bounded shutdown.
//!
//! The manager owns the root cancellation token. `SIGINT`/`SIGTERM` (or a
//! programmatic [`ShutdownManager::initiate_shutdown`]) trip it exactly
//! once; [`ShutdownManager::run_phases`] then walks the shutdown sequence
//! under a single deadline:
//!
//! 1. stop accepting new work (root cancellation halts the tick loop)
//! 2. wait for in-progress work via engine stop
//! 3. flush buffers (the engine's aggregator flushes on cancellation)
//! 4. close the snapshot store
//! 5. close the cache
//!
//! Each phase is reported independently; a failing phase is logged and
//! never aborts later phases. Completion is observable via
//! [`ShutdownManager::wait`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collector::{CollectionEngine, TaskExecutor};
use crate::ports::cache::SnapshotCache;
use crate::ports::store::SnapshotStore;

// ═══════════════════════════════════════════════════════════════════════════════
// SHUTDOWN MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Coordinates signal capture and the phased shutdown sequence.
#[derive(Debug)]
pub struct ShutdownManager {
    /// Root token; children of it drive every component's lifetime.
    root: CancellationToken,
    /// Budget for the whole phase sequence.
    deadline: Duration,
    /// Once-guard for initiation.
    initiated: AtomicBool,
    /// Set once the phase sequence has finished.
    completed: AtomicBool,
    /// Notifies `wait` callers on completion.
    done: Notify,
}

impl ShutdownManager {
    /// Create a manager with the given phase-sequence deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Arc<Self> {
        Arc::new(Self {
            root: CancellationToken::new(),
            deadline,
            initiated: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            done: Notify::new(),
        })
    }

    /// The root cancellation token; derive component tokens from it.
    #[must_use]
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Trip the shutdown exactly once; later calls are no-ops.
    pub fn initiate_shutdown(&self) {
        if self.initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutdown initiated");
        self.root.cancel();
    }

    /// Whether shutdown has been initiated.
    #[must_use]
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Wait until shutdown has been initiated.
    pub async fn triggered(&self) {
        self.root.cancelled().await;
    }

    /// Wait until the phase sequence has completed.
    pub async fn wait(&self) {
        let notified = self.done.notified();
        tokio::pin!(notified);
        // Register before re-checking the flag, so a completion landing
        // in between cannot be missed.
        notified.as_mut().enable();
        if self.completed.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    /// Spawn a task translating `SIGINT`/`SIGTERM` into
    /// [`initiate_shutdown`](Self::initiate_shutdown).
    pub fn spawn_signal_listener(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            wait_for_signal().await;
            manager.initiate_shutdown();
        });
    }

    /// Run the phase sequence under the deadline.
    ///
    /// Returns `true` when every phase finished inside the deadline;
    /// `false` when the deadline expired (remaining phases are skipped)
    /// or any phase reported an error.
    pub async fn run_phases<E: TaskExecutor>(
        &self,
        engine: &CollectionEngine<E>,
        store: &dyn SnapshotStore,
        cache: Option<&dyn SnapshotCache>,
    ) -> bool {
        // Belt and braces: run_phases may be called programmatically
        // before any signal arrived.
        self.initiate_shutdown();

        let mut clean = true;
        let phases = async {
            // Phase 1: stop accepting new work. Root cancellation has
            // already halted the tick loop and pool admission follows in
            // the engine stop; this phase is about making that explicit.
            info!(phase = 1, "Stopped accepting new work");

            // Phases 2 + 3: wait for in-progress work and flush buffers.
            // The engine drains its pool and the aggregator performs the
            // final flush on cancellation.
            engine.stop().await;
            info!(phase = 2, "In-progress work drained");
            info!(phase = 3, "Buffers flushed");

            let mut ok = true;

            // Phase 4: close storage.
            if let Err(e) = store.close().await {
                error!(phase = 4, error = %e, "Store close failed");
                ok = false;
            } else {
                info!(phase = 4, "Store closed");
            }

            // Phase 5: close cache.
            if let Some(cache) = cache {
                if let Err(e) = cache.close().await {
                    error!(phase = 5, error = %e, "Cache close failed");
                    ok = false;
                } else {
                    info!(phase = 5, "Cache closed");
                }
            }

            ok
        };

        match tokio::time::timeout(self.deadline, phases).await {
            Ok(ok) => clean &= ok,
            Err(_) => {
                warn!(deadline = ?self.deadline, "Shutdown deadline exceeded");
                clean = false;
            }
        }

        self.completed.store(true, Ordering::SeqCst);
        self.done.notify_waiters();

        if clean {
            info!("Shutdown complete");
        } else {
            warn!("Shutdown completed with errors");
        }
        clean
    }
}

/// Block until `SIGINT` or `SIGTERM` arrives.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "Failed to install SIGINT handler");
            return std::future::pending().await;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => info!("Received SIGINT"),
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Received ctrl-c");
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use beacon_api::{BeaconClient, BeaconConfig};

    use super::*;
    use crate::collector::{CollectorConfig, PoolConfig, WorkerPool};
    use crate::error::CollectError;
    use crate::metrics::MetricsRegistry;
    use crate::ports::cache::mocks::MockSnapshotCache;
    use crate::ports::store::mocks::MockSnapshotStore;
    use crate::ports::validators::StaticValidatorRepository;
    use crate::types::task::{CollectionTask, ResultData, SnapshotObservation};

    struct NoopExecutor;

    #[async_trait]
    impl TaskExecutor for NoopExecutor {
        async fn execute(&self, _task: &CollectionTask) -> Result<ResultData, CollectError> {
            Ok(ResultData::Snapshot(SnapshotObservation {
                balance: U256::from(1u64),
                effective_balance: 1,
                is_online: true,
                head_vote: None,
                source_vote: None,
                target_vote: None,
                inclusion_delay: None,
            }))
        }
    }

    fn test_engine(
        store: Arc<MockSnapshotStore>,
    ) -> Arc<CollectionEngine<NoopExecutor>> {
        let beacon = Arc::new(
            BeaconClient::with_config("http://127.0.0.1:9", BeaconConfig::default())
                .expect("client creation failed"),
        );

        Arc::new(CollectionEngine::new(
            CollectorConfig {
                collection_interval: Duration::from_secs(600),
                batch_size: 10,
                flush_interval: Duration::from_secs(60),
                cache_ttl: Duration::from_secs(60),
                pool_shutdown_timeout: Duration::from_secs(2),
            },
            WorkerPool::new(
                PoolConfig {
                    workers: 2,
                    queue_size: 16,
                    max_retries: 0,
                    retry_delay: Duration::from_millis(10),
                    task_timeout: Duration::from_secs(5),
                },
                NoopExecutor,
            ),
            beacon,
            Arc::new(StaticValidatorRepository::new(vec![1, 2])),
            store as Arc<dyn SnapshotStore>,
            Arc::new(MetricsRegistry::new()),
        ))
    }

    #[tokio::test]
    async fn initiate_is_idempotent_and_cancels_root() {
        let manager = ShutdownManager::new(Duration::from_secs(5));
        let child = manager.root_token().child_token();

        assert!(!manager.is_initiated());
        manager.initiate_shutdown();
        manager.initiate_shutdown();
        assert!(manager.is_initiated());
        assert!(child.is_cancelled(), "root cancellation must cascade");
    }

    #[tokio::test]
    async fn phases_flush_and_close_sinks() {
        let store = Arc::new(MockSnapshotStore::new());
        let cache = Arc::new(MockSnapshotCache::new());
        let engine = test_engine(Arc::clone(&store));

        Arc::clone(&engine).start().await.expect("start failed");
        // Let the single tick's results reach the aggregator buffer.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let manager = ShutdownManager::new(Duration::from_secs(10));
        let clean = manager
            .run_phases(&engine, store.as_ref(), Some(cache.as_ref() as &dyn SnapshotCache))
            .await;

        assert!(clean);
        // Final flush landed before the store closed.
        assert_eq!(store.snapshot_count(), 2);
        assert!(store.is_closed());
        assert!(cache.is_closed());
    }

    #[tokio::test]
    async fn phase_failure_does_not_abort_later_phases() {
        let store = Arc::new(MockSnapshotStore::new());
        let cache = Arc::new(MockSnapshotCache::new());
        let engine = test_engine(Arc::clone(&store));
        Arc::clone(&engine).start().await.expect("start failed");

        // Closing the store will succeed, but inserts fail: the final
        // flush errors in phase 3, and phases 4-5 still run.
        store.set_should_fail(true);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let manager = ShutdownManager::new(Duration::from_secs(10));
        let clean = manager
            .run_phases(&engine, store.as_ref(), Some(cache.as_ref() as &dyn SnapshotCache))
            .await;

        assert!(clean, "sink close phases succeeded");
        assert!(store.is_closed());
        assert!(cache.is_closed());
    }

    #[tokio::test]
    async fn wait_observes_completion() {
        let store = Arc::new(MockSnapshotStore::new());
        let engine = test_engine(Arc::clone(&store));
        Arc::clone(&engine).start().await.expect("start failed");

        let manager = ShutdownManager::new(Duration::from_secs(10));
        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait().await })
        };

        manager.run_phases(&engine, store.as_ref(), None).await;

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait must resolve after run_phases")
            .expect("waiter panicked");

        // Late waiters resolve immediately.
        tokio::time::timeout(Duration::from_secs(1), manager.wait())
            .await
            .expect("late wait must resolve immediately");
    }
}

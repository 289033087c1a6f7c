//! The collection engine: periodic fan-out, result aggregation, commit.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                          CollectionEngine                              │
//! │                                                                        │
//! │  tick loop ──▶ per-validator tasks ──▶ WorkerPool ──▶ result channel   │
//! │      ▲                                                     │           │
//! │      │ every collection_interval                           ▼           │
//! │      │                                              aggregator         │
//! │  head subscriber (SSE, 5s reconnect)                 │  batches        │
//! │                                                      ▼                 │
//! │                                  ┌─────────┬──────────┬────────────┐   │
//! │                                  │  Store  │  Cache   │ Broadcaster│   │
//! │                                  │ (batch) │ (latest) │  (events)  │   │
//! │                                  └─────────┴──────────┴────────────┘   │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Commit semantics
//!
//! A batch commits when it reaches `batch_size`, when the fallback flush
//! timer fires with a non-empty buffer, or on shutdown (final flush). The
//! store insert is all-or-nothing: on failure the whole batch is dropped
//! and counted - the upstream can simply be re-queried next tick. Cache
//! and broadcast writes are best-effort and never fail a commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use beacon_api::BeaconClient;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::collector::head_subscriber;
use crate::collector::worker_pool::{SubmitError, TaskExecutor, WorkerPool};
use crate::error::{ErrorKind, MonitorError, Result};
use crate::metrics::MetricsRegistry;
use crate::ports::broadcast::EventBroadcaster;
use crate::ports::cache::{SnapshotCache, latest_snapshot_key};
use crate::ports::store::{SnapshotStore, effectiveness_score};
use crate::ports::validators::ValidatorRepository;
use crate::types::events::MonitorEvent;
use crate::types::snapshot::{AttestationMetrics, ValidatorSnapshot};
use crate::types::task::{CollectionTask, ResultData, SnapshotObservation, TaskResult, TaskType};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Pause between submit batches, relieving queue pressure.
const BATCH_PAUSE: Duration = Duration::from_millis(10);

/// Wait before re-subscribing after the head stream closes.
const HEAD_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG & STATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collection engine parameters.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Time between ticks.
    ///
    /// Default: 12 seconds (one beacon slot).
    pub collection_interval: Duration,

    /// Snapshots per committed batch, and validators per submit burst.
    ///
    /// Default: 100.
    pub batch_size: usize,

    /// Fallback flush period for partially filled buffers.
    ///
    /// Default: 2 seconds.
    pub flush_interval: Duration,

    /// TTL for latest-snapshot cache entries.
    ///
    /// Default: 60 seconds.
    pub cache_ttl: Duration,

    /// Deadline handed to the pool during engine stop.
    ///
    /// Default: 30 seconds.
    pub pool_shutdown_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(12),
            batch_size: 100,
            flush_interval: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(60),
            pool_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl CollectorConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Config`] for zero intervals or batch size.
    pub fn validate(&self) -> Result<()> {
        if self.collection_interval.is_zero() {
            return Err(MonitorError::Config(
                "collector.collection_interval must be non-zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(MonitorError::Config(
                "collector.batch_size must be non-zero".into(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(MonitorError::Config(
                "collector.flush_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time engine state, consumed by the health checker.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// When the last tick fanned out (None before the first tick).
    pub last_collection_at: Option<DateTime<Utc>>,
    /// Engine-level errors: rejected submits, failed results, dropped
    /// batches, failed sink writes.
    pub errors_count: u64,
    /// Per-validator collections attempted (successful + failed).
    pub collections_count: u64,
    /// Tasks waiting in the pool queue.
    pub queue_depth: usize,
    /// Size of the monitored set.
    pub validators_monitored: usize,
    /// Latest head slot seen by the subscriber (0 before the first event).
    pub current_head_slot: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Coordinates the collect → aggregate → commit cycle.
///
/// Startup loads the monitored set, starts the pool, and spawns three
/// long-lived fibers: the tick loop, the result aggregator, and the head
/// subscriber. All three select on the engine's cancellation token;
/// [`stop`](Self::stop) trips it and drains.
pub struct CollectionEngine<E> {
    config: CollectorConfig,
    pool: Arc<WorkerPool<E>>,
    beacon: Arc<BeaconClient>,
    repository: Arc<dyn ValidatorRepository>,
    store: Arc<dyn SnapshotStore>,
    cache: Option<Arc<dyn SnapshotCache>>,
    broadcaster: Option<Arc<dyn EventBroadcaster>>,
    metrics: Arc<MetricsRegistry>,

    /// Monitored validator indices; mutations serialize on this lock and
    /// each tick snapshots the list under the read side.
    monitored: RwLock<Vec<u64>>,
    errors: AtomicU64,
    ticks: AtomicU64,
    last_collection_ms: AtomicI64,
    head_slot: Arc<AtomicU64>,
    started: AtomicBool,
    cancel: CancellationToken,
    fibers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<E> std::fmt::Debug for CollectionEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEngine")
            .field("config", &self.config)
            .field("monitored", &self.monitored.read().len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<E: TaskExecutor> CollectionEngine<E> {
    /// Create an engine over its collaborators.
    #[must_use]
    pub fn new(
        config: CollectorConfig,
        pool: WorkerPool<E>,
        beacon: Arc<BeaconClient>,
        repository: Arc<dyn ValidatorRepository>,
        store: Arc<dyn SnapshotStore>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            pool: Arc::new(pool),
            beacon,
            repository,
            store,
            cache: None,
            broadcaster: None,
            metrics,
            monitored: RwLock::new(Vec::new()),
            errors: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            last_collection_ms: AtomicI64::new(0),
            head_slot: Arc::new(AtomicU64::new(0)),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            fibers: Mutex::new(Vec::new()),
        }
    }

    /// Attach the latest-snapshot cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach the live-event broadcaster.
    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn EventBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Derive the engine context from a parent token, so cancelling the
    /// root cascades into the engine and its pool.
    #[must_use]
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// The engine's metrics registry.
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // LIFECYCLE
    // ───────────────────────────────────────────────────────────────────────────

    /// Load the monitored set, start the pool, spawn the engine fibers.
    ///
    /// # Errors
    ///
    /// Fatal startup errors only: the validator repository failing, or
    /// the pool's result channel already taken.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Engine start ignored: already started");
            return Ok(());
        }

        let indices = self.repository.load_monitored().await?;
        info!(validators = indices.len(), "Loaded monitored validator set");
        *self.monitored.write() = indices;

        self.pool.start();
        self.metrics.set_worker_count(self.pool.config().workers);

        let results = self.pool.results().ok_or_else(|| {
            MonitorError::Initialization("pool result channel already taken".into())
        })?;

        let mut fibers = self.fibers.lock();
        fibers.push(tokio::spawn(Arc::clone(&self).tick_loop()));
        fibers.push(tokio::spawn(Arc::clone(&self).aggregator_loop(results)));
        fibers.push(tokio::spawn(head_subscriber::run(
            Arc::clone(&self.beacon),
            self.cancel.child_token(),
            Arc::clone(&self.head_slot),
            Arc::clone(&self.metrics),
            self.broadcaster.clone(),
            HEAD_RESUBSCRIBE_DELAY,
        )));

        info!(
            interval = ?self.config.collection_interval,
            batch_size = self.config.batch_size,
            "Collection engine started"
        );
        Ok(())
    }

    /// Cancel the engine context, drain the pool, join the fibers.
    ///
    /// The aggregator performs its final flush before exiting, so
    /// buffered snapshots reach the store.
    pub async fn stop(&self) {
        info!("Stopping collection engine");
        self.cancel.cancel();

        if let Err(e) = self.pool.shutdown(self.config.pool_shutdown_timeout).await {
            warn!(error = %e, "Pool drain did not finish cleanly");
        }

        let fibers: Vec<_> = self.fibers.lock().drain(..).collect();
        for fiber in fibers {
            if let Err(e) = fiber.await {
                warn!(error = %e, "Engine fiber panicked");
            }
        }
        info!("Collection engine stopped");
    }

    // ───────────────────────────────────────────────────────────────────────────
    // MONITORED SET MUTATIONS
    // ───────────────────────────────────────────────────────────────────────────

    /// Add a validator to the monitored set.
    ///
    /// Duplicates are rejected silently. The running tick keeps the
    /// snapshot it took at its start.
    pub fn add_validator(&self, index: u64) -> bool {
        let mut monitored = self.monitored.write();
        if monitored.contains(&index) {
            return false;
        }
        monitored.push(index);
        debug!(validator = index, "Validator added to monitored set");
        true
    }

    /// Remove a validator from the monitored set.
    pub fn remove_validator(&self, index: u64) -> bool {
        let mut monitored = self.monitored.write();
        let Some(position) = monitored.iter().position(|&i| i == index) else {
            return false;
        };
        monitored.remove(position);
        debug!(validator = index, "Validator removed from monitored set");
        true
    }

    /// Current engine state for the health checker.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let last_ms = self.last_collection_ms.load(Ordering::Relaxed);
        let metrics = self.metrics.snapshot();

        EngineStats {
            last_collection_at: (last_ms > 0).then(|| DateTime::from_timestamp_millis(last_ms)).flatten(),
            errors_count: self.errors.load(Ordering::Relaxed),
            collections_count: metrics.collections_total,
            queue_depth: self.pool.stats().queue_depth,
            validators_monitored: self.monitored.read().len(),
            current_head_slot: self.head_slot.load(Ordering::Relaxed),
        }
    }

    /// Ticks completed since start.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // TICK LOOP
    // ───────────────────────────────────────────────────────────────────────────

    async fn tick_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.collection_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("Tick loop stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            self.run_tick().await;
        }
    }

    /// Fan one tick out into per-validator snapshot tasks.
    #[instrument(skip(self))]
    async fn run_tick(&self) {
        // Snapshot the set under the read lock, then release it; late
        // mutations wait for the next tick.
        let indices: Vec<u64> = self.monitored.read().clone();
        let deadline = Instant::now() + self.config.collection_interval;

        debug!(validators = indices.len(), "Tick fan-out");
        let mut submitted = 0usize;

        'batches: for batch in indices.chunks(self.config.batch_size) {
            for &index in batch {
                let task = CollectionTask::new(TaskType::Snapshot, index, deadline);
                match self.pool.submit(task) {
                    Ok(()) => submitted += 1,
                    Err(SubmitError::QueueFull) => {
                        self.errors.fetch_add(1, Ordering::Relaxed);
                        self.metrics.record_error(ErrorKind::QueueFull.tag());
                        warn!(validator = index, "Task queue full; skipping validator");
                    }
                    Err(SubmitError::ShuttingDown) => {
                        self.errors.fetch_add(1, Ordering::Relaxed);
                        debug!("Pool shutting down; abandoning tick");
                        break 'batches;
                    }
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(BATCH_PAUSE) => {}
            }
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_collection_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.metrics.set_queue_depth(self.pool.stats().queue_depth);

        debug!(submitted, "Tick complete");
    }

    // ───────────────────────────────────────────────────────────────────────────
    // RESULT AGGREGATOR
    // ───────────────────────────────────────────────────────────────────────────

    async fn aggregator_loop(self: Arc<Self>, mut results: mpsc::Receiver<TaskResult>) {
        let mut buffer: Vec<ValidatorSnapshot> = Vec::with_capacity(self.config.batch_size);
        let mut flush = tokio::time::interval(self.config.flush_interval);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    // Drain whatever already arrived, then flush the rest.
                    while let Ok(result) = results.try_recv() {
                        self.absorb(result, &mut buffer);
                        if buffer.len() >= self.config.batch_size {
                            self.commit(&mut buffer).await;
                        }
                    }
                    if !buffer.is_empty() {
                        self.commit(&mut buffer).await;
                    }
                    debug!("Aggregator stopping");
                    return;
                }

                maybe = results.recv() => {
                    let Some(result) = maybe else {
                        if !buffer.is_empty() {
                            self.commit(&mut buffer).await;
                        }
                        debug!("Result channel closed; aggregator stopping");
                        return;
                    };

                    self.absorb(result, &mut buffer);
                    if buffer.len() >= self.config.batch_size {
                        self.commit(&mut buffer).await;
                    }
                }

                _ = flush.tick() => {
                    if !buffer.is_empty() {
                        debug!(buffered = buffer.len(), "Fallback flush");
                        self.commit(&mut buffer).await;
                    }
                }
            }
        }
    }

    /// Fold one result into the buffer, recording metrics.
    fn absorb(&self, result: TaskResult, buffer: &mut Vec<ValidatorSnapshot>) {
        self.metrics.record_latency(result.duration);
        self.metrics.add_validators_processed(1);

        if let Some(task_error) = &result.error {
            self.errors.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_collection(false);
            self.metrics.record_error(task_error.kind.tag());
            if task_error.kind == ErrorKind::RateLimited {
                self.metrics.record_rate_limit_hit();
            }
            debug!(
                task = %result.task_id,
                validator = result.validator_index,
                attempts = task_error.attempts,
                error = %task_error.message,
                "Collection failed"
            );
            return;
        }

        self.metrics.record_collection(true);

        match result.data {
            Some(ResultData::Snapshot(observation)) => {
                match build_snapshot(result.validator_index, result.collected_at, &observation) {
                    Ok(snapshot) => buffer.push(snapshot),
                    Err(reason) => {
                        self.errors.fetch_add(1, Ordering::Relaxed);
                        self.metrics.record_error(ErrorKind::ParseError.tag());
                        warn!(
                            validator = result.validator_index,
                            reason = %reason,
                            "Dropping malformed observation"
                        );
                    }
                }
            }
            Some(_) => {
                // Non-snapshot payloads (balance probes, duty checks) are
                // not part of the snapshot time series.
                debug!(task = %result.task_id, "Non-snapshot result consumed");
            }
            None => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(task = %result.task_id, "Success result without payload");
            }
        }
    }

    /// Commit the buffered batch: store, then cache, then broadcast.
    async fn commit(&self, buffer: &mut Vec<ValidatorSnapshot>) {
        let batch = std::mem::take(buffer);
        let batch_len = batch.len();

        // Store first; on failure the whole batch is dropped. The beacon
        // can be re-queried next tick, so data loss beats storing a
        // partial or corrupt batch.
        if let Err(e) = self.store.insert_batch(&batch).await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_error(ErrorKind::SinkError.tag());
            error!(batch_size = batch_len, error = %e, "Batch insert failed; dropping batch");
            return;
        }

        let bytes: usize = batch.iter().map(ValidatorSnapshot::encoded_len).sum();
        self.metrics.add_snapshots_stored(batch_len as u64);
        self.metrics.add_bytes_stored(bytes as u64);

        if let Some(cache) = &self.cache {
            let entries: HashMap<String, ValidatorSnapshot> = batch
                .iter()
                .map(|snapshot| (latest_snapshot_key(snapshot.validator_index), snapshot.clone()))
                .collect();

            if let Err(e) = cache.batch_set(entries, self.config.cache_ttl).await {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_error("cache_write");
                warn!(error = %e, "Cache update failed; continuing");
            }
        }

        if let Some(broadcaster) = &self.broadcaster {
            for snapshot in &batch {
                if let Err(e) = broadcaster.broadcast(MonitorEvent::metrics_update(snapshot)).await
                {
                    self.metrics.record_error("broadcast");
                    debug!(error = %e, "Broadcast failed; continuing");
                    break;
                }
            }
        }

        self.metrics.set_queue_depth(self.pool.stats().queue_depth);
        debug!(batch_size = batch_len, "Batch committed");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORD → SNAPSHOT CONVERSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Convert a snapshot observation into a committed snapshot.
///
/// Attestation fields violating the invariants (inclusion delay below 1)
/// are treated as absent rather than poisoning the snapshot. The
/// effectiveness is derived only when all three votes and the delay are
/// present.
fn build_snapshot(
    validator_index: u64,
    collected_at: DateTime<Utc>,
    observation: &SnapshotObservation,
) -> std::result::Result<ValidatorSnapshot, String> {
    let balance = u64::try_from(observation.balance)
        .ok()
        .and_then(|gwei| i64::try_from(gwei).ok())
        .ok_or_else(|| format!("balance {} exceeds i64 gwei range", observation.balance))?;

    let effective_balance = i64::try_from(observation.effective_balance)
        .map_err(|_| format!("effective balance {} exceeds i64", observation.effective_balance))?;

    let inclusion_delay = observation.inclusion_delay.filter(|delay| *delay >= 1);

    let effectiveness = match (
        observation.head_vote,
        observation.source_vote,
        observation.target_vote,
        inclusion_delay,
    ) {
        (Some(head), Some(source), Some(target), Some(delay)) => {
            Some(effectiveness_score(head, source, target, delay))
        }
        _ => None,
    };

    let snapshot = ValidatorSnapshot {
        time: collected_at,
        validator_index,
        balance,
        effective_balance,
        is_online: observation.is_online,
        attestation: AttestationMetrics {
            head_vote: observation.head_vote,
            source_vote: observation.source_vote,
            target_vote: observation.target_vote,
            inclusion_delay,
            effectiveness,
        },
    };

    snapshot.validate()?;
    Ok(snapshot)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

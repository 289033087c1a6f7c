//! Bounded worker pool executing collection tasks.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          WorkerPool                               │
//! │                                                                   │
//! │  submit() ──▶ bounded task channel ──▶ worker fibers (N)          │
//! │                 (capacity queue_size)    │  per-task timeout      │
//! │                                          │  linear retries        │
//! │                                          ▼                        │
//! │                              bounded result channel ──▶ results() │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # State machine
//!
//! `Created → Started → Draining → Stopped`. [`WorkerPool::start`] is
//! idempotent on first call; [`WorkerPool::shutdown`] closes admission,
//! drains workers under a deadline, then cancels stragglers.
//!
//! # Guarantees
//!
//! - [`WorkerPool::submit`] never blocks: a full queue returns
//!   [`SubmitError::QueueFull`] immediately
//! - Every admitted task produces exactly one [`TaskResult`] on the
//!   result channel, unless the pool is shut down first
//! - Retries are internal: `Transient`, `Timeout` and `Cancelled` errors
//!   re-attempt with a linear `retry_delay * k` wait; everything else is
//!   terminal

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CollectError, MonitorError};
use crate::types::task::{CollectionTask, ResultData, TaskResult};

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG & CONTRACTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Worker pool parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker fibers to spawn.
    ///
    /// Default: 10.
    pub workers: usize,

    /// Task channel capacity; admission beyond it returns `QueueFull`.
    ///
    /// Default: 1000.
    pub queue_size: usize,

    /// Retry attempts on top of the initial attempt.
    ///
    /// Default: 3.
    pub max_retries: u32,

    /// Base wait between attempts; the wait before retry `k` is
    /// `retry_delay * k`.
    ///
    /// Default: 2 seconds.
    pub retry_delay: Duration,

    /// Deadline applied to each execution attempt.
    ///
    /// Default: 30 seconds.
    pub task_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_size: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            task_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Config`] if workers or queue size are zero.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.workers == 0 {
            return Err(MonitorError::Config("pool.workers must be non-zero".into()));
        }
        if self.queue_size == 0 {
            return Err(MonitorError::Config(
                "pool.queue_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Executes one task against the upstream.
///
/// The pool owns timeout and retry policy; executors perform a single
/// attempt and classify failures via [`CollectError`].
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Perform one attempt of the task.
    ///
    /// # Errors
    ///
    /// Returns a [`CollectError`]; retryable kinds trigger another
    /// attempt.
    async fn execute(&self, task: &CollectionTask) -> Result<ResultData, CollectError>;
}

/// Pool lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Built, not yet running; admission is allowed.
    Created,
    /// Workers are consuming tasks.
    Started,
    /// Admission closed, workers draining the queue.
    Draining,
    /// Fully stopped.
    Stopped,
}

/// Admission failure from [`WorkerPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The task queue is at capacity.
    #[error("task queue is full")]
    QueueFull,
    /// The pool no longer accepts work.
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Failure from [`WorkerPool::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// Workers did not drain before the deadline; in-flight tasks were
    /// abandoned to cancellation and their results are lost.
    #[error("shutdown deadline exceeded")]
    TimeoutExceeded,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Tasks completed successfully.
    pub processed: u64,
    /// Tasks that ended in a terminal error.
    pub failed: u64,
    /// Workers currently executing a task.
    pub active_workers: usize,
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Results waiting to be consumed.
    pub result_queue_depth: usize,
}

/// Counters shared between the pool handle and its worker fibers.
#[derive(Debug, Default)]
struct PoolCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    active_workers: AtomicUsize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WORKER POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded pool of task-executing worker fibers.
#[derive(Debug)]
pub struct WorkerPool<E> {
    config: PoolConfig,
    executor: Arc<E>,

    state: Mutex<PoolState>,
    /// Sender side of the task channel; dropped to close admission.
    task_tx: Mutex<Option<mpsc::Sender<CollectionTask>>>,
    /// Receiver side, shared by all workers; taken by `start`.
    task_rx: Mutex<Option<Arc<tokio::sync::Mutex<mpsc::Receiver<CollectionTask>>>>>,
    /// Pool's own clone of the result sender; dropped at shutdown so the
    /// result channel closes once workers exit.
    result_tx: Mutex<Option<mpsc::Sender<TaskResult>>>,
    /// Receiver handed out once by `results`.
    result_rx: Mutex<Option<mpsc::Receiver<TaskResult>>>,
    /// Worker join handles.
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    /// Pool context; cancelling it abandons in-flight work.
    cancel: CancellationToken,
    counters: Arc<PoolCounters>,
}

impl<E: TaskExecutor> WorkerPool<E> {
    /// Create a pool in the `Created` state.
    #[must_use]
    pub fn new(config: PoolConfig, executor: E) -> Self {
        Self::with_cancellation(config, executor, CancellationToken::new())
    }

    /// Create a pool whose context is a child of the given token.
    #[must_use]
    pub fn with_cancellation(config: PoolConfig, executor: E, parent: CancellationToken) -> Self {
        let (task_tx, task_rx) = mpsc::channel(config.queue_size);
        let (result_tx, result_rx) = mpsc::channel(config.queue_size);

        Self {
            config,
            executor: Arc::new(executor),
            state: Mutex::new(PoolState::Created),
            task_tx: Mutex::new(Some(task_tx)),
            task_rx: Mutex::new(Some(Arc::new(tokio::sync::Mutex::new(task_rx)))),
            result_tx: Mutex::new(Some(result_tx)),
            result_rx: Mutex::new(Some(result_rx)),
            handles: Mutex::new(Vec::new()),
            cancel: parent.child_token(),
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }

    /// Spawn the worker fibers.
    ///
    /// Idempotent on first call: later calls (and calls after shutdown)
    /// are no-ops.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if *state != PoolState::Created {
            debug!(state = ?*state, "Pool start ignored");
            return;
        }

        let Some(shared_rx) = self.task_rx.lock().take() else {
            return;
        };
        let Some(result_tx) = self.result_tx.lock().as_ref().cloned() else {
            return;
        };

        let mut handles = self.handles.lock();
        for worker_id in 0..self.config.workers {
            handles.push(tokio::spawn(worker_loop(WorkerContext {
                worker_id,
                shared_rx: Arc::clone(&shared_rx),
                result_tx: result_tx.clone(),
                executor: Arc::clone(&self.executor),
                config: self.config.clone(),
                cancel: self.cancel.clone(),
                counters: Arc::clone(&self.counters),
            })));
        }

        *state = PoolState::Started;
        info!(
            workers = self.config.workers,
            queue = self.config.queue_size,
            "Worker pool started"
        );
    }

    /// Submit a task without blocking.
    ///
    /// # Errors
    ///
    /// [`SubmitError::QueueFull`] when the queue is at capacity;
    /// [`SubmitError::ShuttingDown`] once draining has begun.
    pub fn submit(&self, task: CollectionTask) -> Result<(), SubmitError> {
        if matches!(self.state(), PoolState::Draining | PoolState::Stopped) {
            return Err(SubmitError::ShuttingDown);
        }

        let guard = self.task_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(SubmitError::ShuttingDown);
        };

        match tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SubmitError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::ShuttingDown),
        }
    }

    /// Take the result receiver. Returns `None` after the first call.
    #[must_use]
    pub fn results(&self) -> Option<mpsc::Receiver<TaskResult>> {
        self.result_rx.lock().take()
    }

    /// Drain and stop the pool.
    ///
    /// Closes the task channel (stopping admission), waits up to
    /// `timeout` for workers to finish the queued work, then cancels the
    /// pool context and closes the result channel.
    ///
    /// # Errors
    ///
    /// [`ShutdownError::TimeoutExceeded`] if workers were still in flight
    /// at the deadline; they are abandoned to cancellation and their
    /// results are lost.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        {
            let mut state = self.state.lock();
            if matches!(*state, PoolState::Stopped) {
                return Ok(());
            }
            *state = PoolState::Draining;
        }
        info!("Worker pool draining");

        // Closing the task channel lets workers drain the queue and exit.
        self.task_tx.lock().take();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let drained = tokio::time::timeout(timeout, join_all(handles)).await;

        self.cancel.cancel();
        self.result_tx.lock().take();
        *self.state.lock() = PoolState::Stopped;

        match drained {
            Ok(_) => {
                info!("Worker pool stopped");
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, "Worker pool drain timed out; abandoning in-flight tasks");
                Err(ShutdownError::TimeoutExceeded)
            }
        }
    }

    /// Point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let queue_depth = self
            .task_tx
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity());
        let result_queue_depth = self
            .result_tx
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity());

        PoolStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            active_workers: self.counters.active_workers.load(Ordering::Relaxed),
            queue_depth,
            result_queue_depth,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WORKER LOOP
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything one worker fiber needs.
struct WorkerContext<E> {
    worker_id: usize,
    shared_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<CollectionTask>>>,
    result_tx: mpsc::Sender<TaskResult>,
    executor: Arc<E>,
    config: PoolConfig,
    cancel: CancellationToken,
    counters: Arc<PoolCounters>,
}

async fn worker_loop<E: TaskExecutor>(ctx: WorkerContext<E>) {
    debug!(worker = ctx.worker_id, "Worker started");

    loop {
        // Hold the receiver lock only while waiting for a task so other
        // workers can pull as soon as this one starts executing.
        let task = {
            let mut rx = ctx.shared_rx.lock().await;
            tokio::select! {
                () = ctx.cancel.cancelled() => None,
                task = rx.recv() => task,
            }
        };

        let Some(task) = task else {
            debug!(worker = ctx.worker_id, "Worker exiting");
            return;
        };

        ctx.counters.active_workers.fetch_add(1, Ordering::Relaxed);
        let result = execute_with_retries(&ctx, &task).await;
        ctx.counters.active_workers.fetch_sub(1, Ordering::Relaxed);

        if result.is_success() {
            ctx.counters.processed.fetch_add(1, Ordering::Relaxed);
        } else {
            ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
        }

        tokio::select! {
            () = ctx.cancel.cancelled() => {
                // Result lost; acceptable under cancellation.
                return;
            }
            sent = ctx.result_tx.send(result) => {
                if sent.is_err() {
                    debug!(worker = ctx.worker_id, "Result channel closed");
                    return;
                }
            }
        }
    }
}

/// Execute one task with deadline fail-fast, per-attempt timeout and
/// linear retry waits.
async fn execute_with_retries<E: TaskExecutor>(
    ctx: &WorkerContext<E>,
    task: &CollectionTask,
) -> TaskResult {
    let started = Instant::now();

    if task.deadline <= Instant::now() {
        return TaskResult::failure(task, &CollectError::DeadlineExpired, 0, started.elapsed());
    }

    let mut last_error = CollectError::Cancelled;
    let mut attempts = 0u32;

    for retry in 0..=ctx.config.max_retries {
        if retry > 0 {
            let wait = ctx.config.retry_delay * retry;
            tokio::select! {
                () = ctx.cancel.cancelled() => {
                    return TaskResult::failure(task, &CollectError::Cancelled, attempts, started.elapsed());
                }
                () = tokio::time::sleep(wait) => {}
            }
        }

        attempts += 1;
        let attempt = tokio::select! {
            () = ctx.cancel.cancelled() => {
                return TaskResult::failure(task, &CollectError::Cancelled, attempts, started.elapsed());
            }
            attempt = tokio::time::timeout(ctx.config.task_timeout, ctx.executor.execute(task)) => attempt,
        };

        match attempt {
            Ok(Ok(data)) => return TaskResult::success(task, data, started.elapsed()),
            Ok(Err(e)) => last_error = e,
            Err(_) => last_error = CollectError::TaskTimeout(ctx.config.task_timeout),
        }

        if !last_error.is_retryable() {
            break;
        }
        debug!(task = %task.id, retry, error = %last_error, "Task attempt failed; retrying");
    }

    TaskResult::failure(task, &last_error, attempts, started.elapsed())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use beacon_api::BeaconError;

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::task::TaskType;

    /// Scripted executor: fails with transient errors `failures` times
    /// per task, then succeeds; optionally sleeps to simulate slow work.
    struct ScriptedExecutor {
        failures: u32,
        calls: AtomicU32,
        delay: Duration,
        terminal: bool,
    }

    impl ScriptedExecutor {
        fn succeeding() -> Self {
            Self {
                failures: 0,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                terminal: false,
            }
        }

        fn failing_then_ok(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                terminal: false,
            }
        }

        fn terminal() -> Self {
            Self {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                terminal: true,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                failures: 0,
                calls: AtomicU32::new(0),
                delay,
                terminal: false,
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn execute(&self, task: &CollectionTask) -> Result<ResultData, CollectError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.terminal {
                    return Err(CollectError::Beacon(BeaconError::NotFound(
                        task.validator_index.to_string(),
                    )));
                }
                return Err(CollectError::Beacon(BeaconError::Connection(
                    "refused".into(),
                )));
            }

            Ok(ResultData::Balance(alloy::primitives::U256::from(
                32_000_000_000_u64,
            )))
        }
    }

    fn task(index: u64) -> CollectionTask {
        CollectionTask::new(
            TaskType::Balance,
            index,
            Instant::now() + Duration::from_secs(60),
        )
    }

    fn fast_pool(workers: usize, queue: usize, executor: ScriptedExecutor) -> WorkerPool<ScriptedExecutor> {
        WorkerPool::new(
            PoolConfig {
                workers,
                queue_size: queue,
                max_retries: 3,
                retry_delay: Duration::from_millis(10),
                task_timeout: Duration::from_millis(500),
            },
            executor,
        )
    }

    #[tokio::test]
    async fn every_submitted_task_yields_exactly_one_result() {
        let pool = fast_pool(4, 100, ScriptedExecutor::succeeding());
        let mut results = pool.results().expect("results taken once");
        pool.start();

        for index in 0..20 {
            pool.submit(task(index)).expect("submit failed");
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
                .await
                .expect("result timed out")
                .expect("channel closed early");
            assert!(result.is_success());
            assert!(seen.insert(result.task_id.clone()), "duplicate result");
        }

        assert_eq!(pool.stats().processed, 20);
        assert_eq!(pool.stats().failed, 0);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let pool = fast_pool(2, 10, ScriptedExecutor::succeeding());
        pool.start();
        pool.start();
        assert_eq!(pool.state(), PoolState::Started);
        // Only the first start spawned workers.
        assert_eq!(pool.handles.lock().len(), 2);

        pool.shutdown(Duration::from_secs(1)).await.expect("shutdown failed");
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        // Not started: nothing drains the queue, so capacity is exact.
        let pool = fast_pool(1, 2, ScriptedExecutor::succeeding());

        let mut accepted = 0;
        let mut rejected = 0;
        for index in 0..5 {
            match pool.submit(task(index)) {
                Ok(()) => accepted += 1,
                Err(SubmitError::QueueFull) => rejected += 1,
                Err(SubmitError::ShuttingDown) => unreachable!("pool is not shutting down"),
            }
        }

        assert_eq!(accepted, 2);
        assert_eq!(rejected, 3);
        assert_eq!(pool.stats().queue_depth, 2);
    }

    #[tokio::test]
    async fn retries_transient_errors_with_linear_waits() {
        let pool = fast_pool(1, 10, ScriptedExecutor::failing_then_ok(2));
        let mut results = pool.results().expect("results taken once");
        pool.start();

        let started = Instant::now();
        pool.submit(task(1)).expect("submit failed");

        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("result timed out")
            .expect("channel closed early");

        assert!(result.is_success());
        // Two retries with waits of 10ms and 20ms.
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(result.duration >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn terminal_errors_do_not_retry() {
        let pool = fast_pool(1, 10, ScriptedExecutor::terminal());
        let mut results = pool.results().expect("results taken once");
        pool.start();

        pool.submit(task(9)).expect("submit failed");

        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("result timed out")
            .expect("channel closed early");

        assert!(!result.is_success());
        let error = result.error.expect("failure must carry an error");
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.attempts, 1);
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn task_timeout_is_annotated_with_attempts() {
        let pool = WorkerPool::new(
            PoolConfig {
                workers: 1,
                queue_size: 10,
                max_retries: 1,
                retry_delay: Duration::from_millis(5),
                task_timeout: Duration::from_millis(30),
            },
            ScriptedExecutor::slow(Duration::from_secs(10)),
        );
        let mut results = pool.results().expect("results taken once");
        pool.start();

        pool.submit(task(2)).expect("submit failed");

        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("result timed out")
            .expect("channel closed early");

        let error = result.error.expect("timeout must surface as error");
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.attempts, 2);
    }

    #[tokio::test]
    async fn expired_deadline_fails_fast() {
        let pool = fast_pool(1, 10, ScriptedExecutor::succeeding());
        let mut results = pool.results().expect("results taken once");
        pool.start();

        let expired = CollectionTask::new(TaskType::Snapshot, 3, Instant::now());
        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.submit(expired).expect("submit failed");

        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("result timed out")
            .expect("channel closed early");

        let error = result.error.expect("expired deadline must fail");
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.attempts, 0);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_work() {
        let pool = fast_pool(2, 50, ScriptedExecutor::succeeding());
        let mut results = pool.results().expect("results taken once");
        pool.start();

        for index in 0..10 {
            pool.submit(task(index)).expect("submit failed");
        }

        pool.shutdown(Duration::from_secs(5)).await.expect("drain failed");
        assert_eq!(pool.state(), PoolState::Stopped);
        assert!(pool.submit(task(99)).is_err());

        // All queued results were produced, then the channel closed.
        let mut count = 0;
        while let Some(result) = results.recv().await {
            assert!(result.is_success());
            count += 1;
        }
        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn shutdown_times_out_on_stuck_workers() {
        let pool = WorkerPool::new(
            PoolConfig {
                workers: 1,
                queue_size: 10,
                max_retries: 0,
                retry_delay: Duration::from_millis(5),
                task_timeout: Duration::from_secs(60),
            },
            ScriptedExecutor::slow(Duration::from_secs(60)),
        );
        let _results = pool.results().expect("results taken once");
        pool.start();
        pool.submit(task(1)).expect("submit failed");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = pool.shutdown(Duration::from_millis(100)).await;
        assert_eq!(outcome, Err(ShutdownError::TimeoutExceeded));
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn cancellation_during_retry_backoff_exits_promptly() {
        // Executor always fails transiently; long retry delay keeps the
        // worker inside a backoff wait when cancellation fires.
        let pool = WorkerPool::new(
            PoolConfig {
                workers: 1,
                queue_size: 10,
                max_retries: 3,
                retry_delay: Duration::from_secs(60),
                task_timeout: Duration::from_millis(200),
            },
            ScriptedExecutor::failing_then_ok(u32::MAX),
        );
        let _results = pool.results().expect("results taken once");
        pool.start();
        pool.submit(task(5)).expect("submit failed");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The worker sits in a 60s backoff; cancellation must cut it short.
        let started = Instant::now();
        let outcome = pool.shutdown(Duration::from_millis(500)).await;
        assert!(outcome.is_err(), "worker was parked in backoff at the deadline");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn results_receiver_is_taken_once() {
        let pool = fast_pool(1, 10, ScriptedExecutor::succeeding());
        assert!(pool.results().is_some());
        assert!(pool.results().is_none());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let pool = fast_pool(1, 10, ScriptedExecutor::succeeding());
        pool.start();
        pool.shutdown(Duration::from_secs(1)).await.expect("first shutdown failed");
        pool.shutdown(Duration::from_secs(1)).await.expect("second shutdown failed");
    }
}

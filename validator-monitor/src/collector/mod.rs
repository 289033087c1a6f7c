//! The collection core: engine, worker pool, executor, head subscriber.
//!
//! Data flow:
//!
//! ```text
//! ticker ─▶ CollectionEngine::run_tick ─▶ WorkerPool::submit
//!        ─▶ worker ─▶ SnapshotExecutor (BeaconClient) ─▶ result channel
//!        ─▶ aggregator ─▶ batch ─▶ (SnapshotStore, SnapshotCache, EventBroadcaster)
//! ```
//!
//! Control flow: one cancellation token is the root of life; the engine's
//! [`stop`](engine::CollectionEngine::stop) trips it and drains in order.

pub mod engine;
pub mod executor;
pub(crate) mod head_subscriber;
pub mod worker_pool;

pub use engine::{CollectionEngine, CollectorConfig, EngineStats};
pub use executor::SnapshotExecutor;
pub use worker_pool::{
    PoolConfig, PoolState, PoolStats, ShutdownError, SubmitError, TaskExecutor, WorkerPool,
};

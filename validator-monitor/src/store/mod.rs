//! Bundled in-process sink adapters.
//!
//! These implement the [`crate::ports`] traits for single-process
//! deployments and tests:
//!
//! - [`MemoryStore`] - append-only in-memory snapshot store
//! - [`MokaSnapshotCache`] - TTL-evicting latest-snapshot cache
//! - [`BroadcastHub`] - drop-oldest live event fan-out
//!
//! Durable backends (TimescaleDB, Redis) implement the same ports
//! outside the core.

pub mod broadcast;
pub mod cache;
pub mod memory;

pub use broadcast::BroadcastHub;
pub use cache::MokaSnapshotCache;
pub use memory::MemoryStore;

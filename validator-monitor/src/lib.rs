//! Beacon-chain validator monitoring service.
//!
//! Continuously observes a set of validators and produces a time series
//! of per-validator snapshots (balance, effective balance, attestation
//! effectiveness, liveness). Upstream it consumes a beacon node's HTTP
//! and SSE APIs; downstream it persists batched snapshots to a store,
//! caches the freshest record per validator, and broadcasts updates to
//! live subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        COLLECTION ENGINE                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │  Tick Loop   │─▶│  WorkerPool  │─▶│  Aggregator  │           │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘           │
//! │  ┌──────────────┐                           │                   │
//! │  │    Head      │          ┌────────────────┼───────────────┐   │
//! │  │  Subscriber  │          ▼                ▼               ▼   │
//! │  └──────────────┘   ┌──────────────┐  ┌──────────┐  ┌─────────┐ │
//! │                     │    Store     │  │  Cache   │  │Broadcast│ │
//! │                     └──────────────┘  └──────────┘  └─────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] - Domain types (tasks, results, snapshots, events)
//! - [`error`] - Layered error types
//! - [`config`] - Configuration loading and validation
//! - [`collector`] - Engine, worker pool, executor, head subscriber
//! - [`ports`] - Sink and source interfaces
//! - [`store`] - Bundled in-process sink adapters
//! - [`metrics`] - Lock-free metrics registry
//! - [`recovery`] - Circuit breaking and retry-with-backoff
//! - [`health`] - Threshold-based health verdicts
//! - [`shutdown`] - Signal capture and phased shutdown

pub mod collector;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod ports;
pub mod recovery;
pub mod shutdown;
pub mod store;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert!(version().starts_with("0."));
    }
}

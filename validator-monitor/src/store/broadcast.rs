//! In-process event fan-out with drop-oldest back-pressure.
//!
//! [`BroadcastHub`] implements the [`EventBroadcaster`] port over
//! `tokio::sync::broadcast`: every subscriber has a bounded view of a
//! shared ring, and a slow subscriber loses the *oldest* events (surfaced
//! to it as a `Lagged` error) instead of ever blocking the aggregator.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::Result;
use crate::ports::broadcast::EventBroadcaster;
use crate::types::events::MonitorEvent;

/// Default per-subscriber ring capacity.
const DEFAULT_CAPACITY: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// BROADCAST HUB
// ═══════════════════════════════════════════════════════════════════════════════

/// Fan-out hub for live monitor events.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastHub {
    /// Create a hub with the given ring capacity per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Open a new subscription.
    ///
    /// The receiver observes every event from this point on; if it falls
    /// more than the ring capacity behind, the oldest events are dropped
    /// and the receiver sees a `Lagged` error before resuming.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Current subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventBroadcaster for BroadcastHub {
    async fn broadcast(&self, event: MonitorEvent) -> Result<()> {
        // No subscribers is not an error; events are simply not retained.
        match self.tx.send(event) {
            Ok(receivers) => trace!(receivers, "Event broadcast"),
            Err(_) => trace!("Event dropped: no subscribers"),
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

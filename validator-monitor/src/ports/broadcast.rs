//! Broadcast port for live event fan-out.
//!
//! Defines the contract for pushing events to live subscribers
//! (WebSocket API, alerting pipelines). The aggregator fire-and-forgets
//! through this trait; a failing broadcaster never blocks a commit.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::events::MonitorEvent;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT BROADCASTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for event fan-out.
///
/// # Back-pressure
///
/// Implementations must not block the caller on slow subscribers: use a
/// bounded per-subscriber queue and drop the oldest events when it fills.
/// The bundled [`BroadcastHub`](crate::store::BroadcastHub) gets this from
/// `tokio::sync::broadcast` ring semantics.
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    /// Publish one event to all current subscribers.
    ///
    /// # Errors
    ///
    /// Returns an error if the fan-out fails; the caller logs and
    /// continues.
    async fn broadcast(&self, event: MonitorEvent) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOCKS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks {
    //! Mock implementations for testing.

    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::{EventBroadcaster, MonitorEvent, Result, async_trait};
    use crate::error::MonitorError;

    /// Mock broadcaster that records published events.
    #[derive(Debug, Default)]
    pub struct MockBroadcaster {
        events: Mutex<Vec<MonitorEvent>>,
        should_fail: AtomicBool,
    }

    impl MockBroadcaster {
        /// Create an empty mock broadcaster.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent broadcasts fail (or succeed again).
        pub fn set_should_fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }

        /// Events published so far.
        #[must_use]
        pub fn events(&self) -> Vec<MonitorEvent> {
            self.events.lock().clone()
        }

        /// Number of events published.
        #[must_use]
        pub fn count(&self) -> usize {
            self.events.lock().len()
        }
    }

    #[async_trait]
    impl EventBroadcaster for MockBroadcaster {
        async fn broadcast(&self, event: MonitorEvent) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(MonitorError::Sink("mock broadcast failure".into()));
            }
            self.events.lock().push(event);
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::mocks::MockBroadcaster;
    use super::*;

    #[tokio::test]
    async fn mock_broadcaster_records_events() {
        let broadcaster = MockBroadcaster::new();
        broadcaster
            .broadcast(MonitorEvent::head_advanced(32, 1))
            .await
            .expect("broadcast failed");

        assert_eq!(broadcaster.count(), 1);
        assert_eq!(broadcaster.events()[0].data["slot"], 32);

        broadcaster.set_should_fail(true);
        assert!(
            broadcaster
                .broadcast(MonitorEvent::head_advanced(33, 1))
                .await
                .is_err()
        );
        assert_eq!(broadcaster.count(), 1);
    }
}

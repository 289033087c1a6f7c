//! Long-lived head-event subscriber with reconnect.
//!
//! Maintains the SSE subscription against the beacon node: on stream
//! close it waits a fixed delay and re-subscribes, indefinitely, until
//! cancelled. Each event updates the shared head-slot gauge and is logged
//! with its derived epoch; when a broadcaster is attached, a
//! `HeadAdvanced` event is published.
//!
//! Head events MAY also trigger out-of-cycle collection for priority
//! validators; that hook is reserved and currently unwired.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use beacon_api::{BeaconClient, HeadEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::MetricsRegistry;
use crate::ports::broadcast::EventBroadcaster;
use crate::types::events::MonitorEvent;

/// Consume the head-event stream until cancellation.
pub(crate) async fn run(
    beacon: Arc<BeaconClient>,
    cancel: CancellationToken,
    head_slot: Arc<AtomicU64>,
    metrics: Arc<MetricsRegistry>,
    broadcaster: Option<Arc<dyn EventBroadcaster>>,
    resubscribe_delay: Duration,
) {
    loop {
        if cancel.is_cancelled() {
            debug!("Head subscriber stopping");
            return;
        }

        match beacon.subscribe_head(cancel.clone()).await {
            Ok(mut stream) => {
                info!("Head event subscription established");

                loop {
                    let maybe = tokio::select! {
                        () = cancel.cancelled() => {
                            debug!("Head subscriber stopping");
                            return;
                        }
                        maybe = stream.next() => maybe,
                    };

                    let Some(event) = maybe else {
                        warn!("Head stream closed; will resubscribe");
                        break;
                    };

                    handle_event(&beacon, &head_slot, broadcaster.as_deref(), &event).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Head subscription failed");
                metrics.record_error("head_stream");
            }
        }

        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Head subscriber stopping");
                return;
            }
            () = tokio::time::sleep(resubscribe_delay) => {}
        }
    }
}

/// Process one head event: gauge, log, best-effort proposer lookup,
/// optional broadcast.
async fn handle_event(
    beacon: &BeaconClient,
    head_slot: &AtomicU64,
    broadcaster: Option<&dyn EventBroadcaster>,
    event: &HeadEvent,
) {
    head_slot.store(event.slot, Ordering::Relaxed);
    info!(
        slot = event.slot,
        epoch = event.epoch(),
        block = %event.block,
        "Head advanced"
    );

    // Best-effort enrichment; empty slots and transient errors are
    // expected and skipped.
    match beacon.get_block(event.slot).await {
        Ok(Some(block)) => debug!(
            slot = event.slot,
            proposer = block.proposer_index,
            "Head block proposer"
        ),
        Ok(None) => debug!(slot = event.slot, "Head slot has no block yet"),
        Err(e) => debug!(slot = event.slot, error = %e, "Head block lookup failed"),
    }

    if let Some(broadcaster) = broadcaster
        && let Err(e) = broadcaster
            .broadcast(MonitorEvent::head_advanced(event.slot, event.epoch()))
            .await
    {
        debug!(error = %e, "Head broadcast failed; continuing");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

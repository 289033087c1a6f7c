//! Events emitted to the broadcaster.
//!
//! The aggregator publishes one `MetricsUpdate` event per committed
//! snapshot so live subscribers (dashboards, alerting) see fresh data
//! without polling the store.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::snapshot::ValidatorSnapshot;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of a broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A fresh snapshot was committed for a validator.
    MetricsUpdate,
    /// The canonical head advanced.
    HeadAdvanced,
}

impl EventType {
    /// Short name used in event ids and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetricsUpdate => "metrics_update",
            Self::HeadAdvanced => "head_advanced",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MONITOR EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// One event handed to the broadcaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    /// Kind of event.
    pub event_type: EventType,
    /// JSON payload.
    pub data: serde_json::Value,
    /// Correlation id, unique per event.
    pub id: String,
}

impl MonitorEvent {
    /// Build a `MetricsUpdate` event for a committed snapshot.
    #[must_use]
    pub fn metrics_update(snapshot: &ValidatorSnapshot) -> Self {
        Self {
            event_type: EventType::MetricsUpdate,
            data: serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
            id: format!(
                "{}-{}-{}",
                EventType::MetricsUpdate.as_str(),
                snapshot.validator_index,
                snapshot.time.timestamp_millis()
            ),
        }
    }

    /// Build a `HeadAdvanced` event for a new head slot.
    #[must_use]
    pub fn head_advanced(slot: u64, epoch: u64) -> Self {
        Self {
            event_type: EventType::HeadAdvanced,
            data: serde_json::json!({ "slot": slot, "epoch": epoch }),
            id: format!(
                "{}-{}-{}",
                EventType::HeadAdvanced.as_str(),
                slot,
                Utc::now().timestamp_millis()
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::snapshot::AttestationMetrics;

    #[test]
    fn metrics_update_carries_snapshot() {
        let snapshot = ValidatorSnapshot {
            time: Utc::now(),
            validator_index: 7,
            balance: 31_000_000_000,
            effective_balance: 31_000_000_000,
            is_online: true,
            attestation: AttestationMetrics::default(),
        };

        let event = MonitorEvent::metrics_update(&snapshot);
        assert_eq!(event.event_type, EventType::MetricsUpdate);
        assert!(event.id.starts_with("metrics_update-7-"));
        assert_eq!(event.data["validator_index"], 7);
    }

    #[test]
    fn head_advanced_payload() {
        let event = MonitorEvent::head_advanced(160, 5);
        assert_eq!(event.data["slot"], 160);
        assert_eq!(event.data["epoch"], 5);
    }
}

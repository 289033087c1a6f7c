//! Per-validator snapshots, the primary unit of output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// ATTESTATION METRICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Attestation quality fields of a snapshot.
///
/// Every field is optional: present/missing is significant downstream, so
/// absent upstream data stays `None` instead of defaulting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttestationMetrics {
    /// Correct head vote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_vote: Option<bool>,
    /// Correct source vote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_vote: Option<bool>,
    /// Correct target vote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_vote: Option<bool>,
    /// Inclusion delay in slots; always >= 1 when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclusion_delay: Option<i32>,
    /// Derived effectiveness in [0, 1]; present only when all three votes
    /// and the inclusion delay are known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<f64>,
}

impl AttestationMetrics {
    /// Whether any attestation data is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head_vote.is_none()
            && self.source_vote.is_none()
            && self.target_vote.is_none()
            && self.inclusion_delay.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATOR SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// One per-validator observation at a point in time.
///
/// # Invariants
///
/// - `attestation.effectiveness`, when present, is within `[0, 1]`
/// - `attestation.inclusion_delay`, when present, is `>= 1`
///
/// Both are checked by [`validate`](Self::validate); the engine drops
/// violating attestation fields at conversion time, so stored snapshots
/// always satisfy them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    /// Observation timestamp.
    pub time: DateTime<Utc>,
    /// Beacon-chain validator index.
    pub validator_index: u64,
    /// Balance in gwei.
    pub balance: i64,
    /// Effective balance in gwei.
    pub effective_balance: i64,
    /// Whether the validator was live at observation time.
    pub is_online: bool,
    /// Attestation quality fields.
    pub attestation: AttestationMetrics,
}

impl ValidatorSnapshot {
    /// Check the snapshot invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(effectiveness) = self.attestation.effectiveness
            && !(0.0..=1.0).contains(&effectiveness)
        {
            return Err(format!("effectiveness {effectiveness} outside [0, 1]"));
        }

        if let Some(delay) = self.attestation.inclusion_delay
            && delay < 1
        {
            return Err(format!("inclusion_delay {delay} below 1"));
        }

        if self.balance < 0 {
            return Err(format!("negative balance {}", self.balance));
        }

        Ok(())
    }

    /// Approximate serialized size, used for throughput accounting.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ValidatorSnapshot {
        ValidatorSnapshot {
            time: Utc::now(),
            validator_index: 42,
            balance: 32_000_000_000,
            effective_balance: 32_000_000_000,
            is_online: true,
            attestation: AttestationMetrics {
                head_vote: Some(true),
                source_vote: Some(true),
                target_vote: Some(false),
                inclusion_delay: Some(1),
                effectiveness: Some(0.75),
            },
        }
    }

    #[test]
    fn valid_snapshot_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn effectiveness_outside_unit_interval_fails() {
        let mut snapshot = sample();
        snapshot.attestation.effectiveness = Some(1.5);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn inclusion_delay_below_one_fails() {
        let mut snapshot = sample();
        snapshot.attestation.inclusion_delay = Some(0);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn absent_attestation_fields_are_allowed() {
        let mut snapshot = sample();
        snapshot.attestation = AttestationMetrics::default();
        assert!(snapshot.attestation.is_empty());
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let mut snapshot = sample();
        snapshot.attestation = AttestationMetrics {
            head_vote: Some(true),
            ..AttestationMetrics::default()
        };

        let json = serde_json::to_string(&snapshot).expect("serialization failed");
        assert!(json.contains("head_vote"));
        // Missing fields must stay missing, not become null.
        assert!(!json.contains("source_vote"));
        assert!(!json.contains("effectiveness"));
    }

    #[test]
    fn encoded_len_is_nonzero() {
        assert!(sample().encoded_len() > 0);
    }
}

//! Typed views over beacon API responses.
//!
//! The beacon API serializes every numeric field as a decimal string. The
//! wire structs in this module keep those strings as-is; the public types
//! carry parsed values. Balances are [`U256`] because aggregate balances
//! exceed 64 bits.

use alloy::primitives::{FixedBytes, U256};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{BeaconError, Result};

/// Slots per epoch on the beacon chain.
pub const SLOTS_PER_EPOCH: u64 = 32;

/// BLS public key of a validator (48 bytes).
pub type ValidatorPubkey = FixedBytes<48>;

// ═══════════════════════════════════════════════════════════════════════════════
// PARSE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a decimal-string field into a `u64` with full 64-bit precision.
pub(crate) fn parse_u64(value: &str, field: &'static str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| BeaconError::Parse(format!("invalid {field}: {value:?} ({e})")))
}

/// Parse a decimal-string balance into a [`U256`].
pub(crate) fn parse_u256(value: &str, field: &'static str) -> Result<U256> {
    U256::from_str_radix(value, 10)
        .map_err(|e| BeaconError::Parse(format!("invalid {field}: {value:?} ({e})")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENVELOPES & WIRE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Beacon API responses wrap the payload in a top-level `data` field.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

/// One entry of `/eth/v1/beacon/states/{state}/validators`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ValidatorRecord {
    pub index: String,
    pub balance: String,
    pub status: String,
    pub validator: ValidatorDetailRecord,
}

/// The nested `validator` object of a validator record.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ValidatorDetailRecord {
    pub pubkey: String,
    pub effective_balance: String,
    pub slashed: bool,
    pub activation_epoch: String,
    pub exit_epoch: String,
}

/// `/eth/v1/beacon/headers/head` payload down to the header message.
#[derive(Debug, Deserialize)]
pub(crate) struct HeaderData {
    pub header: HeaderEnvelope,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeaderEnvelope {
    pub message: HeaderMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeaderMessage {
    pub slot: String,
}

/// `/eth/v2/beacon/blocks/{slot}` payload down to the block message.
#[derive(Debug, Deserialize)]
pub(crate) struct BlockData {
    pub message: BlockMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockMessage {
    pub slot: String,
    pub proposer_index: String,
}

/// One entry of `/eth/v1/beacon/blocks/{slot}/attestations`.
#[derive(Debug, Deserialize)]
pub(crate) struct AttestationRecord {
    pub data: AttestationDataRecord,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttestationDataRecord {
    pub slot: String,
    pub index: String,
}

/// One SSE frame payload on the `head` topic.
#[derive(Debug, Deserialize)]
pub(crate) struct HeadFrame {
    pub slot: String,
    pub block: String,
    pub state: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATOR DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Parsed view of a single validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorData {
    /// Beacon-chain validator index.
    pub index: u64,
    /// Current balance in gwei.
    pub balance: U256,
    /// Upstream status string (e.g. `active_ongoing`, `exited_slashed`).
    pub status: String,
    /// BLS public key.
    pub pubkey: ValidatorPubkey,
    /// Effective balance in gwei.
    pub effective_balance: u64,
    /// Whether the validator has been slashed.
    pub slashed: bool,
    /// Epoch the validator activated.
    pub activation_epoch: u64,
    /// Epoch the validator exits (far-future if still active).
    pub exit_epoch: u64,
}

impl ValidatorData {
    /// Whether the validator is in any of the active states.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.starts_with("active")
    }
}

impl TryFrom<ValidatorRecord> for ValidatorData {
    type Error = BeaconError;

    fn try_from(record: ValidatorRecord) -> Result<Self> {
        let pubkey = record
            .validator
            .pubkey
            .parse::<ValidatorPubkey>()
            .map_err(|e| {
                BeaconError::Parse(format!("invalid pubkey: {:?} ({e})", record.validator.pubkey))
            })?;

        Ok(Self {
            index: parse_u64(&record.index, "validator index")?,
            balance: parse_u256(&record.balance, "balance")?,
            status: record.status,
            pubkey,
            effective_balance: parse_u64(&record.validator.effective_balance, "effective_balance")?,
            slashed: record.validator.slashed,
            activation_epoch: parse_u64(&record.validator.activation_epoch, "activation_epoch")?,
            exit_epoch: parse_u64(&record.validator.exit_epoch, "exit_epoch")?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NETWORK STATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregate counts over the full validator set.
///
/// `slashed_validators` counts validators with `slashed == true` exactly
/// once, independent of their status bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Total validators on the chain.
    pub total_validators: u64,
    /// Validators in an `active_*` state.
    pub active_validators: u64,
    /// Validators in a `pending_*` state.
    pub pending_validators: u64,
    /// Validators in an `exited_*` or `withdrawal_*` state.
    pub exited_validators: u64,
    /// Validators with the `slashed` flag set.
    pub slashed_validators: u64,
    /// Sum of all balances in gwei.
    pub total_balance: U256,
    /// Mean balance in gwei (zero when the set is empty).
    pub average_balance: U256,
}

impl NetworkStats {
    /// Aggregate stats from raw validator records.
    pub(crate) fn from_records(records: &[ValidatorRecord]) -> Result<Self> {
        let mut stats = Self::default();

        for record in records {
            stats.total_validators += 1;

            if record.status.starts_with("active") {
                stats.active_validators += 1;
            } else if record.status.starts_with("pending") {
                stats.pending_validators += 1;
            } else if record.status.starts_with("exited") || record.status.starts_with("withdrawal")
            {
                stats.exited_validators += 1;
            }

            if record.validator.slashed {
                stats.slashed_validators += 1;
            }

            stats.total_balance += parse_u256(&record.balance, "balance")?;
        }

        if stats.total_validators > 0 {
            stats.average_balance = stats.total_balance / U256::from(stats.total_validators);
        }

        Ok(stats)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEAD EVENTS & BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// A decoded head event from the SSE stream, timestamped on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadEvent {
    /// Slot of the new canonical head.
    pub slot: u64,
    /// Block root as reported upstream.
    pub block: String,
    /// State root as reported upstream.
    pub state: String,
    /// When this process received the event.
    pub received_at: DateTime<Utc>,
}

impl HeadEvent {
    /// Epoch the head slot belongs to.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.slot / SLOTS_PER_EPOCH
    }
}

impl TryFrom<HeadFrame> for HeadEvent {
    type Error = BeaconError;

    fn try_from(frame: HeadFrame) -> Result<Self> {
        Ok(Self {
            slot: parse_u64(&frame.slot, "head slot")?,
            block: frame.block,
            state: frame.state,
            received_at: Utc::now(),
        })
    }
}

/// Minimal view of a proposed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Slot the block was proposed in.
    pub slot: u64,
    /// Index of the proposing validator.
    pub proposer_index: u64,
}

/// Minimal view of an attestation included in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAttestation {
    /// Slot the attestation votes for.
    pub slot: u64,
    /// Committee index within that slot.
    pub committee_index: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

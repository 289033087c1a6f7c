//! Collection tasks and their typed results.
//!
//! A tick of the engine turns every monitored validator into one
//! [`CollectionTask`]; the worker pool turns every task into exactly one
//! [`TaskResult`]. Result payloads are a tagged [`ResultData`] variant,
//! parsed at the producer (the task executor), so consumers never touch
//! raw upstream maps.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use alloy::primitives::U256;
use chrono::{DateTime, Utc};

use crate::error::{CollectError, ErrorKind};

// ═══════════════════════════════════════════════════════════════════════════════
// TASK TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// What a task collects for its validator.
///
/// The periodic tick schedules only `Snapshot` tasks; the other types are
/// reserved for out-of-cycle collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Full per-validator snapshot (balance, liveness, attestation fields).
    Snapshot,
    /// Balance-only probe.
    Balance,
    /// Attestation activity for the current slot.
    Attestation,
    /// Block-proposal check for the current slot.
    Proposal,
    /// Sync-committee duty (reserved).
    SyncCommittee,
}

impl TaskType {
    /// Short name used in task ids and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Balance => "balance",
            Self::Attestation => "attestation",
            Self::Proposal => "proposal",
            Self::SyncCommittee => "sync-committee",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTION TASK
// ═══════════════════════════════════════════════════════════════════════════════

/// One unit of work for the worker pool.
#[derive(Debug, Clone)]
pub struct CollectionTask {
    /// `"<type>-<index>-<unix_seconds>"`; unique within the engine lifetime
    /// and used for log correlation.
    pub id: String,
    /// The validator this task collects for.
    pub validator_index: u64,
    /// What to collect.
    pub task_type: TaskType,
    /// Reserved; the pool is currently FIFO.
    pub priority: u8,
    /// Workers fail the task fast once this instant has passed.
    pub deadline: Instant,
    /// Free-form annotations carried through to logs.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CollectionTask {
    /// Create a task with an id derived from type, index and current time.
    #[must_use]
    pub fn new(task_type: TaskType, validator_index: u64, deadline: Instant) -> Self {
        let id = format!(
            "{}-{}-{}",
            task_type.as_str(),
            validator_index,
            Utc::now().timestamp()
        );

        Self {
            id,
            validator_index,
            task_type,
            priority: 0,
            deadline,
            metadata: HashMap::new(),
        }
    }

    /// Set the reserved priority field.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a metadata annotation.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════════

/// What a successful `Snapshot` task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotObservation {
    /// Balance in gwei.
    pub balance: U256,
    /// Effective balance in gwei.
    pub effective_balance: u64,
    /// Whether the beacon reported the validator as active.
    pub is_online: bool,
    /// Correct head vote, when the upstream reported one.
    pub head_vote: Option<bool>,
    /// Correct source vote, when the upstream reported one.
    pub source_vote: Option<bool>,
    /// Correct target vote, when the upstream reported one.
    pub target_vote: Option<bool>,
    /// Inclusion delay in slots, when the upstream reported one.
    pub inclusion_delay: Option<i32>,
}

/// What a successful `Attestation` task observed (best-effort).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationObservation {
    /// Slot that was inspected.
    pub slot: u64,
    /// Attestations included in that slot's block (0 for empty slots).
    pub attestations_in_block: usize,
}

/// What a successful `Proposal` task observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalObservation {
    /// Slot that was inspected.
    pub slot: u64,
    /// Whether this validator proposed the block at that slot.
    pub proposed: bool,
}

/// Typed result payload, tagged by task type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultData {
    /// Payload of a `Snapshot` task.
    Snapshot(SnapshotObservation),
    /// Payload of a `Balance` task: the balance in gwei.
    Balance(U256),
    /// Payload of an `Attestation` task.
    Attestation(AttestationObservation),
    /// Payload of a `Proposal` task.
    Proposal(ProposalObservation),
    /// Reserved.
    SyncCommittee,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TASK RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Terminal failure attached to a result.
#[derive(Debug, Clone)]
pub struct TaskError {
    /// Coarse classification of the last underlying error.
    pub kind: ErrorKind,
    /// Human-readable message of the last underlying error.
    pub message: String,
    /// How many attempts were made before giving up.
    pub attempts: u32,
}

/// Exactly one of these appears on the result channel per submitted task.
///
/// `data` and `error` are mutually exclusive: success carries a payload,
/// failure carries the annotated last error.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Id of the task that produced this result.
    pub task_id: String,
    /// The validator the task collected for.
    pub validator_index: u64,
    /// What was collected.
    pub task_type: TaskType,
    /// Payload on success; `None` on failure.
    pub data: Option<ResultData>,
    /// When the result was produced.
    pub collected_at: DateTime<Utc>,
    /// Wall-clock time spent on the task, retries included.
    pub duration: Duration,
    /// Terminal failure, if any.
    pub error: Option<TaskError>,
}

impl TaskResult {
    /// Build a success result for a task.
    #[must_use]
    pub fn success(task: &CollectionTask, data: ResultData, duration: Duration) -> Self {
        Self {
            task_id: task.id.clone(),
            validator_index: task.validator_index,
            task_type: task.task_type,
            data: Some(data),
            collected_at: Utc::now(),
            duration,
            error: None,
        }
    }

    /// Build a failure result carrying the last error and attempt count.
    #[must_use]
    pub fn failure(
        task: &CollectionTask,
        error: &CollectError,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            validator_index: task.validator_index,
            task_type: task.task_type,
            data: None,
            collected_at: Utc::now(),
            duration,
            error: Some(TaskError {
                kind: error.kind(),
                message: error.to_string(),
                attempts,
            }),
        }
    }

    /// Whether the task succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

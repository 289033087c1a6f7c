//! Beacon-backed task execution.
//!
//! [`SnapshotExecutor`] is the production [`TaskExecutor`]: it resolves
//! each task type against the beacon node and parses the payload into a
//! typed [`ResultData`] at the producer side, so the aggregator never
//! sees raw upstream JSON.

use std::sync::Arc;

use async_trait::async_trait;
use beacon_api::BeaconClient;
use tracing::trace;

use crate::collector::worker_pool::TaskExecutor;
use crate::error::CollectError;
use crate::types::task::{
    AttestationObservation, CollectionTask, ProposalObservation, ResultData, SnapshotObservation,
    TaskType,
};

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT EXECUTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Production executor backed by the beacon API.
#[derive(Debug, Clone)]
pub struct SnapshotExecutor {
    beacon: Arc<BeaconClient>,
}

impl SnapshotExecutor {
    /// Create an executor over a shared beacon client.
    #[must_use]
    pub const fn new(beacon: Arc<BeaconClient>) -> Self {
        Self { beacon }
    }
}

#[async_trait]
impl TaskExecutor for SnapshotExecutor {
    async fn execute(&self, task: &CollectionTask) -> Result<ResultData, CollectError> {
        trace!(task = %task.id, "Executing collection task");

        match task.task_type {
            TaskType::Snapshot => {
                let validator = self.beacon.get_validator(task.validator_index).await?;

                // Attestation votes come from duty-tracking queries the
                // engine does not own; they stay absent here and are
                // merged downstream when a duties source provides them.
                Ok(ResultData::Snapshot(SnapshotObservation {
                    balance: validator.balance,
                    effective_balance: validator.effective_balance,
                    is_online: validator.is_active(),
                    head_vote: None,
                    source_vote: None,
                    target_vote: None,
                    inclusion_delay: None,
                }))
            }

            TaskType::Balance => {
                let balance = self
                    .beacon
                    .get_validator_balance(task.validator_index, 0)
                    .await?;
                Ok(ResultData::Balance(balance))
            }

            TaskType::Attestation => {
                // Best-effort: empty slots and missing blocks are normal.
                let slot = self.beacon.get_current_slot().await?;
                let attestations = self
                    .beacon
                    .get_block_attestations(slot)
                    .await?
                    .unwrap_or_default();

                Ok(ResultData::Attestation(AttestationObservation {
                    slot,
                    attestations_in_block: attestations.len(),
                }))
            }

            TaskType::Proposal => {
                let slot = self.beacon.get_current_slot().await?;
                let block = self.beacon.get_block(slot).await?;

                Ok(ResultData::Proposal(ProposalObservation {
                    slot,
                    proposed: block.is_some_and(|b| b.proposer_index == task.validator_index),
                }))
            }

            TaskType::SyncCommittee => Err(CollectError::Unsupported(TaskType::SyncCommittee)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use alloy::primitives::U256;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ErrorKind;

    fn task(task_type: TaskType, index: u64) -> CollectionTask {
        CollectionTask::new(task_type, index, Instant::now() + Duration::from_secs(30))
    }

    fn executor_for(server: &MockServer) -> SnapshotExecutor {
        let client = BeaconClient::new(server.uri()).expect("client creation failed");
        SnapshotExecutor::new(Arc::new(client))
    }

    fn validator_body(balance: &str, status: &str) -> serde_json::Value {
        json!({
            "data": {
                "index": "42",
                "balance": balance,
                "status": status,
                "validator": {
                    "pubkey": format!("0x{}", "cd".repeat(48)),
                    "effective_balance": "32000000000",
                    "slashed": false,
                    "activation_epoch": "0",
                    "exit_epoch": "18446744073709551615"
                }
            }
        })
    }

    #[tokio::test]
    async fn snapshot_task_produces_observation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/validators/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(validator_body("31999998000", "active_ongoing")),
            )
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let data = executor
            .execute(&task(TaskType::Snapshot, 42))
            .await
            .expect("execution failed");

        let ResultData::Snapshot(observation) = data else {
            unreachable!("snapshot task must yield snapshot data");
        };
        assert_eq!(observation.balance, U256::from(31_999_998_000_u64));
        assert_eq!(observation.effective_balance, 32_000_000_000);
        assert!(observation.is_online);
        // Votes are absent until a duties source provides them.
        assert!(observation.head_vote.is_none());
    }

    #[tokio::test]
    async fn snapshot_task_marks_exited_validator_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/validators/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(validator_body("0", "exited_unslashed")),
            )
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let data = executor
            .execute(&task(TaskType::Snapshot, 42))
            .await
            .expect("execution failed");

        let ResultData::Snapshot(observation) = data else {
            unreachable!("snapshot task must yield snapshot data");
        };
        assert!(!observation.is_online);
    }

    #[tokio::test]
    async fn unknown_validator_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/validators/42"))
            .respond_with(ResponseTemplate::new(404).set_body_string("unknown"))
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let error = executor
            .execute(&task(TaskType::Snapshot, 42))
            .await
            .expect_err("404 must fail the task");

        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn sync_committee_tasks_are_unsupported() {
        let server = MockServer::start().await;
        let executor = executor_for(&server);

        let error = executor
            .execute(&task(TaskType::SyncCommittee, 1))
            .await
            .expect_err("sync committee collection is not implemented");

        assert!(matches!(error, CollectError::Unsupported(TaskType::SyncCommittee)));
    }
}

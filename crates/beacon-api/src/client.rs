//! Typed beacon-node client.
//!
//! [`BeaconClient`] exposes the handful of endpoints the collection engine
//! consumes, plus the SSE head-event subscription:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | [`get_validator`](BeaconClient::get_validator) | `/eth/v1/beacon/states/head/validators/{index}` |
//! | [`get_validator_balance`](BeaconClient::get_validator_balance) | `/eth/v1/beacon/states/{state_id}/validators/{index}` |
//! | [`get_current_slot`](BeaconClient::get_current_slot) | `/eth/v1/beacon/headers/head` |
//! | [`get_network_stats`](BeaconClient::get_network_stats) | `/eth/v1/beacon/states/head/validators` |
//! | [`get_block`](BeaconClient::get_block) | `/eth/v2/beacon/blocks/{slot}` |
//! | [`get_block_attestations`](BeaconClient::get_block_attestations) | `/eth/v1/beacon/blocks/{slot}/attestations` |
//! | [`subscribe_head`](BeaconClient::subscribe_head) | `/eth/v1/events?topics=head` |
//!
//! Every numeric field arrives as a decimal string and is parsed with
//! 64-bit precision; balances are parsed into `U256`.
//!
//! # Retries
//!
//! When constructed with retries enabled (the default), all GET endpoints
//! go through the [`RetryingClient`]: transport failures and 5xx responses
//! are re-attempted with capped exponential backoff. Non-2xx responses are
//! reported with their status code and a body prefix.

use std::time::Duration;

use alloy::primitives::U256;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONNECTION};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::BeaconConfig;
use crate::error::{BeaconError, Result};
use crate::http::RetryingClient;
use crate::sse::HeadEventStream;
use crate::types::{
    BlockAttestation, BlockData, BlockInfo, DataEnvelope, HeaderData, NetworkStats, ValidatorData,
    ValidatorRecord, parse_u64, parse_u256,
};

/// Connect timeout for the long-lived event stream.
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════════════════════
// BEACON CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Thin typed wrapper over the beacon node HTTP API.
///
/// # Thread Safety
///
/// The client is `Send + Sync` and cheap to clone; the underlying
/// `reqwest::Client` pools connections internally.
#[derive(Debug, Clone)]
pub struct BeaconClient {
    /// Retrying executor for one-shot GETs.
    http: RetryingClient,
    /// Separate client without an overall timeout for the SSE stream.
    stream_client: reqwest::Client,
    /// Beacon node base URL, without a trailing slash.
    base_url: String,
    /// Client configuration.
    config: BeaconConfig,
}

impl BeaconClient {
    /// Create a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(base_url, BeaconConfig::default())
    }

    /// Create a client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP
    /// clients cannot be created.
    pub fn with_config(base_url: impl Into<String>, config: BeaconConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BeaconError::Connection(format!("failed to create HTTP client: {e}")))?;

        // The event stream stays open for hours; only the connect phase is
        // bounded here. Liveness is the subscriber's responsibility.
        let stream_client = reqwest::Client::builder()
            .connect_timeout(STREAM_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BeaconError::Connection(format!("failed to create stream client: {e}")))?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            http: RetryingClient::new(client, config.retry.clone()),
            stream_client,
            base_url,
            config,
        })
    }

    /// Tie retry backoff waits to a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.http = self.http.with_cancellation(cancel);
        self
    }

    /// The beacon node base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &BeaconConfig {
        &self.config
    }

    // ───────────────────────────────────────────────────────────────────────────
    // VALIDATOR QUERIES
    // ───────────────────────────────────────────────────────────────────────────

    /// Fetch a single validator at the head state.
    ///
    /// # Errors
    ///
    /// [`BeaconError::NotFound`] if the index is unknown; transient errors
    /// after retries are exhausted; parse errors on malformed payloads.
    #[instrument(skip(self))]
    pub async fn get_validator(&self, index: u64) -> Result<ValidatorData> {
        let envelope: DataEnvelope<ValidatorRecord> = self
            .get_json(&format!("/eth/v1/beacon/states/head/validators/{index}"))
            .await?;
        envelope.data.try_into()
    }

    /// Fetch a validator's balance in gwei.
    ///
    /// `epoch = 0` queries the head state; any other value queries that
    /// epoch's state.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`get_validator`](Self::get_validator).
    #[instrument(skip(self))]
    pub async fn get_validator_balance(&self, index: u64, epoch: u64) -> Result<U256> {
        let state_id = if epoch == 0 {
            "head".to_string()
        } else {
            epoch.to_string()
        };

        let envelope: DataEnvelope<ValidatorRecord> = self
            .get_json(&format!("/eth/v1/beacon/states/{state_id}/validators/{index}"))
            .await?;

        parse_u256(&envelope.data.balance, "balance")
    }

    // ───────────────────────────────────────────────────────────────────────────
    // CHAIN QUERIES
    // ───────────────────────────────────────────────────────────────────────────

    /// Current head slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the header query fails.
    #[instrument(skip(self))]
    pub async fn get_current_slot(&self) -> Result<u64> {
        let envelope: DataEnvelope<HeaderData> =
            self.get_json("/eth/v1/beacon/headers/head").await?;
        parse_u64(&envelope.data.header.message.slot, "head slot")
    }

    /// Current epoch, derived as `slot / 32`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header query fails.
    pub async fn get_current_epoch(&self) -> Result<u64> {
        Ok(self.get_current_slot().await? / crate::types::SLOTS_PER_EPOCH)
    }

    /// Aggregate statistics over the full validator set.
    ///
    /// This walks the complete `/validators` listing; expect a large
    /// response on mainnet.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or any record is malformed.
    #[instrument(skip(self))]
    pub async fn get_network_stats(&self) -> Result<NetworkStats> {
        let envelope: DataEnvelope<Vec<ValidatorRecord>> = self
            .get_json("/eth/v1/beacon/states/head/validators")
            .await?;

        debug!(validators = envelope.data.len(), "Aggregating network stats");
        NetworkStats::from_records(&envelope.data)
    }

    /// Fetch the block proposed at a slot, if any.
    ///
    /// Empty slots are normal on the beacon chain; a 404 maps to `None`
    /// rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or malformed payloads.
    #[instrument(skip(self))]
    pub async fn get_block(&self, slot: u64) -> Result<Option<BlockInfo>> {
        let envelope: DataEnvelope<BlockData> =
            match self.get_json(&format!("/eth/v2/beacon/blocks/{slot}")).await {
                Ok(envelope) => envelope,
                Err(BeaconError::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            };

        Ok(Some(BlockInfo {
            slot: parse_u64(&envelope.data.message.slot, "block slot")?,
            proposer_index: parse_u64(&envelope.data.message.proposer_index, "proposer_index")?,
        }))
    }

    /// Fetch the attestations included in a slot's block, if any.
    ///
    /// A 404 (empty slot) maps to `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or malformed payloads.
    #[instrument(skip(self))]
    pub async fn get_block_attestations(&self, slot: u64) -> Result<Option<Vec<BlockAttestation>>> {
        let envelope: DataEnvelope<Vec<crate::types::AttestationRecord>> = match self
            .get_json(&format!("/eth/v1/beacon/blocks/{slot}/attestations"))
            .await
        {
            Ok(envelope) => envelope,
            Err(BeaconError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let attestations = envelope
            .data
            .into_iter()
            .map(|record| {
                Ok(BlockAttestation {
                    slot: parse_u64(&record.data.slot, "attestation slot")?,
                    committee_index: parse_u64(&record.data.index, "committee index")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(attestations))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // EVENT STREAM
    // ───────────────────────────────────────────────────────────────────────────

    /// Open the head-event SSE stream.
    ///
    /// The stream terminates when the remote closes the connection or
    /// `cancel` fires; the caller decides whether to re-subscribe.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription request is rejected.
    #[instrument(skip(self, cancel))]
    pub async fn subscribe_head(&self, cancel: CancellationToken) -> Result<HeadEventStream> {
        let url = format!("{}/eth/v1/events?topics=head", self.base_url);

        let response = self
            .stream_client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .header(CONNECTION, "keep-alive")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BeaconError::from_status(status.as_u16(), &body));
        }

        debug!("Head event stream opened");
        Ok(HeadEventStream::spawn(response, cancel))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // INTERNAL HELPERS
    // ───────────────────────────────────────────────────────────────────────────

    /// GET a JSON payload, applying the retry policy and status mapping.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.inner().get(&url);

        let response = if self.config.retry_enabled {
            self.http.execute(builder).await?
        } else {
            builder.send().await?
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BeaconError::from_status(status.as_u16(), &body));
        }

        Ok(response.json::<T>().await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

//! Beacon-node client with retrying requests and SSE head-event streaming.
//!
//! This crate provides [`BeaconClient`], the typed HTTP client the
//! validator-monitor service uses to talk to an Ethereum beacon node, and
//! the two building blocks it is made of:
//!
//! - [`RetryingClient`] - executes idempotent requests with capped
//!   exponential backoff (transport failures and 5xx retried, 4xx not)
//! - [`HeadEventStream`] / [`SseParser`] - the `/eth/v1/events?topics=head`
//!   Server-Sent-Events subscription with spec-conformant framing
//!
//! # Crate Relationships
//!
//! This is the **low-level crate** of the monitor stack:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Service layer (validator-monitor)                       │
//! │  └─ collection engine, worker pool, head subscriber      │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  Beacon API layer (beacon-api) ◄── YOU ARE HERE          │
//! │  └─ typed endpoints, retry/backoff, SSE framing          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use beacon_api::{BeaconClient, BeaconConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = BeaconClient::new("http://localhost:5052")?;
//!
//! // One-shot queries
//! let validator = client.get_validator(42).await?;
//! let slot = client.get_current_slot().await?;
//!
//! // Long-lived head subscription
//! let cancel = CancellationToken::new();
//! let mut heads = client.subscribe_head(cancel.clone()).await?;
//! while let Some(event) = heads.next().await {
//!     println!("head advanced to slot {} (epoch {})", event.slot, event.epoch());
//! }
//! ```
//!
//! # Numeric precision
//!
//! The beacon API serializes numbers as decimal strings. Slots, epochs and
//! indices are parsed as `u64`; balances as `alloy::primitives::U256`
//! because aggregate balances exceed 64 bits.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod sse;
pub mod types;

pub use client::BeaconClient;
pub use config::{BeaconConfig, RetryConfig};
pub use error::{BeaconError, ErrorKind, Result};
pub use http::RetryingClient;
pub use sse::{HeadEventStream, SseFrame, SseParser};
pub use types::{
    BlockAttestation, BlockInfo, HeadEvent, NetworkStats, SLOTS_PER_EPOCH, ValidatorData,
    ValidatorPubkey,
};

//! Layered error types for the validator monitor.
//!
//! This module provides a hierarchical error system:
//!
//! - [`ErrorKind`] - Coarse classification shared by metrics tags and retry
//!   decisions
//! - [`CollectError`] - Task-level failures produced while collecting a
//!   single validator's data
//! - [`MonitorError`] - Application-level errors combining collection,
//!   sink, and lifecycle failures
//!
//! # Error Philosophy
//!
//! - Task-level errors never escape the worker pool; they surface as
//!   failed results on the result channel
//! - Sink errors are counted and logged by the aggregator, which keeps
//!   running
//! - Only startup errors are fatal to the process

use std::time::Duration;

use beacon_api::BeaconError;
use thiserror::Error;

use crate::types::task::TaskType;

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, MonitorError>;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR KIND
// ═══════════════════════════════════════════════════════════════════════════════

/// Coarse classification of a failure observed at the engine boundary.
///
/// The pool retries `Transient`, `Timeout` and `Cancelled`; everything
/// else is terminal for the attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Connection-level or 5xx failure; safe to retry.
    Transient,
    /// The upstream rejected the request (4xx); retrying will not help.
    ClientError,
    /// The requested resource does not exist (404).
    NotFound,
    /// The upstream is rate limiting us (429).
    RateLimited,
    /// A task or HTTP deadline expired.
    Timeout,
    /// The pool rejected admission because the queue was at capacity.
    QueueFull,
    /// Malformed upstream payload.
    ParseError,
    /// A storage, cache or broadcast sink failed.
    SinkError,
    /// Cancellation was observed while waiting.
    Cancelled,
}

impl ErrorKind {
    /// Stable short tag for error-by-kind counters.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Transient => "beacon_transient",
            Self::ClientError => "beacon_4xx",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::QueueFull => "queue_full",
            Self::ParseError => "parse_error",
            Self::SinkError => "sink_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether an attempt failing with this kind may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout | Self::Cancelled)
    }
}

impl From<beacon_api::ErrorKind> for ErrorKind {
    fn from(kind: beacon_api::ErrorKind) -> Self {
        match kind {
            beacon_api::ErrorKind::Transient => Self::Transient,
            beacon_api::ErrorKind::Timeout => Self::Timeout,
            beacon_api::ErrorKind::Cancelled => Self::Cancelled,
            beacon_api::ErrorKind::NotFound => Self::NotFound,
            beacon_api::ErrorKind::RateLimited => Self::RateLimited,
            beacon_api::ErrorKind::ParseError => Self::ParseError,
            _ => Self::ClientError,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTION ERRORS (task-level)
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure while collecting one validator's data.
///
/// These are produced by the task executor and converted into failed
/// results by the worker pool; they never abort the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollectError {
    /// Beacon node request failed.
    #[error(transparent)]
    Beacon(#[from] BeaconError),

    /// The per-task execution deadline expired.
    #[error("task timed out after {0:?}")]
    TaskTimeout(Duration),

    /// The task's deadline had already passed when a worker picked it up.
    #[error("task deadline expired before execution")]
    DeadlineExpired,

    /// Cancellation fired while the task was waiting or executing.
    #[error("task cancelled")]
    Cancelled,

    /// No collection routine exists for this task type.
    #[error("collection for {0} tasks requires duty resolution outside the engine")]
    Unsupported(TaskType),
}

impl CollectError {
    /// Classify this error into a coarse [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Beacon(e) => {
                // Inlined From impl: const fn cannot call trait conversions.
                match e.kind() {
                    beacon_api::ErrorKind::Transient => ErrorKind::Transient,
                    beacon_api::ErrorKind::Timeout => ErrorKind::Timeout,
                    beacon_api::ErrorKind::Cancelled => ErrorKind::Cancelled,
                    beacon_api::ErrorKind::NotFound => ErrorKind::NotFound,
                    beacon_api::ErrorKind::RateLimited => ErrorKind::RateLimited,
                    beacon_api::ErrorKind::ParseError => ErrorKind::ParseError,
                    _ => ErrorKind::ClientError,
                }
            }
            Self::TaskTimeout(_) | Self::DeadlineExpired => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Unsupported(_) => ErrorKind::ClientError,
        }
    }

    /// Whether the pool may re-attempt the task after this failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors for the monitor service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MonitorError {
    /// Task-level collection failure surfaced to a caller.
    #[error(transparent)]
    Collect(#[from] CollectError),

    /// A downstream sink (store, cache, broadcaster) failed.
    #[error("sink error: {0}")]
    Sink(String),

    /// The circuit breaker is open for a component.
    #[error("circuit open for component: {0}")]
    CircuitOpen(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Startup error; fatal to the process.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// The shutdown deadline was exceeded before all phases completed.
    #[error("shutdown deadline exceeded")]
    ShutdownTimeout,
}

impl MonitorError {
    /// Classify this error into a coarse [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Collect(e) => e.kind(),
            Self::Sink(_) => ErrorKind::SinkError,
            Self::ShutdownTimeout => ErrorKind::Timeout,
            Self::CircuitOpen(_) | Self::Config(_) | Self::Initialization(_) => {
                ErrorKind::ClientError
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Cancelled.is_retryable());

        assert!(!ErrorKind::ClientError.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::QueueFull.is_retryable());
        assert!(!ErrorKind::ParseError.is_retryable());
        assert!(!ErrorKind::SinkError.is_retryable());
    }

    #[test]
    fn collect_error_classification() {
        let timeout = CollectError::TaskTimeout(Duration::from_secs(30));
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.is_retryable());

        let expired = CollectError::DeadlineExpired;
        assert_eq!(expired.kind(), ErrorKind::Timeout);

        let not_found = CollectError::Beacon(BeaconError::NotFound("99".into()));
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert!(!not_found.is_retryable());

        let unsupported = CollectError::Unsupported(TaskType::SyncCommittee);
        assert_eq!(unsupported.kind(), ErrorKind::ClientError);
    }

    #[test]
    fn beacon_kind_mapping() {
        assert_eq!(
            ErrorKind::from(beacon_api::ErrorKind::Transient),
            ErrorKind::Transient
        );
        assert_eq!(
            ErrorKind::from(beacon_api::ErrorKind::RateLimited),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn monitor_error_kinds() {
        assert_eq!(
            MonitorError::Sink("insert failed".into()).kind(),
            ErrorKind::SinkError
        );
        assert_eq!(MonitorError::ShutdownTimeout.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn tags_are_stable() {
        assert_eq!(ErrorKind::QueueFull.tag(), "queue_full");
        assert_eq!(ErrorKind::SinkError.tag(), "sink_error");
        assert_eq!(ErrorKind::Transient.tag(), "beacon_transient");
    }
}

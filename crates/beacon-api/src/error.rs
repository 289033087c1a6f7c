//! Error types for the beacon-node client.
//!
//! This module provides the error hierarchy for beacon API operations:
//!
//! - [`BeaconError`] - The primary error type for all client operations
//! - [`ErrorKind`] - Coarse classification used for retry decisions and
//!   error-by-kind metric tags
//!
//! # Error Philosophy
//!
//! These errors are designed to be:
//! - **Actionable**: Each variant tells you what went wrong and often how to fix it
//! - **Classifiable**: [`BeaconError::kind`] maps every failure to a stable tag
//! - **Informative**: Upstream failures carry the status code and a body prefix
//!   for debugging without dumping whole responses into logs

use thiserror::Error;

/// Result type alias using [`BeaconError`].
pub type Result<T> = std::result::Result<T, BeaconError>;

/// Longest body prefix carried inside an error message.
pub(crate) const BODY_PREFIX_LEN: usize = 200;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR KIND
// ═══════════════════════════════════════════════════════════════════════════════

/// Coarse classification of a failure, shared with downstream consumers.
///
/// | Kind | Retryable | Typical cause |
/// |------|-----------|---------------|
/// | `Transient` | yes | Connection failure, 5xx |
/// | `Timeout` | yes | Request or task deadline expired |
/// | `Cancelled` | yes | Cancellation observed during a backoff wait |
/// | `ClientError` | no | 4xx other than 404/429 |
/// | `NotFound` | no | 404 |
/// | `RateLimited` | no | 429 |
/// | `ParseError` | no | Malformed upstream payload |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Connection-level or server-side (5xx) failure; safe to retry.
    Transient,
    /// A deadline expired.
    Timeout,
    /// Cancellation fired while the caller was waiting.
    Cancelled,
    /// The server rejected the request (4xx); retrying will not help.
    ClientError,
    /// The requested resource does not exist (404).
    NotFound,
    /// The server is rate limiting us (429).
    RateLimited,
    /// The response could not be decoded.
    ParseError,
}

impl ErrorKind {
    /// Stable short tag for error-by-kind counters.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Transient => "beacon_transient",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ClientError => "beacon_4xx",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ParseError => "parse_error",
        }
    }

    /// Whether an operation failing with this kind may be retried.
    ///
    /// Transport failures, 5xx and deadline expiries are retryable;
    /// cancellation is retryable by convention at the layer that observes it.
    /// 4xx and parse failures are terminal.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout | Self::Cancelled)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BEACON ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors that can occur when talking to a beacon node.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BeaconError {
    /// Failed to establish a connection to the beacon node.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out waiting for a response.
    #[error("request timed out")]
    Timeout,

    /// Server-side failure (status >= 500), reported after retries are exhausted.
    #[error("upstream error ({status}): {body_prefix}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// First bytes of the response body.
        body_prefix: String,
    },

    /// The server rejected the request (4xx other than 404/429).
    #[error("client error ({status}): {body_prefix}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// First bytes of the response body.
        body_prefix: String,
    },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server returned 429 Too Many Requests.
    #[error("rate limited by beacon node")]
    RateLimited,

    /// Response was readable but structurally or numerically invalid.
    #[error("parse error: {0}")]
    Parse(String),

    /// Failed to decode a JSON payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cancellation fired while the client was waiting (backoff or stream read).
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration provided to the client.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The request body could not be cloned for a retry attempt.
    #[error("request is not cloneable and cannot be retried")]
    NotCloneable,
}

impl BeaconError {
    /// Classify this error into a coarse [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Upstream { .. } => ErrorKind::Transient,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Parse(_) | Self::Serialization(_) => ErrorKind::ParseError,
            Self::Client { .. } | Self::InvalidConfig(_) | Self::NotCloneable => {
                ErrorKind::ClientError
            }
        }
    }

    /// Check if this error is likely transient and retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Build the appropriate error for a non-success HTTP status.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let body_prefix: String = body.chars().take(BODY_PREFIX_LEN).collect();
        match status {
            404 => Self::NotFound(body_prefix),
            429 => Self::RateLimited,
            s if s >= 500 => Self::Upstream {
                status: s,
                body_prefix,
            },
            s => Self::Client {
                status: s,
                body_prefix,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS FROM reqwest ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<reqwest::Error> for BeaconError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Connection(err.to_string())
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
    fn status_classification() {
        assert!(matches!(
            BeaconError::from_status(404, "validator unknown"),
            BeaconError::NotFound(_)
        ));
        assert!(matches!(
            BeaconError::from_status(429, ""),
            BeaconError::RateLimited
        ));
        assert!(matches!(
            BeaconError::from_status(503, "overloaded"),
            BeaconError::Upstream { status: 503, .. }
        ));
        assert!(matches!(
            BeaconError::from_status(400, "bad state id"),
            BeaconError::Client { status: 400, .. }
        ));
    }

    #[test]
    fn retryable_kinds() {
        assert!(BeaconError::Timeout.is_retryable());
        assert!(BeaconError::Connection("refused".into()).is_retryable());
        assert!(
            BeaconError::Upstream {
                status: 502,
                body_prefix: String::new()
            }
            .is_retryable()
        );
        assert!(BeaconError::Cancelled.is_retryable());

        assert!(!BeaconError::NotFound("0".into()).is_retryable());
        assert!(!BeaconError::RateLimited.is_retryable());
        assert!(!BeaconError::Parse("bad slot".into()).is_retryable());
    }

    #[test]
    fn body_prefix_is_truncated() {
        let long_body = "x".repeat(1000);
        if let BeaconError::Client { body_prefix, .. } = BeaconError::from_status(400, &long_body) {
            assert_eq!(body_prefix.len(), BODY_PREFIX_LEN);
        } else {
            unreachable!("400 must map to Client");
        }
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(ErrorKind::Transient.tag(), "beacon_transient");
        assert_eq!(ErrorKind::NotFound.tag(), "not_found");
        assert_eq!(ErrorKind::RateLimited.tag(), "rate_limited");
    }
}

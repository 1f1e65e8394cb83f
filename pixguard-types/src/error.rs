use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the pixguard workspace.
///
/// Covers call-contract violations, upstream HTTP failures and rate-limit
/// signals, decode and persistence failures, and cancellation.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PixguardError {
    /// Invalid input argument (grid dimensions, tile counts, crop rectangles, ...).
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Issues with the returned or expected data (empty tile, malformed payload).
    #[error("data issue: {0}")]
    Data(String),

    /// An image payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The upstream answered with a non-success status, or the request failed in transit.
    #[error("{host} request failed (status={status:?}): {msg}")]
    Http {
        /// Remote host the request was sent to.
        host: String,
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Human-readable error message.
        msg: String,
    },

    /// The upstream signalled "too many requests".
    #[error("rate limited by {host}")]
    RateLimited {
        /// Remote host that rejected the request.
        host: String,
    },

    /// An operation exceeded its deadline.
    #[error("timed out: {what}")]
    Timeout {
        /// Description of the operation that timed out.
        what: String,
    },

    /// The caller's cancellation fired before the work ran.
    #[error("operation cancelled")]
    Cancelled,

    /// The rate limiter was closed while the request was queued or after shutdown.
    #[error("rate limiter closed")]
    LimiterClosed,

    /// Reading or writing a persisted document failed.
    #[error("persistence failed for {path}: {msg}")]
    Persist {
        /// File the operation targeted.
        path: String,
        /// Human-readable error message.
        msg: String,
    },

    /// The actor is already linked to a different external account.
    #[error("actor {actor_id} is already linked to {linked_to}")]
    IdentityConflict {
        /// Actor whose record is already linked.
        actor_id: String,
        /// External account the actor is linked to.
        linked_to: String,
    },

    /// A resource could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of missing resource, e.g. "actor 42".
        what: String,
    },

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl PixguardError {
    /// Helper: build an `Http` error.
    pub fn http(host: impl Into<String>, status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Http {
            host: host.into(),
            status,
            msg: msg.into(),
        }
    }

    /// Helper: build a `RateLimited` error for a host.
    pub fn rate_limited(host: impl Into<String>) -> Self {
        Self::RateLimited { host: host.into() }
    }

    /// Helper: build a `Timeout` error.
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout { what: what.into() }
    }

    /// Helper: build a `Persist` error from a path and any displayable cause.
    pub fn persist(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Persist {
            path: path.display().to_string(),
            msg: err.to_string(),
        }
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Returns true for upstream "too many requests" signals.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true if the error stems from cancellation or limiter shutdown.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::LimiterClosed)
    }
}

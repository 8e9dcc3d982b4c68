//! Error types for polling and fetching.

use std::time::Duration;

use telewatch_types::{DecodeError, QueryRange};
use thiserror::Error;

/// Errors that can occur when fetching from the upstream.
///
/// Everything except [`FetchError::InvalidRange`] is transient: pollers surface
/// it and try again on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Upstream answered with a non-2xx status.
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The requested range is empty or inverted. Rejected before any request.
    #[error("invalid range {0}: end must be after start")]
    InvalidRange(QueryRange),
}

impl FetchError {
    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidRange(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

/// What a poller publishes when a tick fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Invalid poller or client configuration, rejected at build time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An interval or timeout of zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The anomaly window does not overlap consecutive polls.
    #[error("anomaly window {window:?} must be longer than the poll interval {interval:?}")]
    WindowNotOverlapping { window: Duration, interval: Duration },

    /// The dedup retention would forget events still inside the window.
    #[error("dedup retention {retention:?} must be at least {required:?} (twice the window)")]
    RetentionTooShort {
        retention: Duration,
        required: Duration,
    },

    /// The upstream base URL is missing or unparsable.
    #[error("invalid upstream base URL: {0}")]
    InvalidBaseUrl(String),

    /// A path style other than `upstream` or `proxy`.
    #[error("unknown path style {0:?}, expected \"upstream\" or \"proxy\"")]
    UnknownPathStyle(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

//! Client error types
//!
//! Provides error classification for API operations with retry metadata.

use std::time::Duration;

use thiserror::Error;

/// Categories of client errors, used by the query-layer retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Session-ending auth failure (refresh exhausted) - never retried
    Authentication,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection/timeout errors - retryable
    Network,
    /// Malformed response body - non-retryable
    Parse,
    /// Local storage or configuration failure - non-retryable
    Local,
}

/// API operation errors
///
/// `Clone` is required because in-flight fetches are shared between
/// concurrent query subscribers.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Transport-level failure (DNS, connection reset, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out at the transport level
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// 401 unrecoverable via refresh; the session has ended
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-2xx response with the parsed server payload
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Parsed JSON error body, when the server sent one
        body: Option<serde_json::Value>,
    },

    /// Response body could not be deserialized
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Secret store read/write failure
    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Get the error category for this error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(_) => ErrorCategory::Authentication,
            Self::Network(_) | Self::Timeout(_) => ErrorCategory::Network,
            Self::Http { status, .. } if *status >= 500 => ErrorCategory::Server,
            Self::Http { .. } => ErrorCategory::Client,
            Self::Parse(_) => ErrorCategory::Parse,
            Self::Storage(_) | Self::Config(_) => ErrorCategory::Local,
        }
    }

    /// Whether the query layer may retry this error automatically.
    ///
    /// Only transient failures qualify: transport errors and 5xx. Auth
    /// failures already exhausted the pipeline's refresh-and-replay, and
    /// 4xx responses will not change on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Network | ErrorCategory::Server)
    }

    /// HTTP status code, when this error carries one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

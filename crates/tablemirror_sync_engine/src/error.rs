//! Error types for the sync engine.

use tablemirror_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Upstream answered HTTP 429.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Value of the `Retry-After` header, if any.
        retry_after: Option<String>,
    },

    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// Upstream response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Table name rejected before any request was made.
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    /// Change notification did not have the expected shape.
    #[error("invalid change payload: {0}")]
    InvalidPayload(String),

    /// Upstream kept returning cursors past the page limit.
    #[error("table {table} exceeded the page limit of {pages}")]
    PageLimitExceeded {
        /// Table being synced.
        table: String,
        /// Pages fetched before giving up.
        pages: u32,
    },

    /// Store error during reconciliation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Transport failures flagged retryable, rate limits and 5xx answers are
    /// transient. Every other 4xx and every malformed response is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::RateLimited { .. } => true,
            SyncError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::RateLimited { retry_after: None }.is_retryable());
        assert!(SyncError::Upstream {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
    }

    #[test]
    fn permanent_errors() {
        for status in [400, 401, 403, 404, 422] {
            let err = SyncError::Upstream {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "{status} must not be retried");
        }
        assert!(!SyncError::Protocol("bad json".into()).is_retryable());
        assert!(!SyncError::InvalidTable(String::new()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::PageLimitExceeded {
            table: "people".into(),
            pages: 5,
        };
        assert_eq!(err.to_string(), "table people exceeded the page limit of 5");

        let err = SyncError::Upstream {
            status: 404,
            message: "NOT_FOUND".into(),
        };
        assert!(err.to_string().contains("404"));
    }
}

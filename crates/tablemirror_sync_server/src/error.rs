//! Error types for the mirror server.

use tablemirror_store::StoreError;
use tablemirror_sync_engine::SyncError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A secret is configured but a signature header is missing.
    #[error("Missing signature headers")]
    MissingSignature,

    /// The signature does not match the body.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The delivery timestamp is outside the accepted window.
    #[error("Stale webhook timestamp: {0}")]
    StaleTimestamp(String),

    /// The body is not JSON.
    #[error("Invalid JSON")]
    InvalidJson(String),

    /// The body is JSON but not a change notification.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A query parameter is out of range.
    #[error("{0}")]
    Validation(String),

    /// No such record or route.
    #[error("{0}")]
    NotFound(String),

    /// The route exists but not for this method.
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Synchronization or reconciliation failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Process configuration is incomplete or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::MissingSignature
            | ServerError::InvalidJson(_)
            | ServerError::InvalidPayload(_) => 400,
            ServerError::InvalidSignature | ServerError::StaleTimestamp(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::Validation(_) => 422,
            ServerError::Sync(_) | ServerError::Store(_) | ServerError::Config(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

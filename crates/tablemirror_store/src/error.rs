//! Error types for the mirror store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A payload could not be encoded or decoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record with this identity already exists.
    #[error("record already exists: {identity}")]
    DuplicateIdentity {
        /// The conflicting identity.
        identity: String,
    },

    /// The database URL could not be interpreted.
    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    /// Stored data could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true if this error reflects a uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::DuplicateIdentity { .. })
    }
}

//! Error types for persistent storage operations.
//!
//! Backend failures (`Unavailable`, `QuotaExceeded`, `Corrupted`, ...) are
//! recovered inside the façade by falling back to the secondary backend.
//! Only `Exhausted`, raised when both backends fail, reaches callers.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be opened or refused the operation (permission
    /// denied, private browsing, forced failure in tests).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Write would exceed the backend's size ceiling.
    #[error("quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded { needed: usize, limit: usize },

    /// Persisted backend state could not be read back.
    #[error("corrupted storage: {0}")]
    Corrupted(String),

    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid store configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Both backends in the fallback chain failed.
    #[error("all backends failed (primary: {primary}; secondary: {secondary})")]
    Exhausted {
        primary: Box<StorageError>,
        secondary: Box<StorageError>,
    },
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Returns true if retrying the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable(_)
                | StorageError::Database(_)
                | StorageError::Io(_)
                | StorageError::Exhausted { .. }
        )
    }

    /// Combine the failures of both backends into the final error.
    pub fn exhausted(primary: StorageError, secondary: StorageError) -> Self {
        StorageError::Exhausted {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for StorageError {
    fn from(err: toml::de::Error) -> Self {
        StorageError::Config(err.to_string())
    }
}

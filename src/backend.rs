//! StorageBackend trait - the four-operation contract shared by every
//! physical store behind the façade.
//!
//! - Keys: opaque, caller-chosen strings
//! - Values: UTF-8 strings, opaque to the backend
//! - Operations: get_item, set_item, remove_item, clear
//!
//! Each write is a single atomic key-set at the backend; there are no
//! multi-key transactions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StorageError};

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// Position of a backend in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Preferred asynchronous store for large payloads.
    Structured,
    /// Size-limited store that is always available as a last resort.
    Simple,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Structured => f.write_str("structured"),
            BackendKind::Simple => f.write_str("simple"),
        }
    }
}

/// Validate that a key is well-formed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StorageError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// A physical key-value store.
///
/// Implementations report every failure as an `Err`; deciding what to do
/// about it is the fallback chain's job, not the backend's.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name for logs ("sqlite", "local", "memory").
    fn name(&self) -> &'static str;

    /// Get the value stored under `key`.
    ///
    /// Returns `None` if the key does not exist.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key.
    ///
    /// Returns `Ok(())` if the key was deleted or didn't exist.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Delete every key in the backend.
    async fn clear(&self) -> Result<()>;
}

/// Placeholder for a backend that could not be opened.
///
/// Every operation fails with [`StorageError::Unavailable`], so the
/// fallback chain routes all traffic to the other backend.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    name: &'static str,
    reason: String,
}

impl UnavailableBackend {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn error(&self) -> StorageError {
        StorageError::Unavailable(format!("{}: {}", self.name, self.reason))
    }
}

#[async_trait]
impl StorageBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_item(&self, _key: &str) -> Result<Option<String>> {
        Err(self.error())
    }

    async fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        Err(self.error())
    }

    async fn remove_item(&self, _key: &str) -> Result<()> {
        Err(self.error())
    }

    async fn clear(&self) -> Result<()> {
        Err(self.error())
    }
}

//! In-memory storage backend.
//!
//! This implementation is NOT durable - data is lost on process exit.
//! Use for testing and development only. It counts physical writes and can
//! be switched into a failing mode, which makes fallback and deduplication
//! behaviour observable.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{validate_key, StorageBackend};
use crate::error::{Result, StorageError};

/// In-memory implementation of StorageBackend.
///
/// Clones share the same underlying map and counters.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, String>>>,
    writes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    rejecting_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the backend.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Read a value directly, bypassing failure injection.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Number of successful `set_item` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent operation fail with `Unavailable` (or recover).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `set_item` fail while reads and removals keep working, as
    /// a store that has run out of quota does.
    pub fn set_rejecting_writes(&self, rejecting: bool) {
        self.rejecting_writes.store(rejecting, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory backend set to fail".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        validate_key(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        validate_key(key)?;
        if self.rejecting_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QuotaExceeded {
                needed: key.len() + value.len(),
                limit: 0,
            });
        }

        self.data.write().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.check_available()?;
        validate_key(key)?;

        self.data.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check_available()?;
        self.data.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new();

        backend.set_item("app-config", "{}").await.unwrap();
        let value = backend.get_item("app-config").await.unwrap();
        assert_eq!(value.as_deref(), Some("{}"));
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let backend = MemoryBackend::new();
        assert!(backend.get_item("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_nonexistent() {
        let backend = MemoryBackend::new();
        // Should not error
        backend.remove_item("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_clear() {
        let backend = MemoryBackend::new();
        backend.set_item("a", "1").await.unwrap();
        backend.set_item("b", "2").await.unwrap();
        assert_eq!(backend.len(), 2);

        backend.clear().await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let backend = MemoryBackend::new();
        backend.set_item("k", "v").await.unwrap();

        backend.set_failing(true);
        assert!(matches!(
            backend.get_item("k").await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(backend.set_item("k", "w").await.is_err());
        assert!(backend.remove_item("k").await.is_err());
        assert!(backend.clear().await.is_err());
        assert_eq!(backend.write_count(), 1);
        assert_eq!(backend.peek("k").as_deref(), Some("v"));

        backend.set_failing(false);
        assert_eq!(backend.get_item("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_rejecting_writes_keeps_reads() {
        let backend = MemoryBackend::new();
        backend.set_item("k", "v").await.unwrap();

        backend.set_rejecting_writes(true);
        assert!(matches!(
            backend.set_item("k", "w").await,
            Err(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(backend.get_item("k").await.unwrap().as_deref(), Some("v"));
        backend.remove_item("k").await.unwrap();
        assert!(backend.is_empty());
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = MemoryBackend::new();
        let handle = backend.clone();

        handle.set_item("k", "v").await.unwrap();
        assert_eq!(backend.peek("k").as_deref(), Some("v"));
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let backend = MemoryBackend::new();
        let result = backend.set_item("", "v").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}

//! Simple storage backend (Backend B).
//!
//! Synchronous and size-limited, the last-resort store. The whole map is
//! held in memory and, when a path is configured, mirrored to a JSON file
//! after every mutation. Writes that would push usage past the quota are
//! rejected and leave the store unchanged.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::backend::{validate_key, StorageBackend};
use crate::config::SimpleConfig;
use crate::error::{Result, StorageError};

/// Quota-limited key-value store with optional file persistence.
#[derive(Debug)]
pub struct LocalBackend {
    data: RwLock<BTreeMap<String, String>>,
    path: Option<PathBuf>,
    quota_bytes: usize,
}

/// Bytes an entry counts against the quota.
fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

impl LocalBackend {
    /// Create an empty, memory-only store.
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            path: None,
            quota_bytes,
        }
    }

    /// Open a file-backed store, loading existing entries if the file exists.
    pub fn open(path: impl AsRef<Path>, quota_bytes: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<BTreeMap<String, String>>(&contents)
                .map_err(|e| StorageError::Corrupted(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = data.len(), "Opened local store");

        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
            quota_bytes,
        })
    }

    /// Open the store described by `config`.
    ///
    /// An unreadable file does not prevent startup: the store starts empty
    /// (and overwrites the file on the next write).
    pub fn from_config(config: &SimpleConfig) -> Self {
        let Some(path) = &config.path else {
            return Self::new(config.quota_bytes);
        };

        match Self::open(path, config.quota_bytes) {
            Ok(store) => store,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Local store unreadable, starting empty");
                Self {
                    data: RwLock::new(BTreeMap::new()),
                    path: Some(path.clone()),
                    quota_bytes: config.quota_bytes,
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        let mut data = self.data.write();
        let current = Self::usage(&data);
        let replaced = data.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
        let needed = current - replaced + entry_size(key, value);
        if needed > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                needed,
                limit: self.quota_bytes,
            });
        }

        let previous = data.insert(key.to_string(), value.to_string());
        if let Err(err) = self.persist(&data) {
            match previous {
                Some(old) => data.insert(key.to_string(), old),
                None => data.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let mut data = self.data.write();
        if let Some(old) = data.remove(key) {
            if let Err(err) = self.persist(&data) {
                data.insert(key.to_string(), old);
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        let mut data = self.data.write();
        let previous = std::mem::take(&mut *data);
        if let Err(err) = self.persist(&data) {
            *data = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Bytes currently counted against the quota.
    pub fn used_bytes(&self) -> usize {
        Self::usage(&self.data.read())
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn usage(data: &BTreeMap<String, String>) -> usize {
        data.iter().map(|(k, v)| entry_size(k, v)).sum()
    }

    /// Write the map to disk via a temp file and rename.
    fn persist(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = serde_json::to_string(data)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, value)
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.remove(key)
    }

    async fn clear(&self) -> Result<()> {
        self.clear_all()
    }
}

//! Store configuration.
//!
//! Loaded from TOML; every field has a default, so an empty document is a
//! valid configuration. That default is NOT durable: without `path` entries
//! both backends live in memory and nothing survives the process. Set
//! `structured.path` (and usually `simple.path`) for persistent state.
//!
//! ```toml
//! legacy_reads = "migrate"
//! volatile_fields = ["lastUpdateTime", "_hasHydrated"]
//!
//! [structured]
//! path = "/var/lib/chat/state.db"
//!
//! [simple]
//! path = "/var/lib/chat/local.json"
//! quota_bytes = 5242880
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StorageError};
use crate::normalize::{HAS_HYDRATED, LAST_UPDATE_TIME};

/// Default simple-store ceiling, matching the usual browser storage limit.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Top-level store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend A settings.
    #[serde(default)]
    pub structured: StructuredConfig,

    /// Backend B settings.
    #[serde(default)]
    pub simple: SimpleConfig,

    /// How values found only in Backend B are treated on read.
    #[serde(default)]
    pub legacy_reads: LegacyReadPolicy,

    /// Fields under `state` ignored when comparing payloads.
    #[serde(default = "default_volatile_fields")]
    pub volatile_fields: Vec<String>,
}

/// SQLite (structured store) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredConfig {
    /// Database file. `None` keeps the database in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

/// Simple store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleConfig {
    /// JSON file the store is mirrored to. `None` keeps it in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum total size of keys and values, in bytes.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,
}

/// Treatment of a value that exists in Backend B but not in Backend A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyReadPolicy {
    /// Backend B stays a permanent secondary source; reads return its value
    /// and leave it in place.
    #[default]
    Secondary,
    /// Backend B is a one-time migration source; the value is copied into
    /// Backend A and removed from B once the copy succeeds.
    Migrate,
}

fn default_volatile_fields() -> Vec<String> {
    vec![LAST_UPDATE_TIME.to_string(), HAS_HYDRATED.to_string()]
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_secs() -> u64 {
    30
}

fn default_quota_bytes() -> usize {
    DEFAULT_QUOTA_BYTES
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl StructuredConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self {
            path: None,
            quota_bytes: default_quota_bytes(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            structured: StructuredConfig::default(),
            simple: SimpleConfig::default(),
            legacy_reads: LegacyReadPolicy::default(),
            volatile_fields: default_volatile_fields(),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Whether at least one backend writes to disk.
    pub fn is_durable(&self) -> bool {
        self.structured.path.is_some() || self.simple.path.is_some()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.structured.max_connections == 0 {
            return Err(StorageError::Config(
                "structured.max_connections must be at least 1".to_string(),
            ));
        }
        if self.simple.quota_bytes == 0 {
            return Err(StorageError::Config(
                "simple.quota_bytes must be greater than 0".to_string(),
            ));
        }
        if self.volatile_fields.iter().any(|f| f.is_empty()) {
            return Err(StorageError::Config(
                "volatile_fields cannot contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert!(config.structured.path.is_none());
        assert_eq!(config.structured.max_connections, 5);
        assert_eq!(config.structured.busy_timeout(), Duration::from_secs(30));
        assert!(config.simple.path.is_none());
        assert_eq!(config.simple.quota_bytes, DEFAULT_QUOTA_BYTES);
        assert_eq!(config.legacy_reads, LegacyReadPolicy::Secondary);
        assert_eq!(config.volatile_fields, vec!["lastUpdateTime", "_hasHydrated"]);
    }

    #[test]
    fn test_full_document() {
        let config = StoreConfig::from_toml_str(
            r#"
            legacy_reads = "migrate"
            volatile_fields = ["lastUpdateTime"]

            [structured]
            path = "/tmp/state.db"
            max_connections = 2

            [simple]
            path = "/tmp/local.json"
            quota_bytes = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.legacy_reads, LegacyReadPolicy::Migrate);
        assert_eq!(config.volatile_fields, vec!["lastUpdateTime"]);
        assert_eq!(config.structured.path, Some(PathBuf::from("/tmp/state.db")));
        assert_eq!(config.structured.max_connections, 2);
        assert_eq!(config.structured.busy_timeout_secs, 30);
        assert_eq!(config.simple.quota_bytes, 1024);
    }

    #[test]
    fn test_durability() {
        assert!(!StoreConfig::default().is_durable());

        let config = StoreConfig::from_toml_str("[simple]\npath = \"/tmp/local.json\"\n").unwrap();
        assert!(config.is_durable());

        let config = StoreConfig::from_toml_str("[structured]\npath = \"/tmp/state.db\"\n").unwrap();
        assert!(config.is_durable());
    }

    #[test]
    fn test_zero_quota_rejected() {
        let err = StoreConfig::from_toml_str("[simple]\nquota_bytes = 0\n").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_zero_connections_rejected() {
        let err =
            StoreConfig::from_toml_str("[structured]\nmax_connections = 0\n").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let err = StoreConfig::from_toml_str("legacy_reads = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "[simple]\nquota_bytes = 64\n").unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.simple.quota_bytes, 64);

        let missing = StoreConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, StorageError::Config(_)));
    }
}

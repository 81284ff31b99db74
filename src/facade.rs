//! PersistentStore - the public storage surface.
//!
//! Routes every operation through the fallback chain (structured store
//! first, simple store second) and skips writes whose payload is
//! equivalent to what is already stored.
//!
//! Concurrent `set_item` calls on the same key are not serialized: the
//! read-compare-write sequence is not atomic and the last backend write
//! wins. Each key is expected to have a single writer.

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::{StorageBackend, UnavailableBackend};
use crate::config::{LegacyReadPolicy, StoreConfig};
use crate::error::Result;
use crate::fallback::with_fallback;
use crate::local::LocalBackend;
use crate::normalize::{Envelope, Normalizer, Payload};
use crate::sqlite::SqliteBackend;

/// Handle to the dual-backend store.
///
/// Construct once at startup and share by reference or clone; clones use
/// the same backends.
#[derive(Clone)]
pub struct PersistentStore {
    primary: Arc<dyn StorageBackend>,
    secondary: Arc<dyn StorageBackend>,
    normalizer: Normalizer,
    legacy_reads: LegacyReadPolicy,
}

impl PersistentStore {
    /// Wire two backends with the default normalizer and legacy-read policy.
    pub fn new(primary: Arc<dyn StorageBackend>, secondary: Arc<dyn StorageBackend>) -> Self {
        Self::with_options(
            primary,
            secondary,
            Normalizer::default(),
            LegacyReadPolicy::default(),
        )
    }

    pub fn with_options(
        primary: Arc<dyn StorageBackend>,
        secondary: Arc<dyn StorageBackend>,
        normalizer: Normalizer,
        legacy_reads: LegacyReadPolicy,
    ) -> Self {
        Self {
            primary,
            secondary,
            normalizer,
            legacy_reads,
        }
    }

    /// Open both backends from configuration.
    ///
    /// Never fails because of the backends themselves: if SQLite cannot be
    /// opened the store runs on the simple backend alone. With
    /// [`StoreConfig::default`] both backends are in memory; see
    /// [`StoreConfig::is_durable`].
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        if !config.is_durable() {
            warn!("No backend paths configured, state will not survive the process");
        }

        let primary: Arc<dyn StorageBackend> =
            match SqliteBackend::from_config(&config.structured).await {
                Ok(backend) => Arc::new(backend),
                Err(err) => {
                    warn!(error = %err, "Structured store unavailable, using simple store only");
                    Arc::new(UnavailableBackend::new("sqlite", err.to_string()))
                }
            };
        let secondary: Arc<dyn StorageBackend> =
            Arc::new(LocalBackend::from_config(&config.simple));

        info!(
            primary = primary.name(),
            secondary = secondary.name(),
            legacy_reads = ?config.legacy_reads,
            "Persistent store ready"
        );

        Ok(Self::with_options(
            primary,
            secondary,
            Normalizer::new(config.volatile_fields.iter().cloned()),
            config.legacy_reads,
        ))
    }

    /// Get the value stored under `key`.
    ///
    /// Never fails: backend errors degrade to the secondary backend, and
    /// `None` is returned when nothing can be read.
    pub async fn get_item(&self, key: &str) -> Option<String> {
        let served = match with_fallback(self.primary.as_ref(), self.secondary.as_ref(), |b| {
            b.get_item(key)
        })
        .await
        {
            Ok(served) => served,
            Err(err) => {
                error!(key, error = %err, "Read failed on every backend");
                return None;
            }
        };

        if !served.from_primary() {
            return served.value;
        }
        match served.value {
            Some(value) if !value.is_empty() => Some(value),
            primary_value => self.read_legacy(key, primary_value).await,
        }
    }

    /// Store `value` under `key`.
    ///
    /// JSON payloads equivalent to the stored one (ignoring volatile state
    /// fields) are not written. Non-JSON payloads are always written as-is.
    /// Fails only when both backends reject the write.
    pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        match Payload::parse(value) {
            Payload::Json(incoming) => {
                if self.is_unchanged(key, &incoming).await {
                    debug!(key, "Payload unchanged, skipping write");
                    return Ok(());
                }
            }
            Payload::Opaque(_) => {
                debug!(key, "Non-JSON payload, writing through");
            }
        }

        let served = with_fallback(self.primary.as_ref(), self.secondary.as_ref(), |b| {
            b.set_item(key, value)
        })
        .await?;
        debug!(key, backend = %served.backend, bytes = value.len(), "Write stored");

        if !served.from_primary() {
            self.evict_stale_primary(key).await;
        }
        Ok(())
    }

    /// Delete `key`. Missing keys are not an error.
    pub async fn remove_item(&self, key: &str) -> Result<()> {
        let served = with_fallback(self.primary.as_ref(), self.secondary.as_ref(), |b| {
            b.remove_item(key)
        })
        .await?;
        debug!(key, backend = %served.backend, "Key removed");
        Ok(())
    }

    /// Delete every key from the first backend that accepts the operation.
    pub async fn clear(&self) -> Result<()> {
        let served =
            with_fallback(self.primary.as_ref(), self.secondary.as_ref(), |b| b.clear()).await?;
        info!(backend = %served.backend, "Store cleared");
        Ok(())
    }

    /// Get and deserialize a JSON value.
    ///
    /// A stored value that does not deserialize as `T` is an error.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key).await {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` as JSON and store it (deduplicated like `set_item`).
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_item(key, &raw).await
    }

    pub fn legacy_reads(&self) -> LegacyReadPolicy {
        self.legacy_reads
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Whether the primary already holds a value equivalent to `incoming`.
    ///
    /// Read failures count as "no existing value", which forces a write.
    async fn is_unchanged(&self, key: &str, incoming: &Envelope) -> bool {
        let existing = match self.primary.get_item(key).await {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return false,
            Err(err) => {
                debug!(key, error = %err, "Could not read stored value for comparison");
                return false;
            }
        };

        match Payload::parse(&existing) {
            Payload::Json(stored) => self.normalizer.equivalent(&stored, incoming),
            Payload::Opaque(_) => false,
        }
    }

    /// Read a value the primary does not have from the secondary.
    ///
    /// `primary_value` is the primary's empty result (`None` or `""`); it is
    /// returned as-is when the secondary holds nothing for `key`.
    async fn read_legacy(&self, key: &str, primary_value: Option<String>) -> Option<String> {
        let value = match self.secondary.get_item(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return primary_value,
            Err(err) => {
                debug!(key, error = %err, "Secondary read failed");
                return primary_value;
            }
        };

        if self.legacy_reads == LegacyReadPolicy::Migrate {
            self.migrate(key, &value).await;
        }
        Some(value)
    }

    /// Drop the primary's copy of `key` after a write landed in the
    /// secondary, so later reads fall through to the new value.
    async fn evict_stale_primary(&self, key: &str) {
        if let Err(err) = self.primary.remove_item(key).await {
            warn!(key, error = %err, "Could not evict stale primary value after fallback write");
        }
    }

    /// Copy a legacy value into the primary, then drop it from the secondary.
    async fn migrate(&self, key: &str, value: &str) {
        if let Err(err) = self.primary.set_item(key, value).await {
            warn!(key, error = %err, "Legacy value migration failed, keeping secondary copy");
            return;
        }
        if let Err(err) = self.secondary.remove_item(key).await {
            warn!(key, error = %err, "Migrated legacy value could not be removed from secondary");
            return;
        }
        info!(key, "Migrated legacy value to primary backend");
    }
}

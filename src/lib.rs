//! # fallback-store
//!
//! Persistent key-value store for client application state (settings,
//! chat history, prompt library) with two backends and write
//! deduplication:
//!
//! - **Fallback chain**: every operation tries the structured store first
//!   and falls back to the simple store on any failure
//! - **Write deduplication**: JSON state snapshots that differ only in
//!   `state.lastUpdateTime` / `state._hasHydrated` are not rewritten
//! - **Opaque pass-through**: non-JSON values are stored verbatim
//!
//! ## Backends
//!
//! - [`SqliteBackend`]: embedded SQLite database, the preferred store
//! - [`LocalBackend`]: synchronous, quota-limited store, the last resort
//! - [`MemoryBackend`]: in-memory store (testing and development)
//!
//! ## Quick Start
//!
//! [`StoreConfig::default`] keeps both backends in memory and persists
//! nothing; configure paths for durable state.
//!
//! ```rust,no_run
//! use fallback_store::{PersistentStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> fallback_store::Result<()> {
//!     let config = StoreConfig::from_toml_str(
//!         r#"
//!         [structured]
//!         path = "state.db"
//!
//!         [simple]
//!         path = "local.json"
//!         "#,
//!     )?;
//!     let store = PersistentStore::open(&config).await?;
//!
//!     store
//!         .set_item("app-config", r#"{"state":{"theme":"dark","lastUpdateTime":1},"version":3}"#)
//!         .await?;
//!
//!     // Only the timestamp changed: no write happens
//!     store
//!         .set_item("app-config", r#"{"state":{"theme":"dark","lastUpdateTime":2},"version":3}"#)
//!         .await?;
//!
//!     if let Some(value) = store.get_item("app-config").await {
//!         println!("{}", value);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Explicit wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fallback_store::{LocalBackend, PersistentStore, SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> fallback_store::Result<()> {
//!     let primary = SqliteBackend::open("state.db").await?;
//!     let secondary = LocalBackend::open("local.json", 5 * 1024 * 1024)?;
//!
//!     let store = PersistentStore::new(Arc::new(primary), Arc::new(secondary));
//!     store.remove_item("chat-sessions").await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod facade;
pub mod fallback;
pub mod local;
pub mod memory;
pub mod normalize;
pub mod sqlite;

// Re-export main types
pub use backend::{BackendKind, StorageBackend, UnavailableBackend, MAX_KEY_LENGTH};
pub use config::{LegacyReadPolicy, SimpleConfig, StoreConfig, StructuredConfig};
pub use error::{Result, StorageError};
pub use facade::PersistentStore;
pub use fallback::{with_fallback, Served};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use normalize::{CanonicalForm, Envelope, Normalizer, Payload};
pub use sqlite::SqliteBackend;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{BackendKind, StorageBackend};
    pub use crate::config::{LegacyReadPolicy, StoreConfig};
    pub use crate::error::{Result, StorageError};
    pub use crate::facade::PersistentStore;
    pub use crate::local::LocalBackend;
    pub use crate::memory::MemoryBackend;
    pub use crate::sqlite::SqliteBackend;
}

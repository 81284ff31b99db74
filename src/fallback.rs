//! Strict-priority fallback chain across two backends.

use std::future::Future;
use std::pin::Pin;
use tracing::{error, warn};

use crate::backend::{BackendKind, StorageBackend};
use crate::error::{Result, StorageError};

/// Boxed future returned by [`StorageBackend`] operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Result of an operation together with the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served<T> {
    pub value: T,
    pub backend: BackendKind,
}

impl<T> Served<T> {
    pub fn from_primary(&self) -> bool {
        self.backend == BackendKind::Structured
    }
}

/// Run `op` against `primary`; if it fails, run it against `secondary`.
///
/// Fails with [`StorageError::Exhausted`] only when both attempts fail.
pub async fn with_fallback<'a, T, F>(
    primary: &'a dyn StorageBackend,
    secondary: &'a dyn StorageBackend,
    op: F,
) -> Result<Served<T>>
where
    F: Fn(&'a dyn StorageBackend) -> BackendFuture<'a, T>,
{
    let primary_err = match op(primary).await {
        Ok(value) => {
            return Ok(Served {
                value,
                backend: BackendKind::Structured,
            })
        }
        Err(err) => err,
    };

    warn!(
        primary = primary.name(),
        secondary = secondary.name(),
        error = %primary_err,
        "Primary backend failed, falling back"
    );

    match op(secondary).await {
        Ok(value) => Ok(Served {
            value,
            backend: BackendKind::Simple,
        }),
        Err(secondary_err) => {
            error!(
                primary = primary.name(),
                secondary = secondary.name(),
                error = %secondary_err,
                "Secondary backend failed"
            );
            Err(StorageError::exhausted(primary_err, secondary_err))
        }
    }
}

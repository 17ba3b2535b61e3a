//! Object store port (driven/secondary port)
//!
//! The sync engine talks to remote storage exclusively through
//! [`IObjectStoreClient`]. Implementations live in `minisync-store`.
//!
//! ## Design Notes
//!
//! - Errors are classified ([`StoreError`]) because the engine applies a
//!   different policy to an unreachable store than to a vanished local file.
//! - The bucket is bound when the client is constructed; every call
//!   operates on that bucket.
//! - A single client is shared by the watcher and the sweeper, so
//!   implementations must tolerate concurrent callers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::newtypes::KEY_SEPARATOR;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// Network, authentication or backend failure.
    #[error("object store unavailable during {operation} of '{key}': {message}")]
    Unavailable {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// The local file vanished or could not be read before upload.
    #[error("local file unreadable: {path}")]
    LocalFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn unavailable(
        operation: &'static str,
        key: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        StoreError::Unavailable {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn unreadable(path: &Path, source: std::io::Error) -> Self {
        StoreError::LocalFileUnreadable {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, StoreError::LocalFileUnreadable { .. })
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// Object metadata as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of a best-effort prefix deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixDeletion {
    pub deleted: usize,
    pub failed: usize,
}

/// Lazy, single-pass listing. A new `list` call starts over.
pub type ObjectStream = BoxStream<'static, Result<RemoteObjectInfo, StoreError>>;

// ============================================================================
// IObjectStoreClient trait
// ============================================================================

#[async_trait::async_trait]
pub trait IObjectStoreClient: Send + Sync {
    /// Human-readable location used in log lines, e.g. `s3://backups`.
    fn location(&self) -> String;

    /// Make sure the bound bucket exists, creating it if needed.
    async fn ensure_bucket(&self) -> Result<(), StoreError>;

    /// Upload the file at `local_path` under `key`, overwriting any
    /// existing object.
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError>;

    /// Remove the object at `key`. A missing object counts as success.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every object whose key starts with `prefix`.
    fn list(&self, prefix: &str) -> ObjectStream;

    /// Metadata for `key`, or `None` when no such object exists.
    async fn stat(&self, key: &str) -> Result<Option<RemoteObjectInfo>, StoreError>;

    /// Delete every object under the directory key `prefix` (that is,
    /// every key starting with `prefix + "/"`).
    ///
    /// Best-effort: a failed deletion is logged and counted, and the
    /// remaining objects are still deleted. Only a listing failure is
    /// returned as an error.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<PrefixDeletion, StoreError> {
        let dir_prefix = format!("{}{}", prefix.trim_end_matches(KEY_SEPARATOR), KEY_SEPARATOR);
        let mut objects = self.list(&dir_prefix);
        let mut outcome = PrefixDeletion::default();

        while let Some(object) = objects.next().await {
            let object = match object {
                Ok(object) => object,
                Err(e) => {
                    warn!(prefix = %dir_prefix, error = %e, "Listing failed during prefix deletion");
                    return Err(e);
                }
            };
            match self.delete(&object.key).await {
                Ok(()) => {
                    debug!(key = %object.key, "Deleted object under removed directory");
                    outcome.deleted += 1;
                }
                Err(e) => {
                    warn!(key = %object.key, error = %e, "Failed to delete object");
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }
}

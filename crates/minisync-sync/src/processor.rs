//! Change event processing
//!
//! Maps one [`ChangeEvent`] to at most one object store call:
//!
//! | Event    | Directory | Store call                   |
//! |----------|-----------|------------------------------|
//! | Created  | no        | `Put(key)`                   |
//! | Created  | yes       | none (watcher subscribes)    |
//! | Modified | no        | `Put(key)`                   |
//! | Modified | yes       | none                         |
//! | Removed  | no        | `Delete(key)`                |
//! | Removed  | yes       | `DeleteByPrefix(key)`        |
//! | Renamed  | no        | `Delete(old key)`            |
//! | Renamed  | yes       | `DeleteByPrefix(old key)`    |
//!
//! A rename only removes the old key. The new path is uploaded when its own
//! `Created` event arrives, so the object is briefly absent remotely.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use minisync_core::domain::{ChangeEvent, ChangeKind, DomainError, RelativeKey, WatchRoot};
use minisync_core::ports::{IObjectStoreClient, StoreError};
use tracing::{debug, info, warn};

/// The single store call an event translates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Put { key: RelativeKey, path: PathBuf },
    Delete { key: RelativeKey },
    DeleteByPrefix { prefix: RelativeKey },
}

impl fmt::Display for StoreCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreCall::Put { key, .. } => write!(f, "put {key}"),
            StoreCall::Delete { key } => write!(f, "delete {key}"),
            StoreCall::DeleteByPrefix { prefix } => write!(f, "delete-prefix {prefix}/"),
        }
    }
}

/// Pure mapping from an event to a store call.
///
/// # Errors
/// `DomainError::PathResolutionFailed` when the event path cannot be
/// expressed as a key under `root`.
pub fn plan(root: &WatchRoot, event: &ChangeEvent) -> Result<Option<StoreCall>, DomainError> {
    let call = match (event.kind, event.is_directory) {
        (ChangeKind::Created | ChangeKind::Modified, true) => return Ok(None),
        (ChangeKind::Created | ChangeKind::Modified, false) => StoreCall::Put {
            key: RelativeKey::from_local(root, &event.path)?,
            path: event.path.clone(),
        },
        (ChangeKind::Removed | ChangeKind::Renamed, false) => StoreCall::Delete {
            key: RelativeKey::from_local(root, &event.path)?,
        },
        (ChangeKind::Removed | ChangeKind::Renamed, true) => StoreCall::DeleteByPrefix {
            prefix: RelativeKey::from_local(root, &event.path)?,
        },
    };
    Ok(Some(call))
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied(StoreCall),
    /// No store call needed.
    Ignored,
    /// Path could not be resolved; event discarded.
    Dropped,
    /// The store call failed; the next sweep will retry.
    Failed(String),
}

impl EventOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, EventOutcome::Dropped | EventOutcome::Failed(_))
    }
}

/// Applies change events to the object store.
#[derive(Clone)]
pub struct ChangeEventProcessor {
    root: WatchRoot,
    store: Arc<dyn IObjectStoreClient>,
}

impl ChangeEventProcessor {
    pub fn new(root: WatchRoot, store: Arc<dyn IObjectStoreClient>) -> Self {
        Self { root, store }
    }

    /// Plans and executes the store call for `event`. Never fails: every
    /// error is logged and reported in the outcome.
    pub async fn process(&self, event: &ChangeEvent) -> EventOutcome {
        let call = match plan(&self.root, event) {
            Ok(Some(call)) => call,
            Ok(None) => {
                debug!(path = %event.path.display(), kind = %event.kind, "No store call for event");
                return EventOutcome::Ignored;
            }
            Err(e) => {
                warn!(path = %event.path.display(), error = %e, "Dropping event");
                return EventOutcome::Dropped;
            }
        };

        match self.execute(&call).await {
            Ok(()) => EventOutcome::Applied(call),
            Err(e @ StoreError::LocalFileUnreadable { .. }) => {
                warn!(%call, error = %e, "Local file vanished before upload, skipping");
                EventOutcome::Failed(e.to_string())
            }
            Err(e) => {
                warn!(%call, error = %e, "Store call failed; next sweep will retry");
                EventOutcome::Failed(e.to_string())
            }
        }
    }

    async fn execute(&self, call: &StoreCall) -> Result<(), StoreError> {
        match call {
            StoreCall::Put { key, path } => {
                self.store.put(key.as_str(), path).await?;
                info!(key = %key, "Uploaded");
            }
            StoreCall::Delete { key } => {
                self.store.delete(key.as_str()).await?;
                info!(key = %key, "Deleted");
            }
            StoreCall::DeleteByPrefix { prefix } => {
                let outcome = self.store.delete_by_prefix(prefix.as_str()).await?;
                info!(
                    prefix = %prefix.dir_prefix(),
                    deleted = outcome.deleted,
                    failed = outcome.failed,
                    "Deleted directory objects"
                );
            }
        }
        Ok(())
    }
}

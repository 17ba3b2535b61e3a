//! MiniSync Sync - One-way mirror engine
//!
//! Keeps a local directory tree mirrored into an object store through two
//! independent paths that share one [`IObjectStoreClient`]:
//!
//! - **Fast path**: OS change notifications → [`watcher`] → [`processor`] → store
//! - **Slow path**: interval timer → [`sweeper`] (walk + list + diff) → store
//!
//! ## Modules
//!
//! - [`watcher`] - Directory subscriptions and notify event mapping
//! - [`processor`] - Change event → store call mapping
//! - [`sweeper`] - Periodic full reconciliation pass
//! - [`orchestrator`] - Runs watcher and sweeper until shutdown
//! - [`status`] - Shared status snapshot and pause/sweep controls
//!
//! [`IObjectStoreClient`]: minisync_core::ports::IObjectStoreClient

pub mod orchestrator;
pub mod processor;
pub mod status;
pub mod sweeper;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::PathBuf;
use std::time::Duration;

use minisync_core::config::Config;
use minisync_core::domain::{DomainError, WatchRoot};
use minisync_core::ports::StoreError;
use thiserror::Error;

pub use orchestrator::{SyncHandle, SyncOrchestrator};
pub use processor::{ChangeEventProcessor, EventOutcome, StoreCall};
pub use status::{EngineState, SyncStatus, WatcherState};
pub use sweeper::{ReconciliationSweeper, SweepPlan, SweepReport};
pub use watcher::{FileSystemWatcher, NotifyWatchSource, WatchSource};

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A directory could not be subscribed for change notifications
    #[error("Watch subscription failed for {path}: {message}")]
    WatchSubscriptionFailed { path: PathBuf, message: String },

    /// The OS notification backend could not be initialised
    #[error("Watcher unavailable: {0}")]
    WatcherUnavailable(String),

    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// An object store call failed
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// A domain-level error propagated from minisync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
}

/// Validated inputs the engine needs, built once at startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub root: WatchRoot,
    pub reconcile_interval: Duration,
}

impl EngineSettings {
    pub fn new(root: WatchRoot, reconcile_interval: Duration) -> Self {
        Self {
            root,
            reconcile_interval,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, DomainError> {
        if config.sync.reconcile_interval == 0 {
            return Err(DomainError::ValidationFailed(
                "sync.reconcile_interval must be greater than 0".into(),
            ));
        }
        Ok(Self {
            root: WatchRoot::new(&config.sync.root)?,
            reconcile_interval: Duration::from_secs(config.sync.reconcile_interval),
        })
    }
}

//! Domain types for MiniSync
//!
//! - Newtypes for the watch root and the local/remote join key
//! - Change events produced by the filesystem watcher
//! - Sync decisions produced by the reconciliation sweep
//! - Domain-specific error types

pub mod change;
pub mod decision;
pub mod errors;
pub mod local;
pub mod newtypes;

pub use change::{ChangeEvent, ChangeKind};
pub use decision::{SyncAction, SyncDecision};
pub use errors::DomainError;
pub use local::LocalFileState;
pub use newtypes::{RelativeKey, WatchRoot, KEY_SEPARATOR};

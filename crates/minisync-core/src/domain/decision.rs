//! Reconciliation decisions
//!
//! One [`SyncDecision`] per local file or remote key examined during a
//! sweep. Decisions are recomputed on every pass and never cached.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::newtypes::RelativeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Local file is missing remotely or differs in size/mtime.
    Upload,
    /// Remote key has no local counterpart.
    Delete,
    /// Local and remote agree on size and modification time.
    Skip,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncAction::Upload => "upload",
            SyncAction::Delete => "delete",
            SyncAction::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Key is kept as the raw store key so that malformed remote keys can
/// still be scheduled for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDecision {
    pub key: String,
    pub action: SyncAction,
}

impl SyncDecision {
    pub fn upload(key: &RelativeKey) -> Self {
        Self {
            key: key.to_string(),
            action: SyncAction::Upload,
        }
    }

    pub fn skip(key: &RelativeKey) -> Self {
        Self {
            key: key.to_string(),
            action: SyncAction::Skip,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            action: SyncAction::Delete,
        }
    }

    /// Returns true if applying this decision touches the store.
    pub fn is_mutation(&self) -> bool {
        self.action != SyncAction::Skip
    }
}

//! Snapshot of a local file as compared against remote metadata

use std::fs::Metadata;

use chrono::{DateTime, Utc};

use crate::ports::RemoteObjectInfo;

/// Size and modification time of a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileState {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl LocalFileState {
    pub fn from_metadata(metadata: &Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    /// Exact equality on size and modification time; no tolerance window.
    pub fn matches(&self, remote: &RemoteObjectInfo) -> bool {
        self.size == remote.size && self.modified == remote.last_modified
    }
}

//! Engine status snapshot
//!
//! [`SyncStatus`] is what the daemon publishes and what `minisync status`
//! reads back. The daemon keeps it in a [`StatusTracker`] and, when a status
//! file is configured, rewrites that file atomically (temp file + rename)
//! on every state change.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::processor::EventOutcome;
use crate::sweeper::SweepReport;

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Starting,
    Idle,
    Sweeping,
    Paused,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Starting => "starting",
            EngineState::Idle => "idle",
            EngineState::Sweeping => "sweeping",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    Starting,
    Active,
    /// Startup subscription failed; only the sweeper keeps the mirror in sync.
    Failed(String),
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherState::Starting => write!(f, "starting"),
            WatcherState::Active => write!(f, "active"),
            WatcherState::Failed(msg) => write!(f, "failed ({msg})"),
            WatcherState::Stopped => write!(f, "stopped"),
        }
    }
}

// ============================================================================
// SyncStatus
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: EngineState,
    pub watcher: WatcherState,
    pub root: PathBuf,
    pub store: String,
    pub watched_directories: usize,
    pub events_processed: u64,
    pub events_failed: u64,
    pub sweeps_completed: u64,
    pub last_sweep: Option<SweepReport>,
    pub updated_at: DateTime<Utc>,
}

impl SyncStatus {
    pub fn new(root: impl Into<PathBuf>, store: impl Into<String>) -> Self {
        Self {
            state: EngineState::Starting,
            watcher: WatcherState::Starting,
            root: root.into(),
            store: store.into(),
            watched_directories: 0,
            events_processed: 0,
            events_failed: 0,
            sweeps_completed: 0,
            last_sweep: None,
            updated_at: Utc::now(),
        }
    }

    /// Reads a status file written by a running daemon.
    pub fn read_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the snapshot to `path` via a sibling temp file and a rename, so
    /// readers never see a half-written file.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)
    }
}

// ============================================================================
// StatusTracker
// ============================================================================

/// Shared, optionally persisted [`SyncStatus`].
#[derive(Clone)]
pub struct StatusTracker {
    inner: Arc<Mutex<SyncStatus>>,
    file: Option<Arc<PathBuf>>,
    /// Event counters changed since the file was last written.
    unsaved: Arc<AtomicBool>,
}

impl StatusTracker {
    pub fn new(initial: SyncStatus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
            file: None,
            unsaved: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(Arc::new(path.into()));
        self
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref().map(PathBuf::as_path)
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.lock().clone()
    }

    /// Applies `f` and persists the result.
    pub fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut status = self.lock();
        f(&mut status);
        status.updated_at = Utc::now();
        self.unsaved.store(false, Ordering::Release);
        self.persist(&status);
    }

    /// Counts an event outcome in memory. Counters reach the file with the
    /// next update or [`flush`](StatusTracker::flush).
    pub fn record_event(&self, outcome: &EventOutcome) {
        let mut status = self.lock();
        status.events_processed += 1;
        if outcome.is_failure() {
            status.events_failed += 1;
        }
        self.unsaved.store(true, Ordering::Release);
    }

    /// Writes the status file if event counters changed since the last write.
    pub fn flush(&self) {
        if self.unsaved.swap(false, Ordering::AcqRel) {
            let mut status = self.lock();
            status.updated_at = Utc::now();
            self.persist(&status);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncStatus> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, status: &SyncStatus) {
        let Some(path) = self.file.as_deref() else {
            return;
        };
        match status.write_to(path) {
            Ok(()) => debug!(path = %path.display(), state = %status.state, "Status file updated"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write status file"),
        }
    }
}

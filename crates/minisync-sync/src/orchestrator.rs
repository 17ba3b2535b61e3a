//! Sync orchestrator
//!
//! Runs the two sync paths side by side until shutdown:
//!
//! ```text
//! FileSystemWatcher ──→ ChangeEventProcessor ──┐
//!                                              ├──→ IObjectStoreClient
//! interval / sweep request ──→ Sweeper ────────┘
//! ```
//!
//! The paths share only the store client. A watcher that fails to start is
//! recorded in the status and the sweeper carries on alone.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use minisync_core::ports::IObjectStoreClient;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::processor::ChangeEventProcessor;
use crate::status::{EngineState, StatusTracker, SyncStatus, WatcherState};
use crate::sweeper::ReconciliationSweeper;
use crate::watcher::{FileSystemWatcher, NotifyWatchSource, WatchSource};
use crate::EngineSettings;

/// How often event counters are written out between state changes.
const STATUS_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// SyncHandle
// ============================================================================

/// Cloneable control surface for a running engine.
#[derive(Clone)]
pub struct SyncHandle {
    tracker: StatusTracker,
    paused: Arc<AtomicBool>,
    sweep_now: Arc<Notify>,
}

impl SyncHandle {
    fn new(tracker: StatusTracker) -> Self {
        Self {
            tracker,
            paused: Arc::new(AtomicBool::new(false)),
            sweep_now: Arc::new(Notify::new()),
        }
    }

    /// Stops applying watcher events and skips sweeps until [`resume`].
    ///
    /// [`resume`]: SyncHandle::resume
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            info!("Sync paused");
            self.tracker.update(|s| s.state = EngineState::Paused);
        }
    }

    /// Resumes syncing and requests an immediate sweep to catch up on
    /// anything that changed while paused.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            info!("Sync resumed");
            self.tracker.update(|s| {
                if s.state == EngineState::Paused {
                    s.state = EngineState::Idle;
                }
            });
        }
        self.request_sweep();
    }

    /// Asks the sweeper to run a pass now. Requests made while a pass is
    /// running coalesce into one follow-up pass.
    pub fn request_sweep(&self) {
        debug!("Sweep requested");
        self.sweep_now.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SyncStatus {
        self.tracker.snapshot()
    }

    pub(crate) fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub(crate) async fn sweep_requested(&self) {
        self.sweep_now.notified().await
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

pub struct SyncOrchestrator {
    settings: EngineSettings,
    store: Arc<dyn IObjectStoreClient>,
    handle: SyncHandle,
}

impl SyncOrchestrator {
    pub fn new(settings: EngineSettings, store: Arc<dyn IObjectStoreClient>) -> Self {
        let status = SyncStatus::new(settings.root.as_path(), store.location());
        Self {
            settings,
            store,
            handle: SyncHandle::new(StatusTracker::new(status)),
        }
    }

    /// Persist every status change to `path`.
    pub fn with_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        let tracker = StatusTracker::new(self.handle.status()).with_file(path);
        self.handle = SyncHandle::new(tracker);
        self
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Runs with the platform's notification backend until `shutdown` is
    /// cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        match NotifyWatchSource::new() {
            Ok(source) => self.run_with_source(source, shutdown).await,
            Err(e) => {
                error!(error = %e, "File watcher unavailable, relying on periodic sweeps");
                self.handle
                    .tracker()
                    .update(|s| s.watcher = WatcherState::Failed(e.to_string()));
                self.run_tasks(None::<FileSystemWatcher<NotifyWatchSource>>, shutdown)
                    .await;
            }
        }
    }

    /// Runs with an explicit watch source.
    pub async fn run_with_source<S>(self, source: S, shutdown: CancellationToken)
    where
        S: WatchSource + 'static,
    {
        let watcher = FileSystemWatcher::new(self.settings.root.clone(), source);
        self.run_tasks(Some(watcher), shutdown).await;
    }

    async fn run_tasks<S>(self, watcher: Option<FileSystemWatcher<S>>, shutdown: CancellationToken)
    where
        S: WatchSource + 'static,
    {
        info!(
            root = %self.settings.root,
            store = %self.store.location(),
            interval_secs = self.settings.reconcile_interval.as_secs(),
            "Sync engine starting"
        );

        let watch_task = watcher.map(|watcher| {
            let processor = ChangeEventProcessor::new(self.settings.root.clone(), self.store.clone());
            tokio::spawn(watch_loop(
                watcher,
                processor,
                self.handle.clone(),
                shutdown.clone(),
            ))
        });

        self.handle.tracker().update(|s| {
            if s.state == EngineState::Starting {
                s.state = EngineState::Idle;
            }
        });

        let sweeper = ReconciliationSweeper::new(
            self.settings.root.clone(),
            self.store.clone(),
            self.settings.reconcile_interval,
        );
        sweeper.run(self.handle.clone(), shutdown.clone()).await;

        if let Some(task) = watch_task {
            if let Err(e) = task.await {
                error!(error = %e, "Watcher task panicked");
            }
        }

        self.handle.tracker().update(|s| s.state = EngineState::Stopped);
        info!("Sync engine stopped");
    }
}

/// Feeds watcher events to the processor until shutdown or until the event
/// stream ends.
async fn watch_loop<S: WatchSource>(
    mut watcher: FileSystemWatcher<S>,
    processor: ChangeEventProcessor,
    handle: SyncHandle,
    shutdown: CancellationToken,
) {
    let tracker = handle.tracker().clone();

    if let Err(e) = watcher.start().await {
        error!(error = %e, "File watcher failed to start, relying on periodic sweeps");
        tracker.update(|s| s.watcher = WatcherState::Failed(e.to_string()));
        return;
    }

    let mut watched = watcher.watch_set().len();
    tracker.update(|s| {
        s.watcher = WatcherState::Active;
        s.watched_directories = watched;
    });
    info!(directories = watched, "File watcher active");

    // Quiet periods are flushed by the sweeper's ticks.
    let mut last_flush = Instant::now();

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = watcher.next_event() => event,
        };

        let Some(event) = event else {
            warn!("Change event stream closed");
            tracker.update(|s| s.watcher = WatcherState::Failed("event stream closed".into()));
            return;
        };

        if handle.is_paused() {
            debug!(path = %event.path.display(), kind = %event.kind, "Paused, dropping event");
        } else {
            let outcome = processor.process(&event).await;
            tracker.record_event(&outcome);
            if last_flush.elapsed() >= STATUS_FLUSH_INTERVAL {
                tracker.flush();
                last_flush = Instant::now();
            }
        }

        if watcher.watch_set().len() != watched {
            watched = watcher.watch_set().len();
            tracker.update(|s| s.watched_directories = watched);
        }
    }

    tracker.update(|s| s.watcher = WatcherState::Stopped);
    info!("File watcher stopped");
}

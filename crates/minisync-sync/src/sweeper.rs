//! Reconciliation sweeper
//!
//! The slow path that guarantees eventual convergence. A pass walks the
//! whole local tree, compares every file against the store (`stat`), then
//! lists the store and removes objects whose local file is gone. Whatever
//! the watcher missed (dropped events, rename gaps, failed calls, changes
//! made while paused) is repaired here.
//!
//! A pass is split into [`ReconciliationSweeper::plan_pass`], which only
//! reads, and [`ReconciliationSweeper::apply`], which mutates the store.
//! `minisync sync --dry-run` prints the plan without applying it.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use minisync_core::domain::{
    LocalFileState, RelativeKey, SyncAction, SyncDecision, WatchRoot, KEY_SEPARATOR,
};
use minisync_core::ports::{IObjectStoreClient, StoreError};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::orchestrator::SyncHandle;
use crate::status::EngineState;

// ============================================================================
// Plan and report
// ============================================================================

/// Everything one pass intends to do, in walk order (uploads and skips)
/// followed by listing order (deletes).
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub started_at: DateTime<Utc>,
    pub decisions: Vec<SyncDecision>,
    /// Entries that could not be evaluated (stat or local read failures).
    pub failed: usize,
    pub errors: Vec<String>,
}

impl SweepPlan {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            decisions: Vec::new(),
            failed: 0,
            errors: Vec::new(),
        }
    }

    fn record_failure(&mut self, error: String) {
        self.failed += 1;
        self.errors.push(error);
    }

    pub fn count(&self, action: SyncAction) -> usize {
        self.decisions.iter().filter(|d| d.action == action).count()
    }

    pub fn mutations(&self) -> impl Iterator<Item = &SyncDecision> {
        self.decisions.iter().filter(|d| d.is_mutation())
    }
}

/// Result of one applied pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub uploaded: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// ReconciliationSweeper
// ============================================================================

pub struct ReconciliationSweeper {
    root: WatchRoot,
    store: Arc<dyn IObjectStoreClient>,
    interval: Duration,
}

impl ReconciliationSweeper {
    pub fn new(root: WatchRoot, store: Arc<dyn IObjectStoreClient>, interval: Duration) -> Self {
        Self {
            root,
            store,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Plans and applies one pass.
    pub async fn run_pass(&self) -> SweepReport {
        let plan = self.plan_pass().await;
        self.apply(plan).await
    }

    /// Computes the decisions for one pass without mutating the store.
    #[instrument(skip(self), fields(root = %self.root))]
    pub async fn plan_pass(&self) -> SweepPlan {
        let mut plan = SweepPlan::new();

        if let Err(e) = self.walk_directory(self.root.as_path(), &mut plan).await {
            // Without a complete local view every remote object would look
            // orphaned, so the delete phase is skipped.
            error!(root = %self.root, error = %e, "Cannot read sync root");
            plan.record_failure(format!("{}: {e}", self.root));
            return plan;
        }

        self.plan_deletions(&mut plan).await;

        debug!(
            uploads = plan.count(SyncAction::Upload),
            deletes = plan.count(SyncAction::Delete),
            skips = plan.count(SyncAction::Skip),
            failed = plan.failed,
            "Sweep planned"
        );
        plan
    }

    /// Executes the mutating decisions of `plan`, deletes first. A failed
    /// call is counted and the remaining decisions still run.
    ///
    /// `duration_ms` covers the whole pass, planning included.
    pub async fn apply(&self, plan: SweepPlan) -> SweepReport {
        let mut report = SweepReport {
            started_at: plan.started_at,
            finished_at: plan.started_at,
            duration_ms: 0,
            uploaded: 0,
            deleted: 0,
            skipped: 0,
            failed: plan.failed,
            errors: plan.errors,
        };

        // A stale object may occupy the path an upload needs ("a" versus
        // "a/b.txt") on stores with real directories.
        let (deletes, others): (Vec<_>, Vec<_>) = plan
            .decisions
            .into_iter()
            .partition(|d| d.action == SyncAction::Delete);

        for decision in deletes.into_iter().chain(others) {
            let result = match decision.action {
                SyncAction::Skip => {
                    report.skipped += 1;
                    continue;
                }
                SyncAction::Upload => self.upload(&decision.key).await,
                SyncAction::Delete => self.store.delete(&decision.key).await,
            };

            match result {
                Ok(()) => {
                    info!(key = %decision.key, action = %decision.action, "Sweep applied");
                    match decision.action {
                        SyncAction::Upload => report.uploaded += 1,
                        _ => report.deleted += 1,
                    }
                }
                Err(e) => {
                    warn!(key = %decision.key, action = %decision.action, error = %e, "Sweep action failed");
                    report.failed += 1;
                    report.errors.push(format!("{} {}: {e}", decision.action, decision.key));
                }
            }
        }

        report.finished_at = Utc::now();
        report.duration_ms = (report.finished_at - report.started_at)
            .num_milliseconds()
            .max(0) as u64;
        report
    }

    async fn upload(&self, key: &str) -> Result<(), StoreError> {
        let local = RelativeKey::parse(key)
            .map(|k| k.to_local(&self.root))
            .map_err(|e| StoreError::unavailable("put", key, e))?;
        self.store.put(key, &local).await
    }

    /// Recursively walks `dir`, appending an Upload or Skip decision for
    /// every regular file. Only a failure to read `dir` itself is returned;
    /// unreadable children are logged and counted.
    fn walk_directory<'a>(
        &'a self,
        dir: &'a Path,
        plan: &'a mut SweepPlan,
    ) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = Vec::new();
            let mut reader = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = reader.next_entry().await? {
                entries.push(entry);
            }
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                        plan.record_failure(format!("{}: {e}", path.display()));
                        continue;
                    }
                };

                if file_type.is_dir() {
                    if let Err(e) = self.walk_directory(&path, plan).await {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable directory");
                        plan.record_failure(format!("{}: {e}", path.display()));
                    }
                    continue;
                }

                // Symlinks are followed to regular files only.
                let metadata = match tokio::fs::metadata(&path).await {
                    Ok(m) if m.is_file() => m,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "Entry vanished during walk");
                        continue;
                    }
                };

                self.decide_file(&path, &metadata, plan).await;
            }
            Ok(())
        })
    }

    async fn decide_file(&self, path: &Path, metadata: &std::fs::Metadata, plan: &mut SweepPlan) {
        let key = match RelativeKey::from_local(&self.root, path) {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping file without a valid key");
                plan.record_failure(e.to_string());
                return;
            }
        };
        let local = match LocalFileState::from_metadata(metadata) {
            Ok(state) => state,
            Err(e) => {
                warn!(key = %key, error = %e, "Cannot read modification time");
                plan.record_failure(format!("{key}: {e}"));
                return;
            }
        };

        match self.store.stat(key.as_str()).await {
            Ok(Some(remote)) if local.matches(&remote) => plan.decisions.push(SyncDecision::skip(&key)),
            Ok(_) => plan.decisions.push(SyncDecision::upload(&key)),
            Err(e) => {
                warn!(key = %key, error = %e, "Stat failed, leaving file for next sweep");
                plan.record_failure(format!("stat {key}: {e}"));
            }
        }
    }

    /// Lists every remote object and plans a Delete for each one with no
    /// local counterpart. A listing failure ends the phase early.
    async fn plan_deletions(&self, plan: &mut SweepPlan) {
        let mut objects = self.store.list("");
        while let Some(object) = objects.next().await {
            let object = match object {
                Ok(object) => object,
                Err(e) => {
                    warn!(error = %e, "Listing failed, deletions deferred to next sweep");
                    plan.record_failure(format!("list: {e}"));
                    return;
                }
            };

            match self.local_counterpart_exists(&object.key).await {
                Ok(true) => {}
                Ok(false) => plan.decisions.push(SyncDecision::delete(object.key)),
                Err(e) => {
                    warn!(key = %object.key, error = %e, "Cannot check local path");
                    plan.record_failure(format!("{}: {e}", object.key));
                }
            }
        }
    }

    async fn local_counterpart_exists(&self, key: &str) -> io::Result<bool> {
        // Directory markers ("photos/") are kept while the directory exists.
        if let Some(dir) = key.strip_suffix(KEY_SEPARATOR) {
            return match RelativeKey::parse(dir) {
                Ok(dir) => is_kind(&dir.to_local(&self.root), |m| m.is_dir()).await,
                Err(_) => Ok(false),
            };
        }
        match RelativeKey::parse(key) {
            Ok(key) => is_kind(&key.to_local(&self.root), |m| m.is_file()).await,
            // No local file can ever map to this key.
            Err(_) => Ok(false),
        }
    }

    // ========================================================================
    // Periodic loop
    // ========================================================================

    /// Runs a pass immediately, then on every interval tick and on every
    /// sweep request, until `shutdown` is cancelled. Passes are skipped while
    /// the engine is paused.
    pub async fn run(&self, handle: SyncHandle, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            store = %self.store.location(),
            "Reconciliation sweeper starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => "interval",
                _ = handle.sweep_requested() => "request",
            };

            handle.tracker().flush();

            if handle.is_paused() {
                debug!(trigger, "Paused, skipping sweep");
                continue;
            }

            handle.tracker().update(|s| s.state = EngineState::Sweeping);
            info!(trigger, "Sweep starting");

            let report = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sweep abandoned for shutdown");
                    break;
                }
                report = self.run_pass() => report,
            };

            info!(
                uploaded = report.uploaded,
                deleted = report.deleted,
                skipped = report.skipped,
                failed = report.failed,
                duration_ms = report.duration_ms,
                "Sweep finished"
            );

            handle.tracker().update(|s| {
                if s.state == EngineState::Sweeping {
                    s.state = EngineState::Idle;
                }
                s.sweeps_completed += 1;
                s.last_sweep = Some(report);
            });
        }

        info!("Reconciliation sweeper stopped");
    }
}

async fn is_kind(path: &Path, check: impl FnOnce(&std::fs::Metadata) -> bool) -> io::Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(check(&metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

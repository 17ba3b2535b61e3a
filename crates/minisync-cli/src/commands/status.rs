//! Status command - Display the daemon's mirror status
//!
//! Reads the status file the daemon rewrites on every state change: engine
//! state (idle, sweeping, paused), watcher health, event counters and the
//! result of the last reconciliation sweep.

use std::io::ErrorKind;

use anyhow::{Context, Result};
use clap::Args;
use minisync_sync::{SweepReport, SyncStatus, WatcherState};
use tracing::info;

use super::CommandContext;

/// How many sweep errors the human output lists.
const MAX_ERRORS_SHOWN: usize = 5;

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let status_file = &config.status.file;

        info!(status_file = %status_file.display(), "Reading daemon status");

        let status = match SyncStatus::read_from(status_file) {
            Ok(status) => status,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "running": false,
                        "status_file": status_file.display().to_string(),
                    }));
                } else {
                    formatter.error(&format!(
                        "No status file at {}. Is the daemon running?",
                        status_file.display()
                    ));
                    formatter.info("Start it with: minisync daemon start");
                }
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read status file {}", status_file.display())
                })
            }
        };

        if ctx.format.is_json() {
            let json = serde_json::to_value(&status).context("Failed to serialize status")?;
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!(
            "MiniSync status (updated {})",
            status.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        formatter.field("State", &status.state.to_string());
        formatter.field("Watcher", &describe_watcher(&status));
        formatter.field("Root", &status.root.display().to_string());
        formatter.field("Store", &status.store);
        formatter.field(
            "Events",
            &format!(
                "{} processed, {} failed",
                status.events_processed, status.events_failed
            ),
        );
        formatter.field("Sweeps", &format!("{} completed", status.sweeps_completed));

        match &status.last_sweep {
            Some(report) => {
                formatter.field("Last sweep", &describe_sweep(report));
                for error in report.errors.iter().take(MAX_ERRORS_SHOWN) {
                    formatter.warn(error);
                }
                if report.errors.len() > MAX_ERRORS_SHOWN {
                    formatter.info(&format!(
                        "... and {} more errors",
                        report.errors.len() - MAX_ERRORS_SHOWN
                    ));
                }
            }
            None => formatter.field("Last sweep", "never"),
        }

        Ok(())
    }
}

fn describe_watcher(status: &SyncStatus) -> String {
    match &status.watcher {
        WatcherState::Active => format!("active ({} directories)", status.watched_directories),
        other => other.to_string(),
    }
}

fn describe_sweep(report: &SweepReport) -> String {
    format!(
        "{} ({} ms): {} uploaded, {} deleted, {} unchanged, {} failed",
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.duration_ms,
        report.uploaded,
        report.deleted,
        report.skipped,
        report.failed
    )
}

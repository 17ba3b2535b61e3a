//! Sync command - Run one reconciliation pass in the foreground
//!
//! Connects to the configured bucket and runs the same sweep the daemon runs
//! periodically. With `--dry-run` the pass is only planned and the pending
//! uploads and deletes are listed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use minisync_core::domain::SyncAction;
use minisync_core::ports::IObjectStoreClient;
use minisync_store::S3ObjectStore;
use minisync_sync::{EngineSettings, ReconciliationSweeper, SweepPlan};
use tracing::info;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();

        let config = ctx.load_config()?;
        config.ensure_valid()?;
        let settings = EngineSettings::from_config(&config).context("Invalid sync settings")?;

        let store = S3ObjectStore::connect(&config.store).await;
        info!(location = %store.location(), root = %settings.root, "Running reconciliation pass");
        store
            .ensure_bucket()
            .await
            .context("Object store is not reachable")?;

        let sweeper = ReconciliationSweeper::new(
            settings.root.clone(),
            Arc::new(store),
            Duration::from_secs(config.sync.reconcile_interval),
        );

        let plan = sweeper.plan_pass().await;

        if self.dry_run {
            if ctx.format.is_json() {
                formatter.print_json(&plan_json(&plan));
            } else {
                formatter.success("Dry run (no changes made)");
                for decision in plan.mutations() {
                    formatter.info(&format!("{:<8}{}", decision.action.to_string(), decision.key));
                }
                formatter.info(&format!(
                    "{} to upload, {} to delete, {} unchanged, {} failed",
                    plan.count(SyncAction::Upload),
                    plan.count(SyncAction::Delete),
                    plan.count(SyncAction::Skip),
                    plan.failed
                ));
                for error in &plan.errors {
                    formatter.warn(error);
                }
            }
            return Ok(());
        }

        let report = sweeper.apply(plan).await;

        if ctx.format.is_json() {
            let json = serde_json::to_value(&report).context("Failed to serialize sweep report")?;
            formatter.print_json(&json);
        } else {
            if report.is_clean() {
                formatter.success("Mirror is up to date");
            } else {
                formatter.error(&format!("{} operations failed", report.failed));
            }
            formatter.field("Uploaded", &report.uploaded.to_string());
            formatter.field("Deleted", &report.deleted.to_string());
            formatter.field("Unchanged", &report.skipped.to_string());
            formatter.field("Duration", &format!("{} ms", report.duration_ms));
            for error in &report.errors {
                formatter.warn(error);
            }
        }

        Ok(())
    }
}

fn plan_json(plan: &SweepPlan) -> serde_json::Value {
    let pending: Vec<_> = plan.mutations().collect();
    serde_json::json!({
        "dry_run": true,
        "pending": pending,
        "uploads": plan.count(SyncAction::Upload),
        "deletes": plan.count(SyncAction::Delete),
        "unchanged": plan.count(SyncAction::Skip),
        "failed": plan.failed,
        "errors": plan.errors,
    })
}

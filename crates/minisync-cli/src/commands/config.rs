//! Config command - View and manage MiniSync configuration
//!
//! - `show` prints the effective configuration (file plus `MINISYNC_*`
//!   overrides) with credentials masked
//! - `validate` reports every problem at once
//! - `init` writes a commented starter file

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use minisync_core::config::{
    Config, ENV_ACCESS_KEY, ENV_BACKUP_FOLDER, ENV_BUCKET, ENV_ENDPOINT, ENV_FREQUENCY,
    ENV_LOG_FOLDER, ENV_SECRET_KEY,
};
use tracing::info;

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration (secrets masked)
    Show,
    /// Validate the configuration
    Validate,
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
            ConfigCommand::Init { force } => execute_init(ctx, *force),
        }
    }
}

fn execute_show(ctx: &CommandContext) -> Result<()> {
    let formatter = ctx.formatter();
    let config_path = ctx.config_path();
    let config = ctx.load_config()?.redacted();

    info!(config_path = %config_path.display(), "Showing configuration");

    if ctx.format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        let source = if config_path.exists() {
            config_path.display().to_string()
        } else {
            "defaults, no file found".to_string()
        };
        formatter.success(&format!("Configuration ({source})"));
        formatter.info("");
        for line in config.to_yaml()?.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

fn execute_validate(ctx: &CommandContext) -> Result<()> {
    let formatter = ctx.formatter();
    let config_path = ctx.config_path();

    let config = match ctx.load_config() {
        Ok(config) => config,
        Err(e) => {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("{e:#}")],
                }));
            } else {
                formatter.error(&format!("{e:#}"));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors = config.validate();

    if ctx.format.is_json() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    Ok(())
}

fn execute_init(ctx: &CommandContext, force: bool) -> Result<()> {
    let formatter = ctx.formatter();
    let config_path = ctx.config_path();

    write_template(&config_path, force)?;

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Wrote {}", config_path.display()));
        formatter.info("Fill in store.access_key and store.secret_key, then run:");
        formatter.info("  minisync config validate");
    }
    Ok(())
}

fn write_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    std::fs::write(path, default_config_template())
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Starter configuration with every default spelled out.
fn default_config_template() -> String {
    let defaults = Config::default();
    format!(
        "# MiniSync configuration
#
# Every value can be overridden from the environment:
#   {ENV_BACKUP_FOLDER}, {ENV_LOG_FOLDER}, {ENV_ENDPOINT},
#   {ENV_BUCKET}, {ENV_FREQUENCY},
#   {ENV_ACCESS_KEY}, {ENV_SECRET_KEY}

sync:
  # Local directory mirrored into the bucket (must exist)
  root: {root}
  # Seconds between full reconciliation sweeps
  reconcile_interval: {interval}

store:
  # S3-compatible endpoint; a bare host:port means plain HTTP
  endpoint: {endpoint}
  bucket: {bucket}
  region: {region}
  access_key: \"\"
  secret_key: \"\"
  force_path_style: {path_style}

logging:
  # trace | debug | info | warn | error
  level: {level}
  # pretty | json
  format: {format}
  # Append to this file instead of stderr
  # file: /var/log/minisync/MiniSync.log

status:
  # Written by the daemon, read by `minisync status`
  file: {status}
",
        root = defaults.sync.root.display(),
        interval = defaults.sync.reconcile_interval,
        endpoint = defaults.store.endpoint,
        bucket = defaults.store.bucket,
        region = defaults.store.region,
        path_style = defaults.store.force_path_style,
        level = defaults.logging.level,
        format = defaults.logging.format,
        status = defaults.status.file.display(),
    )
}

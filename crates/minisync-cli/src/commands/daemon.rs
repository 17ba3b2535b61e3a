//! Daemon management commands
//!
//! Controls `minisyncd` as a systemd user service (`minisync.service`).
//! Pause and resume are delivered as SIGUSR1 / SIGUSR2 through
//! `systemctl --user kill`.
//!
//! The service lifecycle is a small state machine ([`transition`]); every
//! command checks it against the observed state before touching systemd, so
//! an invalid request (pausing a stopped daemon, installing twice) fails
//! with a clear message instead of a systemctl error.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use clap::Subcommand;
use minisync_sync::{EngineState, SyncStatus};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::CommandContext;

/// Service unit name for the MiniSync daemon
const SYSTEMD_UNIT: &str = "minisync.service";

// ============================================================================
// Service state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    NotInstalled,
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::NotInstalled => "not installed",
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Paused => "paused",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    Install,
    Uninstall,
    Start,
    Stop,
    Pause,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("the service is not installed (run 'minisync daemon install')")]
    NotInstalled,
    #[error("the service is already installed")]
    AlreadyInstalled,
    #[error("the daemon is not running")]
    NotRunning,
    #[error("the daemon is already running")]
    AlreadyRunning,
    #[error("the daemon is already paused")]
    AlreadyPaused,
    #[error("the daemon is not paused")]
    NotPaused,
}

/// Next state of the service after `command`, or why `command` is not
/// allowed in `state`.
pub fn transition(
    state: ServiceState,
    command: ServiceCommand,
) -> Result<ServiceState, TransitionError> {
    use ServiceCommand as C;
    use ServiceState as S;

    match (state, command) {
        (S::NotInstalled, C::Install) => Ok(S::Stopped),
        (_, C::Install) => Err(TransitionError::AlreadyInstalled),
        (S::NotInstalled, _) => Err(TransitionError::NotInstalled),

        (_, C::Uninstall) => Ok(S::NotInstalled),

        (S::Stopped, C::Start) => Ok(S::Running),
        (_, C::Start) => Err(TransitionError::AlreadyRunning),

        (S::Running | S::Paused, C::Stop) => Ok(S::Stopped),
        (_, C::Stop) => Err(TransitionError::NotRunning),

        (S::Running, C::Pause) => Ok(S::Paused),
        (S::Paused, C::Pause) => Err(TransitionError::AlreadyPaused),
        (_, C::Pause) => Err(TransitionError::NotRunning),

        (S::Paused, C::Resume) => Ok(S::Running),
        (S::Running, C::Resume) => Err(TransitionError::NotPaused),
        (_, C::Resume) => Err(TransitionError::NotRunning),
    }
}

/// Combines what systemd and the daemon's status file report.
fn observe(unit_installed: bool, unit_active: bool, engine: Option<EngineState>) -> ServiceState {
    match (unit_installed, unit_active, engine) {
        (false, _, _) => ServiceState::NotInstalled,
        (true, false, _) => ServiceState::Stopped,
        (true, true, Some(EngineState::Paused)) => ServiceState::Paused,
        (true, true, _) => ServiceState::Running,
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Manage the MiniSync background daemon
#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Install and enable the systemd user unit
    Install,
    /// Stop, disable and remove the systemd user unit
    Uninstall,
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Pause mirroring (SIGUSR1)
    Pause,
    /// Resume mirroring and run a catch-up sweep (SIGUSR2)
    Resume,
    /// Show the service state
    Status,
}

impl DaemonCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let service = SystemdService::new(ctx);
        let current = service.observe();

        let command = match self {
            DaemonCommand::Status => return show_status(ctx, current),
            DaemonCommand::Install => ServiceCommand::Install,
            DaemonCommand::Uninstall => ServiceCommand::Uninstall,
            DaemonCommand::Start => ServiceCommand::Start,
            DaemonCommand::Stop => ServiceCommand::Stop,
            DaemonCommand::Pause => ServiceCommand::Pause,
            DaemonCommand::Resume => ServiceCommand::Resume,
        };

        let formatter = ctx.formatter();
        let next = match checked_transition(current, command) {
            Ok(next) => next,
            Err(e) => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "state": current,
                        "error": format!("{e:#}"),
                    }));
                }
                return Err(e);
            }
        };

        info!(?command, from = %current, to = %next, "Changing daemon state");
        service.apply(command)?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "state": next,
            }));
        } else {
            formatter.success(&format!("MiniSync daemon is now {next}"));
        }
        Ok(())
    }
}

/// [`transition`] as a command error, so a refused command exits non-zero.
fn checked_transition(current: ServiceState, command: ServiceCommand) -> Result<ServiceState> {
    transition(current, command).with_context(|| {
        format!("Cannot {} the daemon", format!("{command:?}").to_lowercase())
    })
}

fn show_status(ctx: &CommandContext, state: ServiceState) -> Result<()> {
    let formatter = ctx.formatter();
    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "unit": SYSTEMD_UNIT,
            "state": state,
        }));
        return Ok(());
    }
    match state {
        ServiceState::Running => formatter.success("MiniSync daemon is running"),
        ServiceState::Paused => formatter.warn("MiniSync daemon is paused"),
        ServiceState::Stopped => formatter.info("MiniSync daemon is stopped"),
        ServiceState::NotInstalled => {
            formatter.info("MiniSync daemon is not installed");
            formatter.info("Run: minisync daemon install");
        }
    }
    Ok(())
}

// ============================================================================
// systemd
// ============================================================================

struct SystemdService {
    unit_path: PathBuf,
    status_file: Option<PathBuf>,
    config_path: PathBuf,
}

impl SystemdService {
    fn new(ctx: &CommandContext) -> Self {
        let unit_path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("systemd")
            .join("user")
            .join(SYSTEMD_UNIT);
        let status_file = ctx.load_config().ok().map(|c| c.status.file);
        Self {
            unit_path,
            status_file,
            config_path: ctx.config_path(),
        }
    }

    fn observe(&self) -> ServiceState {
        let installed = self.unit_path.exists();
        let active = installed && systemctl_quiet(&["is-active", "--quiet", SYSTEMD_UNIT]);
        let engine = self
            .status_file
            .as_deref()
            .and_then(|p| SyncStatus::read_from(p).ok())
            .map(|s| s.state);
        observe(installed, active, engine)
    }

    fn apply(&self, command: ServiceCommand) -> Result<()> {
        match command {
            ServiceCommand::Install => {
                let binary = daemon_binary()?;
                if let Some(parent) = self.unit_path.parent() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create systemd user unit directory")?;
                }
                std::fs::write(&self.unit_path, unit_file(&binary, &self.config_path))
                    .with_context(|| format!("Failed to write {}", self.unit_path.display()))?;
                systemctl(&["daemon-reload"])?;
                systemctl(&["enable", SYSTEMD_UNIT])
            }
            ServiceCommand::Uninstall => {
                // Stopping an inactive unit is harmless.
                systemctl_quiet(&["stop", SYSTEMD_UNIT]);
                systemctl_quiet(&["disable", SYSTEMD_UNIT]);
                std::fs::remove_file(&self.unit_path)
                    .with_context(|| format!("Failed to remove {}", self.unit_path.display()))?;
                systemctl(&["daemon-reload"])
            }
            ServiceCommand::Start => systemctl(&["start", SYSTEMD_UNIT]),
            ServiceCommand::Stop => systemctl(&["stop", SYSTEMD_UNIT]),
            ServiceCommand::Pause => systemctl(&["kill", "--signal=SIGUSR1", SYSTEMD_UNIT]),
            ServiceCommand::Resume => systemctl(&["kill", "--signal=SIGUSR2", SYSTEMD_UNIT]),
        }
    }
}

/// `minisyncd` next to the running `minisync` binary.
fn daemon_binary() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Cannot locate the minisync executable")?;
    let binary = exe.with_file_name("minisyncd");
    if !binary.exists() {
        anyhow::bail!("minisyncd not found next to {}", exe.display());
    }
    Ok(binary)
}

fn unit_file(binary: &std::path::Path, config: &std::path::Path) -> String {
    format!(
        "[Unit]
Description=MiniSync folder mirror
After=network-online.target

[Service]
Type=simple
ExecStart={} --config {}
ExecReload=/bin/kill -HUP $MAINPID
Restart=on-failure
RestartSec=5

[Install]
WantedBy=default.target
",
        binary.display(),
        config.display()
    )
}

fn systemctl(args: &[&str]) -> Result<()> {
    let output = Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .context("Failed to execute systemctl. Is systemd available?")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("systemctl --user {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(())
}

fn systemctl_quiet(args: &[&str]) -> bool {
    Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

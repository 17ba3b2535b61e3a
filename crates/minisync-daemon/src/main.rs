//! MiniSync Daemon - Background mirroring service
//!
//! This binary runs as a systemd user service and:
//! - Mirrors the configured sync root into an S3-compatible bucket
//! - Publishes its status to the status file read by `minisync status`
//! - Handles SIGTERM/SIGINT (stop), SIGUSR1 (pause), SIGUSR2 (resume) and
//!   SIGHUP (sweep now)
//!
//! # Architecture
//!
//! Configuration is loaded and validated before anything else; any problem
//! there, or an unreachable bucket, ends the process with an error. After
//! that the daemon hands control to the [`SyncOrchestrator`] and waits for a
//! shutdown signal.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use minisync_core::config::{Config, LoggingConfig};
use minisync_core::ports::IObjectStoreClient;
use minisync_store::S3ObjectStore;
use minisync_sync::{EngineSettings, SyncHandle, SyncOrchestrator};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// How long in-flight work may take to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "minisyncd", version, about = "MiniSync mirroring daemon")]
struct Args {
    /// Path to config file (defaults to ~/.config/minisync/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

// ============================================================================
// DaemonService
// ============================================================================

struct DaemonService {
    config: Config,
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Connects to the store, then runs the engine until shutdown.
    async fn run(&self) -> Result<()> {
        let settings =
            EngineSettings::from_config(&self.config).context("Invalid sync settings")?;

        let store = S3ObjectStore::connect(&self.config.store).await;
        info!(
            endpoint = %self.config.store.endpoint_url(),
            bucket = %store.bucket(),
            "Connecting to object store"
        );
        store
            .ensure_bucket()
            .await
            .context("Object store is not reachable")?;

        let orchestrator = SyncOrchestrator::new(settings, Arc::new(store))
            .with_status_file(&self.config.status.file);
        let handle = orchestrator.handle();

        spawn_signal_handler(handle, self.shutdown.clone())?;

        drive_engine(orchestrator, self.shutdown.clone(), SHUTDOWN_GRACE).await
    }
}

/// Runs the engine until `shutdown`, then gives it `grace` to finish the
/// call in flight before aborting it.
async fn drive_engine(
    orchestrator: SyncOrchestrator,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let mut engine = tokio::spawn(orchestrator.run(shutdown.clone()));

    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = &mut engine => {
            // The engine only returns after cancellation.
            if let Err(e) = result {
                anyhow::bail!("Sync engine terminated unexpectedly: {e}");
            }
            return Ok(());
        }
    }

    info!(grace_secs = grace.as_secs(), "Shutting down");
    match tokio::time::timeout(grace, &mut engine).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Sync engine task failed"),
        Err(_) => {
            warn!("Sync engine did not stop in time, aborting");
            engine.abort();
        }
    }
    Ok(())
}

// ============================================================================
// Signals
// ============================================================================

/// Installs the signal handlers and drives `handle` from them. Installation
/// errors are returned immediately; the handler itself runs in a task.
#[cfg(unix)]
fn spawn_signal_handler(handle: SyncHandle, shutdown: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut pause = signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let mut resume = signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;
    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    info!("Received SIGINT (Ctrl+C)");
                    break;
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = pause.recv() => {
                    info!("Received SIGUSR1");
                    handle.pause();
                }
                _ = resume.recv() => {
                    info!("Received SIGUSR2");
                    handle.resume();
                }
                _ = hangup.recv() => {
                    info!("Received SIGHUP");
                    handle.request_sweep();
                }
                _ = shutdown.cancelled() => return,
            }
        }
        shutdown.cancel();
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_handler(_handle: SyncHandle, shutdown: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
        shutdown.cancel();
    });
    Ok(())
}

// ============================================================================
// Logging
// ============================================================================

/// Filter from `RUST_LOG` when set, else from the configured level.
fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let (writer, ansi) = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(logging))
        .with_target(true)
        .with_writer(writer);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.with_ansi(ansi).init();
    }
    Ok(())
}

// ============================================================================
// Main entry point
// ============================================================================

fn load_config(args: &Args) -> Result<Config> {
    let config = Config::load_with_overrides(args.config.as_deref(), |name| std::env::var(name).ok())?;
    config.ensure_valid()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        root = %config.sync.root.display(),
        "MiniSync daemon starting (minisyncd)"
    );

    let shutdown = CancellationToken::new();
    let service = DaemonService::new(config, shutdown);
    let result = service.run().await;

    match &result {
        Ok(()) => info!("MiniSync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "MiniSync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

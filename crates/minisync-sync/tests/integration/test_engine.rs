//! Full engine runs against the real OS notification backend.

use std::time::Duration;

use minisync_sync::{EngineSettings, EngineState, SyncOrchestrator, WatcherState};
use tokio_util::sync::CancellationToken;

use crate::common::{eventually, exists, Mirror};

#[tokio::test]
async fn test_file_lifecycle_is_mirrored() {
    let mirror = Mirror::new();
    mirror.write("before.txt", b"existing");

    let settings = EngineSettings::new(mirror.root.clone(), Duration::from_secs(3600));
    let orchestrator = SyncOrchestrator::new(settings, mirror.store.clone());
    let handle = orchestrator.handle();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(shutdown.clone()));

    eventually(|| async { handle.status().watcher == WatcherState::Active }).await;
    eventually(|| async { handle.status().sweeps_completed == 1 }).await;
    assert!(exists(&mirror.bucket_file("before.txt")));

    // Create, then modify, then delete a file.
    mirror.write("live.txt", b"v1");
    eventually(|| async { exists(&mirror.bucket_file("live.txt")) }).await;

    mirror.write("live.txt", b"version two");
    eventually(|| async {
        std::fs::read(mirror.bucket_file("live.txt")).map(|b| b == b"version two").unwrap_or(false)
    })
    .await;

    std::fs::remove_file(mirror.path("live.txt")).unwrap();
    eventually(|| async { !exists(&mirror.bucket_file("live.txt")) }).await;

    shutdown.cancel();
    task.await.unwrap();
    assert_eq!(handle.status().state, EngineState::Stopped);
}

#[tokio::test]
async fn test_new_directory_is_watched_and_removal_cascades() {
    let mirror = Mirror::new();
    let settings = EngineSettings::new(mirror.root.clone(), Duration::from_secs(3600));
    let orchestrator = SyncOrchestrator::new(settings, mirror.store.clone());
    let handle = orchestrator.handle();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(shutdown.clone()));

    eventually(|| async { handle.status().watcher == WatcherState::Active }).await;
    eventually(|| async { handle.status().sweeps_completed == 1 }).await;

    std::fs::create_dir(mirror.path("projects")).unwrap();
    eventually(|| async { handle.status().watched_directories == 2 }).await;

    mirror.write("projects/plan.md", b"plan");
    eventually(|| async { exists(&mirror.bucket_file("projects/plan.md")) }).await;

    std::fs::remove_dir_all(mirror.path("projects")).unwrap();
    eventually(|| async { mirror.keys().await.is_empty() }).await;
    eventually(|| async { handle.status().watched_directories == 1 }).await;

    shutdown.cancel();
    task.await.unwrap();
}

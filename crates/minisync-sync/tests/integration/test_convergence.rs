use std::time::Duration;

use minisync_core::domain::{ChangeEvent, ChangeKind, SyncAction};
use minisync_core::ports::IObjectStoreClient;
use minisync_sync::{ChangeEventProcessor, ReconciliationSweeper};

use crate::common::Mirror;

fn sweeper(mirror: &Mirror) -> ReconciliationSweeper {
    ReconciliationSweeper::new(mirror.root.clone(), mirror.store.clone(), Duration::from_secs(60))
}

#[tokio::test]
async fn test_sweep_converges_tree_and_removes_orphans() {
    let mirror = Mirror::new();
    mirror.write("a.txt", b"alpha");
    mirror.write("docs/2024/report.pdf", b"pdf");
    mirror.write("docs/notes.md", b"# notes");

    // Orphan left over from a file deleted while the daemon was down.
    let orphan_src = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(orphan_src.path(), b"gone").unwrap();
    mirror.store.put("old/gone.txt", orphan_src.path()).await.unwrap();

    let report = sweeper(&mirror).run_pass().await;

    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.uploaded, 3);
    assert_eq!(report.deleted, 1);
    assert_eq!(
        mirror.keys().await,
        vec!["a.txt", "docs/2024/report.pdf", "docs/notes.md"]
    );
    assert_eq!(std::fs::read(mirror.bucket_file("docs/notes.md")).unwrap(), b"# notes");
}

#[tokio::test]
async fn test_file_replaced_by_directory_converges_in_one_pass() {
    let mirror = Mirror::new();
    let old_src = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(old_src.path(), b"was a file").unwrap();
    mirror.store.put("a", old_src.path()).await.unwrap();

    // Locally "a" is now a directory.
    mirror.write("a/b.txt", b"beta");

    let report = sweeper(&mirror).run_pass().await;

    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.uploaded, 1);
    assert_eq!(mirror.keys().await, vec!["a/b.txt"]);
}

#[tokio::test]
async fn test_second_sweep_changes_nothing() {
    let mirror = Mirror::new();
    mirror.write("a.txt", b"alpha");
    mirror.write("b/c.txt", b"gamma");
    let sweeper = sweeper(&mirror);
    sweeper.run_pass().await;

    let plan = sweeper.plan_pass().await;

    assert_eq!(plan.mutations().count(), 0);
    assert_eq!(plan.count(SyncAction::Skip), 2);
}

#[tokio::test]
async fn test_sweep_heals_rename_gap() {
    let mirror = Mirror::new();
    let processor = ChangeEventProcessor::new(mirror.root.clone(), mirror.store.clone());
    let old = mirror.write("draft.txt", b"text");
    processor.process(&ChangeEvent::file(&old, ChangeKind::Created)).await;

    // Rename whose "Created" half never arrives.
    let new = mirror.path("final.txt");
    std::fs::rename(&old, &new).unwrap();
    processor.process(&ChangeEvent::file(&old, ChangeKind::Renamed)).await;
    assert!(mirror.keys().await.is_empty());

    let report = sweeper(&mirror).run_pass().await;

    assert_eq!(report.uploaded, 1);
    assert_eq!(mirror.keys().await, vec!["final.txt"]);
}

#[tokio::test]
async fn test_directory_removal_event_cascades() {
    let mirror = Mirror::new();
    mirror.write("photos/1.jpg", b"1");
    mirror.write("photos/2024/2.jpg", b"2");
    mirror.write("photos.txt", b"sibling");
    sweeper(&mirror).run_pass().await;

    std::fs::remove_dir_all(mirror.path("photos")).unwrap();
    let processor = ChangeEventProcessor::new(mirror.root.clone(), mirror.store.clone());
    processor
        .process(&ChangeEvent::directory(mirror.path("photos"), ChangeKind::Removed))
        .await;

    assert_eq!(mirror.keys().await, vec!["photos.txt"]);
}

#[tokio::test]
async fn test_dry_run_plan_leaves_bucket_untouched() {
    let mirror = Mirror::new();
    mirror.write("new.txt", b"n");

    let plan = sweeper(&mirror).plan_pass().await;

    assert_eq!(plan.count(SyncAction::Upload), 1);
    assert!(mirror.keys().await.is_empty());
    assert!(!mirror.bucket_file("new.txt").exists());
}

//! Filesystem watching
//!
//! Turns OS change notifications into one ordered [`ChangeEvent`] stream for
//! everything under the watch root.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue / ...
//!       │
//!       ▼
//!  NotifyWatchSource  ──→  FileSystemWatcher  ──→  ChangeEventProcessor
//!   (WatchSource)           (WatchSet, dynamic
//!                            subscriptions)
//! ```
//!
//! Directories are the unit of subscription: every directory gets its own
//! non-recursive watch and file events are reported by the parent's watch.
//! The platform binding only knows how to subscribe one directory and hand
//! back events; extending the watch set when directories appear is the job
//! of [`FileSystemWatcher`].
//!
//! There is a window between a directory being created and its subscription
//! during which events inside it are missed. The reconciliation sweep
//! repairs whatever falls into that window.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use minisync_core::domain::{ChangeEvent, ChangeKind, WatchRoot};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::SyncError;

/// Capacity of the channel between the notify callback and the engine.
const EVENT_CHANNEL_CAPACITY: usize = 4096;

// ============================================================================
// WatchSource capability
// ============================================================================

/// Platform binding for directory change notifications.
#[async_trait]
pub trait WatchSource: Send {
    /// Start receiving events for the entries directly inside `dir`.
    fn subscribe(&mut self, dir: &Path) -> Result<(), SyncError>;

    /// Next event in OS order, or `None` once the source has shut down.
    async fn next_event(&mut self) -> Option<ChangeEvent>;
}

// ============================================================================
// NotifyWatchSource
// ============================================================================

/// [`WatchSource`] backed by the `notify` crate (inotify on Linux).
pub struct NotifyWatchSource {
    watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<ChangeEvent>,
}

impl NotifyWatchSource {
    /// Creates the OS watcher. No directory is watched until `subscribe`.
    ///
    /// # Errors
    /// Returns `SyncError::WatcherUnavailable` if the backend cannot be
    /// initialised (e.g. inotify instance limit reached).
    pub fn new() -> Result<Self, SyncError> {
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for change in map_notify_event(&event) {
                        if let Err(e) = event_tx.blocking_send(change) {
                            warn!(error = %e, "Failed to send change event (receiver dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| SyncError::WatcherUnavailable(e.to_string()))?;

        Ok(Self { watcher, event_rx })
    }
}

#[async_trait]
impl WatchSource for NotifyWatchSource {
    fn subscribe(&mut self, dir: &Path) -> Result<(), SyncError> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| SyncError::WatchSubscriptionFailed {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })
    }

    async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.event_rx.recv().await
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Converts a `notify::Event` into zero or more [`ChangeEvent`]s.
///
/// - `Create(*)` → `Created`
/// - `Modify(Data | Metadata | Any | Other)` → `Modified`
/// - `Remove(*)` → `Removed`
/// - `Modify(Name(From))` → `Renamed` (old path)
/// - `Modify(Name(To))` → `Created` (new path)
/// - `Modify(Name(Both))` → nothing; its halves were already reported
/// - `Modify(Name(Any | Other))` → `Created` if the path exists, else `Renamed`
/// - `Access(*)` and `Other` → nothing
///
/// `is_directory` is taken from the event kind when it says `Folder`, and
/// otherwise probed on disk for paths that still exist. Removed paths are
/// refined later against the watch set.
pub(crate) fn map_notify_event(event: &notify::Event) -> Vec<ChangeEvent> {
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Renamed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            debug!(paths = ?event.paths, "Ignoring paired rename notification");
            return Vec::new();
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            return event
                .paths
                .iter()
                .map(|path| {
                    if path.exists() {
                        ChangeEvent::new(path.clone(), ChangeKind::Created, path.is_dir())
                    } else {
                        ChangeEvent::file(path.clone(), ChangeKind::Renamed)
                    }
                })
                .collect();
        }
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            return Vec::new();
        }
    };

    let folder_hint = matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    );

    event
        .paths
        .iter()
        .map(|path| {
            let is_directory = folder_hint
                || (matches!(kind, ChangeKind::Created | ChangeKind::Modified) && path.is_dir());
            debug!(path = %path.display(), %kind, is_directory, "Mapped notify event");
            ChangeEvent::new(path.clone(), kind, is_directory)
        })
        .collect()
}

// ============================================================================
// FileSystemWatcher
// ============================================================================

/// Maintains the watch set over a [`WatchSource`] and yields change events
/// for everything under the watch root.
///
/// A `Removed`/`Renamed` event for a watched path is flagged as a directory
/// event, since the path no longer exists on disk, and the path and
/// everything beneath it leave the watch set. A file later created under the
/// same name is then treated as a file.
pub struct FileSystemWatcher<S> {
    root: WatchRoot,
    source: S,
    watch_set: BTreeSet<PathBuf>,
}

impl<S: WatchSource> FileSystemWatcher<S> {
    pub fn new(root: WatchRoot, source: S) -> Self {
        Self {
            root,
            source,
            watch_set: BTreeSet::new(),
        }
    }

    /// Subscribes the watch root and every directory beneath it.
    ///
    /// # Errors
    /// Any failure here is fatal for the watcher: the tree cannot be
    /// enumerated or a directory cannot be subscribed.
    pub async fn start(&mut self) -> Result<(), SyncError> {
        info!(root = %self.root, "Subscribing watch root");

        let directories = collect_directories(self.root.as_path())
            .await
            .map_err(|e| SyncError::WatchSubscriptionFailed {
                path: self.root.as_path().to_path_buf(),
                message: e.to_string(),
            })?;

        for dir in directories {
            self.source.subscribe(&dir)?;
            self.watch_set.insert(dir);
        }

        info!(directories = self.watch_set.len(), "Watch established");
        Ok(())
    }

    /// Currently subscribed directories.
    pub fn watch_set(&self) -> &BTreeSet<PathBuf> {
        &self.watch_set
    }

    pub fn root(&self) -> &WatchRoot {
        &self.root
    }

    /// Waits for the next event, extending the watch set when a directory
    /// is created. Returns `None` once the source has shut down.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        let mut event = self.source.next_event().await?;

        match event.kind {
            ChangeKind::Created if event.is_directory => {
                self.subscribe_new_tree(&event.path).await;
            }
            ChangeKind::Removed | ChangeKind::Renamed => {
                let watched = self.watch_set.contains(&event.path);
                if watched || event.is_directory {
                    self.watch_set.retain(|p| !p.starts_with(&event.path));
                }
                if watched {
                    event.is_directory = true;
                }
            }
            _ => {}
        }

        Some(event)
    }

    /// Subscribes a freshly created directory and any directories already
    /// inside it (a tree moved in from elsewhere arrives fully formed).
    ///
    /// Each directory is subscribed before its children are read, so
    /// entries created while a large tree is being walked are still
    /// reported. Paths already in the watch set are subscribed again: a
    /// directory removed and recreated under the same name has lost its OS
    /// watch.
    async fn subscribe_new_tree(&mut self, dir: &Path) {
        if !self.root.contains(dir) {
            warn!(path = %dir.display(), "Created directory outside watch root, not subscribing");
            return;
        }

        let mut pending = VecDeque::from([dir.to_path_buf()]);
        while let Some(path) = pending.pop_front() {
            match self.source.subscribe(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Subscribed new directory");
                    self.watch_set.insert(path.clone());
                }
                Err(e) => {
                    warn!(error = %e, "Skipping directory; sweep will cover its contents");
                }
            }

            match child_directories(&path).await {
                Ok(children) => pending.extend(children),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot enumerate new directory");
                }
            }
        }
    }
}

/// `dir` followed by every directory beneath it, parents before children.
/// Symlinked directories are not followed.
async fn collect_directories(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = vec![dir.to_path_buf()];
    let mut index = 0;

    while index < found.len() {
        let children = child_directories(&found[index]).await?;
        index += 1;
        found.extend(children);
    }

    Ok(found)
}

/// Directories directly inside `dir`, sorted.
async fn child_directories(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            children.push(entry.path());
        }
    }
    children.sort();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use notify::event::{AccessKind, DataChange, MetadataKind};

    use super::*;

    // -- Scripted source --

    #[derive(Clone, Default)]
    struct ScriptedSource {
        events: Arc<Mutex<VecDeque<ChangeEvent>>>,
        subscribed: Arc<Mutex<Vec<PathBuf>>>,
        refuse: Arc<Mutex<HashSet<PathBuf>>>,
        /// (subscribed dir, dir to create) to simulate activity mid-walk.
        create_on_subscribe: Arc<Mutex<Option<(PathBuf, PathBuf)>>>,
    }

    impl ScriptedSource {
        fn push(&self, event: ChangeEvent) {
            self.events.lock().unwrap().push_back(event);
        }

        fn refuse(&self, path: PathBuf) {
            self.refuse.lock().unwrap().insert(path);
        }

        fn create_on_subscribe(&self, trigger: PathBuf, create: PathBuf) {
            *self.create_on_subscribe.lock().unwrap() = Some((trigger, create));
        }

        fn subscribed(&self) -> Vec<PathBuf> {
            self.subscribed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WatchSource for ScriptedSource {
        fn subscribe(&mut self, dir: &Path) -> Result<(), SyncError> {
            if self.refuse.lock().unwrap().contains(dir) {
                return Err(SyncError::WatchSubscriptionFailed {
                    path: dir.to_path_buf(),
                    message: "refused".into(),
                });
            }
            self.subscribed.lock().unwrap().push(dir.to_path_buf());
            if let Some((trigger, create)) = &*self.create_on_subscribe.lock().unwrap() {
                if trigger == dir {
                    std::fs::create_dir_all(create).unwrap();
                }
            }
            Ok(())
        }

        async fn next_event(&mut self) -> Option<ChangeEvent> {
            self.events.lock().unwrap().pop_front()
        }
    }

    fn tree() -> (tempfile::TempDir, WatchRoot) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::create_dir_all(dir.path().join("c")).unwrap();
        std::fs::write(dir.path().join("a/file.txt"), b"x").unwrap();
        let root = WatchRoot::new(dir.path()).unwrap();
        (dir, root)
    }

    fn notify_event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    // -- Event mapping --

    #[test]
    fn test_map_create_event() {
        let mapped = map_notify_event(&notify_event(
            EventKind::Create(CreateKind::File),
            "/nonexistent/new.txt",
        ));
        assert_eq!(
            mapped,
            vec![ChangeEvent::file("/nonexistent/new.txt", ChangeKind::Created)]
        );
    }

    #[test]
    fn test_map_create_folder_event() {
        let mapped = map_notify_event(&notify_event(
            EventKind::Create(CreateKind::Folder),
            "/nonexistent/dir",
        ));
        assert_eq!(
            mapped,
            vec![ChangeEvent::directory("/nonexistent/dir", ChangeKind::Created)]
        );
    }

    #[test]
    fn test_map_modify_events() {
        for kind in [
            ModifyKind::Data(DataChange::Content),
            ModifyKind::Metadata(MetadataKind::WriteTime),
            ModifyKind::Any,
        ] {
            let mapped = map_notify_event(&notify_event(EventKind::Modify(kind), "/x/f"));
            assert_eq!(mapped, vec![ChangeEvent::file("/x/f", ChangeKind::Modified)]);
        }
    }

    #[test]
    fn test_map_remove_event() {
        let mapped = map_notify_event(&notify_event(EventKind::Remove(RemoveKind::Any), "/x/gone"));
        assert_eq!(mapped, vec![ChangeEvent::file("/x/gone", ChangeKind::Removed)]);

        let mapped =
            map_notify_event(&notify_event(EventKind::Remove(RemoveKind::Folder), "/x/dir"));
        assert_eq!(mapped, vec![ChangeEvent::directory("/x/dir", ChangeKind::Removed)]);
    }

    #[test]
    fn test_map_rename_halves() {
        let from = map_notify_event(&notify_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            "/x/a.txt",
        ));
        assert_eq!(from, vec![ChangeEvent::file("/x/a.txt", ChangeKind::Renamed)]);

        let to = map_notify_event(&notify_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            "/x/b.txt",
        ));
        assert_eq!(to, vec![ChangeEvent::file("/x/b.txt", ChangeKind::Created)]);
    }

    #[test]
    fn test_map_rename_both_is_ignored() {
        let event = notify::Event {
            kind: EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            paths: vec![PathBuf::from("/x/a.txt"), PathBuf::from("/x/b.txt")],
            attrs: Default::default(),
        };
        assert!(map_notify_event(&event).is_empty());
    }

    #[test]
    fn test_map_rename_any_uses_existence() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, b"x").unwrap();
        let absent = dir.path().join("absent.txt");

        let event = notify::Event {
            kind: EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            paths: vec![present.clone(), absent.clone()],
            attrs: Default::default(),
        };
        assert_eq!(
            map_notify_event(&event),
            vec![
                ChangeEvent::file(present, ChangeKind::Created),
                ChangeEvent::file(absent, ChangeKind::Renamed),
            ]
        );
    }

    #[test]
    fn test_map_access_event_ignored() {
        let mapped = map_notify_event(&notify_event(EventKind::Access(AccessKind::Any), "/x/f"));
        assert!(mapped.is_empty());
    }

    // -- FileSystemWatcher --

    #[tokio::test]
    async fn test_start_subscribes_every_directory_but_no_files() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        let mut watcher = FileSystemWatcher::new(root.clone(), source.clone());

        watcher.start().await.unwrap();

        let expected: Vec<PathBuf> = vec![
            root.as_path().to_path_buf(),
            root.as_path().join("a"),
            root.as_path().join("c"),
            root.as_path().join("a/b"),
        ];
        assert_eq!(source.subscribed(), expected);
        assert_eq!(watcher.watch_set().len(), 4);
        assert!(!watcher.watch_set().contains(&root.as_path().join("a/file.txt")));
    }

    #[tokio::test]
    async fn test_start_fails_when_root_cannot_be_subscribed() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        source.refuse(root.as_path().to_path_buf());
        let mut watcher = FileSystemWatcher::new(root, source);

        let err = watcher.start().await.unwrap_err();
        assert!(matches!(err, SyncError::WatchSubscriptionFailed { .. }));
    }

    #[tokio::test]
    async fn test_created_directory_subscribes_nested_tree_once() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        let mut watcher = FileSystemWatcher::new(root.clone(), source.clone());
        watcher.start().await.unwrap();

        let new_dir = root.as_path().join("moved-in");
        std::fs::create_dir_all(new_dir.join("x/y")).unwrap();
        source.push(ChangeEvent::directory(&new_dir, ChangeKind::Created));

        let event = watcher.next_event().await.unwrap();
        assert_eq!(event.path, new_dir);

        let subscribed = source.subscribed();
        let added = &subscribed[4..];
        assert_eq!(
            added,
            &[new_dir.clone(), new_dir.join("x"), new_dir.join("x/y")]
        );
        assert_eq!(watcher.watch_set().len(), 7);
    }

    #[tokio::test]
    async fn test_failed_subscription_of_new_directory_is_not_fatal() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        let mut watcher = FileSystemWatcher::new(root.clone(), source.clone());
        watcher.start().await.unwrap();

        let new_dir = root.as_path().join("locked");
        std::fs::create_dir(&new_dir).unwrap();
        source.refuse(new_dir.clone());
        source.push(ChangeEvent::directory(&new_dir, ChangeKind::Created));
        source.push(ChangeEvent::file(root.as_path().join("after.txt"), ChangeKind::Created));

        assert_eq!(watcher.next_event().await.unwrap().path, new_dir);
        assert!(!watcher.watch_set().contains(&new_dir));
        assert_eq!(
            watcher.next_event().await.unwrap().path,
            root.as_path().join("after.txt")
        );
    }

    #[tokio::test]
    async fn test_removed_watched_directory_is_flagged_as_directory() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        let mut watcher = FileSystemWatcher::new(root.clone(), source.clone());
        watcher.start().await.unwrap();

        let gone = root.as_path().join("c");
        std::fs::remove_dir(&gone).unwrap();
        source.push(ChangeEvent::file(&gone, ChangeKind::Removed));
        source.push(ChangeEvent::file(root.as_path().join("a/b"), ChangeKind::Renamed));

        let removed = watcher.next_event().await.unwrap();
        assert!(removed.is_directory);
        let renamed = watcher.next_event().await.unwrap();
        assert!(renamed.is_directory);
        assert!(!watcher.watch_set().contains(&gone));
        assert_eq!(
            watcher.watch_set().iter().cloned().collect::<Vec<_>>(),
            vec![root.as_path().to_path_buf(), root.as_path().join("a")]
        );
    }

    #[tokio::test]
    async fn test_file_reusing_removed_directory_name_is_a_file() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        let mut watcher = FileSystemWatcher::new(root.clone(), source.clone());
        watcher.start().await.unwrap();

        let path = root.as_path().join("c");
        std::fs::remove_dir(&path).unwrap();
        source.push(ChangeEvent::directory(&path, ChangeKind::Removed));
        std::fs::write(&path, b"now a file").unwrap();
        source.push(ChangeEvent::file(&path, ChangeKind::Created));
        std::fs::remove_file(&path).unwrap();
        source.push(ChangeEvent::file(&path, ChangeKind::Removed));

        assert!(watcher.next_event().await.unwrap().is_directory);
        assert!(!watcher.next_event().await.unwrap().is_directory);
        let removed_file = watcher.next_event().await.unwrap();
        assert_eq!(removed_file.kind, ChangeKind::Removed);
        assert!(!removed_file.is_directory);
    }

    #[tokio::test]
    async fn test_new_directory_is_subscribed_before_its_children_are_read() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        let mut watcher = FileSystemWatcher::new(root.clone(), source.clone());
        watcher.start().await.unwrap();

        let new_dir = root.as_path().join("incoming");
        std::fs::create_dir(&new_dir).unwrap();
        // A subdirectory appears right after the parent's watch is in place.
        source.create_on_subscribe(new_dir.clone(), new_dir.join("late"));
        source.push(ChangeEvent::directory(&new_dir, ChangeKind::Created));

        watcher.next_event().await.unwrap();

        assert_eq!(&source.subscribed()[4..], &[new_dir.clone(), new_dir.join("late")]);
        assert!(watcher.watch_set().contains(&new_dir.join("late")));
    }

    #[tokio::test]
    async fn test_events_are_delivered_in_order() {
        let (_dir, root) = tree();
        let source = ScriptedSource::default();
        let mut watcher = FileSystemWatcher::new(root.clone(), source.clone());
        let f = root.as_path().join("f.txt");
        source.push(ChangeEvent::file(&f, ChangeKind::Created));
        source.push(ChangeEvent::file(&f, ChangeKind::Modified));
        source.push(ChangeEvent::file(&f, ChangeKind::Removed));

        let mut kinds = Vec::new();
        while let Some(event) = watcher.next_event().await {
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![ChangeKind::Created, ChangeKind::Modified, ChangeKind::Removed]
        );
    }

    #[tokio::test]
    async fn test_notify_source_reports_file_creation() {
        let (_dir, root) = tree();
        let source = NotifyWatchSource::new().unwrap();
        let mut watcher = FileSystemWatcher::new(root.clone(), source);
        watcher.start().await.unwrap();

        let file = root.as_path().join("a").join("fresh.txt");
        std::fs::write(&file, b"hello").unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let event = watcher.next_event().await.expect("source open");
                if event.path == file && event.kind == ChangeKind::Created {
                    return event;
                }
            }
        })
        .await
        .expect("create event within timeout");
        assert!(!event.is_directory);
    }
}

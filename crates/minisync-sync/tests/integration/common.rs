//! Shared fixtures: a temp sync root mirrored into a temp disk bucket.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use minisync_core::domain::WatchRoot;
use minisync_core::ports::IObjectStoreClient;
use minisync_store::LocalDiskStore;
use tempfile::TempDir;

pub struct Mirror {
    _local: TempDir,
    _bucket: TempDir,
    pub root: WatchRoot,
    pub store: Arc<LocalDiskStore>,
}

impl Mirror {
    pub fn new() -> Self {
        let local = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let root = WatchRoot::new(local.path()).unwrap();
        let store = Arc::new(LocalDiskStore::new(bucket.path()));
        Self {
            _local: local,
            _bucket: bucket,
            root,
            store,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.as_path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn bucket_file(&self, key: &str) -> PathBuf {
        self.store.base().join(key)
    }

    /// Every key in the bucket, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .list("")
            .map_ok(|o| o.key)
            .try_collect()
            .await
            .unwrap();
        keys.sort();
        keys
    }
}

pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("mirror did not converge in time");
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

//! In-memory object store used by unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use minisync_core::domain::LocalFileState;
use minisync_core::ports::{IObjectStoreClient, ObjectStream, RemoteObjectInfo, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Put(String),
    Delete(String),
}

/// Keeps objects in a map and records every mutating call.
#[derive(Default)]
pub struct RecordingStore {
    objects: Mutex<BTreeMap<String, RemoteObjectInfo>>,
    calls: Mutex<Vec<RecordedCall>>,
    failing: Mutex<BTreeSet<String>>,
    list_fails: Mutex<bool>,
    stats: Mutex<usize>,
}

impl RecordingStore {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn stat_count(&self) -> usize {
        *self.stats.lock().unwrap()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Every call touching `key` fails with `Unavailable`.
    pub fn fail_key(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        *self.list_fails.lock().unwrap() = true;
    }

    pub fn insert(&self, key: &str, size: u64, last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            RemoteObjectInfo {
                key: key.to_string(),
                size,
                last_modified,
            },
        );
    }

    fn check(&self, operation: &'static str, key: &str) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(StoreError::unavailable(operation, key, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl IObjectStoreClient for RecordingStore {
    fn location(&self) -> String {
        "memory://recording".into()
    }

    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        self.check("put", key)?;
        let metadata =
            std::fs::metadata(local_path).map_err(|e| StoreError::unreadable(local_path, e))?;
        let state =
            LocalFileState::from_metadata(&metadata).map_err(|e| StoreError::unreadable(local_path, e))?;
        self.calls.lock().unwrap().push(RecordedCall::Put(key.to_string()));
        self.insert(key, state.size, state.modified);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check("delete", key)?;
        self.calls.lock().unwrap().push(RecordedCall::Delete(key.to_string()));
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> ObjectStream {
        if *self.list_fails.lock().unwrap() {
            let err = StoreError::unavailable("list", prefix, "injected failure");
            return stream::iter(vec![Err(err)]).boxed();
        }
        let items: Vec<_> = self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(items).boxed()
    }

    async fn stat(&self, key: &str) -> Result<Option<RemoteObjectInfo>, StoreError> {
        *self.stats.lock().unwrap() += 1;
        self.check("stat", key)?;
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }
}

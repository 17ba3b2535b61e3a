//! Local disk object store
//!
//! Each object is a regular file under a base directory at its key's
//! relative path. Uploads copy the source file and give the copy the
//! source's modification time, so `stat` reports exactly what the sweeper
//! compares against. Used for tests and for disk-to-disk mirroring.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use minisync_core::domain::{RelativeKey, KEY_SEPARATOR};
use minisync_core::ports::{IObjectStoreClient, ObjectStream, RemoteObjectInfo, StoreError};
use tracing::{debug, instrument};

/// Suffix of in-flight upload files, hidden from listings.
const TEMP_SUFFIX: &str = ".minisync-part";

#[derive(Debug, Clone)]
pub struct LocalDiskStore {
    base: PathBuf,
}

impl LocalDiskStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn object_path(&self, operation: &'static str, key: &str) -> Result<PathBuf, StoreError> {
        let key = RelativeKey::parse(key)
            .map_err(|e| StoreError::unavailable(operation, key, e))?;
        let mut path = self.base.clone();
        for segment in key.as_str().split(KEY_SEPARATOR) {
            path.push(segment);
        }
        Ok(path)
    }

    /// Whether `error`, raised while touching `path`, means no object lives
    /// there: the file is missing, or a parent segment is itself an object.
    async fn is_absent(&self, path: &Path, error: &io::Error) -> bool {
        if error.kind() == io::ErrorKind::NotFound {
            return true;
        }
        for ancestor in path.ancestors().skip(1) {
            if ancestor == self.base || !ancestor.starts_with(&self.base) {
                break;
            }
            if let Ok(metadata) = tokio::fs::metadata(ancestor).await {
                if metadata.is_file() {
                    return true;
                }
            }
        }
        false
    }

    /// Remove now-empty directories between `dir` and the base.
    async fn prune_empty_parents(&self, mut dir: Option<&Path>) {
        while let Some(current) = dir {
            if current == self.base || !current.starts_with(&self.base) {
                break;
            }
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

fn is_temp_file(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

#[async_trait]
impl IObjectStoreClient for LocalDiskStore {
    fn location(&self) -> String {
        format!("file://{}", self.base.display())
    }

    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base)
            .await
            .map_err(|e| StoreError::unavailable("ensure_bucket", self.base.display().to_string(), e))
    }

    #[instrument(skip(self, local_path), fields(path = %local_path.display()))]
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| StoreError::unreadable(local_path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| StoreError::unreadable(local_path, e))?;

        let dest = self.object_path("put", key)?;
        let parent = dest
            .parent()
            .ok_or_else(|| StoreError::unavailable("put", key, "object path has no parent"))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::unavailable("put", key, e))?;

        // Copy into a uniquely named sibling, then rename into place, so
        // concurrent puts of one key never share a partial file.
        let temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| StoreError::unavailable("put", key, e))?;

        if let Err(e) = tokio::fs::copy(local_path, temp.path()).await {
            return Err(if tokio::fs::metadata(local_path).await.is_err() {
                StoreError::unreadable(local_path, e)
            } else {
                StoreError::unavailable("put", key, e)
            });
        }

        temp.as_file()
            .set_modified(modified)
            .map_err(|e| StoreError::unavailable("put", key, e))?;
        temp.persist(&dest)
            .map_err(|e| StoreError::unavailable("put", key, e.error))?;

        debug!(key, size = metadata.len(), "Stored object on disk");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.object_path("delete", key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(path.parent()).await;
                Ok(())
            }
            Err(e) => {
                if self.is_absent(&path, &e).await {
                    Ok(())
                } else {
                    Err(StoreError::unavailable("delete", key, e))
                }
            }
        }
    }

    fn list(&self, prefix: &str) -> ObjectStream {
        let walk = DiskWalk {
            base: self.base.clone(),
            prefix: prefix.to_string(),
            pending_dirs: VecDeque::from([self.base.clone()]),
            buffered: VecDeque::new(),
        };

        stream::try_unfold(walk, |mut walk| async move {
            loop {
                if let Some(object) = walk.buffered.pop_front() {
                    return Ok(Some((object, walk)));
                }
                let Some(dir) = walk.pending_dirs.pop_front() else {
                    return Ok(None);
                };
                if let Err(e) = walk.read_dir(&dir).await {
                    return Err(e);
                }
            }
        })
        .boxed()
    }

    async fn stat(&self, key: &str) -> Result<Option<RemoteObjectInfo>, StoreError> {
        let path = self.object_path("stat", key)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(RemoteObjectInfo {
                key: key.to_string(),
                size: metadata.len(),
                last_modified: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .map_err(|e| StoreError::unavailable("stat", key, e))?,
            })),
            Ok(_) => Ok(None),
            Err(e) => {
                if self.is_absent(&path, &e).await {
                    Ok(None)
                } else {
                    Err(StoreError::unavailable("stat", key, e))
                }
            }
        }
    }
}

/// Breadth-first walk state for one `list` call.
struct DiskWalk {
    base: PathBuf,
    prefix: String,
    pending_dirs: VecDeque<PathBuf>,
    buffered: VecDeque<RemoteObjectInfo>,
}

impl DiskWalk {
    async fn read_dir(&mut self, dir: &Path) -> Result<(), StoreError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            // Base not created yet: an empty store.
            Err(e) if e.kind() == io::ErrorKind::NotFound && dir == self.base => {
                return Ok(())
            }
            Err(e) => return Err(StoreError::unavailable("list", &self.prefix, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::unavailable("list", &self.prefix, e))?
        {
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                // Removed between read_dir and file_type.
                Err(_) => continue,
            };
            if file_type.is_dir() {
                self.pending_dirs.push_back(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let Some(key) = self.key_for(&path) else {
                continue;
            };
            if !key.starts_with(&self.prefix) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            files.push(RemoteObjectInfo {
                key,
                size: metadata.len(),
                last_modified: DateTime::<Utc>::from(modified),
            });
        }

        files.sort_by(|a, b| a.key.cmp(&b.key));
        self.buffered.extend(files);
        Ok(())
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        if is_temp_file(name) {
            return None;
        }
        let relative = path.strip_prefix(&self.base).ok()?;
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        Some(segments?.join(&KEY_SEPARATOR.to_string()))
    }
}

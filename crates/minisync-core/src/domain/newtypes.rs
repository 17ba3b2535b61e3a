//! Newtype wrappers for validated domain values
//!
//! - [`WatchRoot`] - the absolute local directory being mirrored
//! - [`RelativeKey`] - a path under the watch root expressed as an object key
//!
//! `RelativeKey` is the join key between the local and the remote namespace:
//! `RelativeKey::from_local(root, root/a/b.txt)` is always `"a/b.txt"`, and
//! `to_local` maps it back to the same path.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Separator used between segments of an object key.
pub const KEY_SEPARATOR: char = '/';

// ============================================================================
// WatchRoot
// ============================================================================

/// Absolute local directory mirrored into the object store.
///
/// Validated once at construction; the engine never recreates it if it is
/// removed externally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct WatchRoot(PathBuf);

impl WatchRoot {
    /// Create a watch root, requiring an existing absolute directory.
    ///
    /// The path is canonicalized so that paths reported by the OS
    /// notification source share the same prefix.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidWatchRoot` if the path is relative,
    /// missing, or not a directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(DomainError::InvalidWatchRoot(format!(
                "path must be absolute: {}",
                path.display()
            )));
        }

        let canonical = path.canonicalize().map_err(|e| {
            DomainError::InvalidWatchRoot(format!("{}: {e}", path.display()))
        })?;

        if !canonical.is_dir() {
            return Err(DomainError::InvalidWatchRoot(format!(
                "not a directory: {}",
                canonical.display()
            )));
        }

        Ok(Self(canonical))
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Returns true if `path` is the root itself or lies beneath it.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.0)
    }
}

impl Display for WatchRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl TryFrom<PathBuf> for WatchRoot {
    type Error = DomainError;

    fn try_from(value: PathBuf) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WatchRoot> for PathBuf {
    fn from(value: WatchRoot) -> Self {
        value.0
    }
}

impl AsRef<Path> for WatchRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

// ============================================================================
// RelativeKey
// ============================================================================

/// Path of a local entry relative to the [`WatchRoot`], using
/// [`KEY_SEPARATOR`] between segments.
///
/// Never empty, never starts or ends with a separator, and contains no
/// `.`/`..` or empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativeKey(String);

impl RelativeKey {
    /// Compute the key for a local path under `root`.
    ///
    /// # Errors
    /// Returns `DomainError::PathResolutionFailed` when the path is outside
    /// the root, is the root itself, contains `..`, or is not valid UTF-8.
    pub fn from_local(root: &WatchRoot, path: &Path) -> Result<Self, DomainError> {
        let relative = path.strip_prefix(root.as_path()).map_err(|_| {
            DomainError::PathResolutionFailed(format!(
                "{} is not within {}",
                path.display(),
                root
            ))
        })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    let segment = segment.to_str().ok_or_else(|| {
                        DomainError::PathResolutionFailed(format!(
                            "non UTF-8 path: {}",
                            path.display()
                        ))
                    })?;
                    segments.push(segment);
                }
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::PathResolutionFailed(format!(
                        "unsupported path component in {}",
                        path.display()
                    )))
                }
            }
        }

        if segments.is_empty() {
            return Err(DomainError::PathResolutionFailed(format!(
                "{} is the watch root itself",
                path.display()
            )));
        }

        Ok(Self(segments.join(&KEY_SEPARATOR.to_string())))
    }

    /// Validate a key reported by the object store.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidKey` for empty keys, absolute keys, and
    /// keys with empty, `.` or `..` segments.
    pub fn parse(key: &str) -> Result<Self, DomainError> {
        if key.is_empty() {
            return Err(DomainError::InvalidKey("empty key".to_string()));
        }
        if key.starts_with(KEY_SEPARATOR) {
            return Err(DomainError::InvalidKey(format!("absolute key: {key}")));
        }
        if key
            .split(KEY_SEPARATOR)
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(DomainError::InvalidKey(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local path this key maps to under `root`.
    #[must_use]
    pub fn to_local(&self, root: &WatchRoot) -> PathBuf {
        let mut path = root.as_path().to_path_buf();
        for segment in self.0.split(KEY_SEPARATOR) {
            path.push(segment);
        }
        path
    }

    /// Prefix matching every key beneath this one (`key + "/"`).
    #[must_use]
    pub fn dir_prefix(&self) -> String {
        format!("{}{}", self.0, KEY_SEPARATOR)
    }
}

impl Display for RelativeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelativeKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RelativeKey> for String {
    fn from(value: RelativeKey) -> Self {
        value.0
    }
}

impl AsRef<str> for RelativeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

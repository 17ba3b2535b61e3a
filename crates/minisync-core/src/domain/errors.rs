//! Domain error types
//!
//! Errors raised while validating paths, keys and settings before any
//! I/O happens.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A local path could not be mapped to a key under the watch root
    #[error("Path resolution failed: {0}")]
    PathResolutionFailed(String),

    /// A key reported by the object store is not a valid relative key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The configured watch root is unusable
    #[error("Invalid watch root: {0}")]
    InvalidWatchRoot(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

//! MiniSync Store - Object store adapters
//!
//! Implementations of [`minisync_core::ports::IObjectStoreClient`]:
//!
//! - [`S3ObjectStore`] - any S3-compatible service (MinIO, AWS, R2, ...)
//! - [`LocalDiskStore`] - a directory on local disk, one file per object

pub mod local;
pub mod s3;

pub use local::LocalDiskStore;
pub use s3::{S3ObjectStore, MTIME_METADATA_KEY};

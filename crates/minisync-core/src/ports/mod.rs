//! Port definitions (hexagonal architecture interfaces)
//!
//! - [`IObjectStoreClient`] - remote object store (S3-compatible or local disk)

pub mod object_store;

pub use object_store::{
    IObjectStoreClient, ObjectStream, PrefixDeletion, RemoteObjectInfo, StoreError,
};

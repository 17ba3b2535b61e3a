//! MiniSync Core - Domain types, configuration and ports
//!
//! This crate holds everything the sync engine shares with its adapters:
//! - **Domain types** - `WatchRoot`, `RelativeKey`, `ChangeEvent`, `SyncDecision`
//! - **Port definitions** - `IObjectStoreClient`, the object-store boundary
//! - **Configuration** - YAML config file, environment overrides, validation
//!
//! # Architecture
//!
//! Same ports & adapters split as the rest of the workspace: the domain
//! module has no I/O, ports declare the traits adapter crates implement
//! (`minisync-store`), and the engine (`minisync-sync`) drives them.

pub mod config;
pub mod domain;
pub mod ports;

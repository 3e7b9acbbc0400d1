//! # FerryDB Storage
//!
//! Document storage trait and backends for FerryDB.
//!
//! This crate provides the per-collection key/value store behind a node.
//! A [`Storage`] maps `(collection name, document id)` to a [`Document`];
//! it knows nothing about blocks, updates, or synchronization.
//!
//! ## Design Principles
//!
//! - Backends store whole documents; FerryDB owns all replay semantics
//! - Must be `Send + Sync` for shared access from the engine and database
//! - `get_matching_documents` may full-scan; indexes are an implementation
//!   choice, not part of the contract
//!
//! ## Available Backends
//!
//! - [`MemoryStorage`] - For testing and ephemeral nodes
//! - [`FileStorage`] - One JSON file per collection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod file;
mod memory;
mod store;

pub use document::Document;
pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use store::Storage;

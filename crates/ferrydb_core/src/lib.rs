//! # FerryDB Core
//!
//! Client-authoritative document database core for FerryDB.
//!
//! This crate provides:
//! - `Database`: a named namespace of collections over a [`ferrydb_storage::Storage`]
//! - `Collection`: document CRUD that emits timestamped [`ferrydb_protocol::Update`]s
//! - Subscriptions for reactive consumers
//! - Application of incoming update batches from the sync engine
//! - The canonical database hash used to compare replicas
//!
//! The database never talks to the network: outgoing updates flow through
//! an injected handler, incoming ones arrive via
//! [`Database::apply_incoming_updates`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod database;
mod error;
mod subscription;

pub use collection::Collection;
pub use database::{Database, SYNC_RESERVED_COLLECTIONS};
pub use error::{CoreError, CoreResult};
pub use subscription::Subscription;

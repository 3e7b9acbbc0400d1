//! # FerryDB Engine
//!
//! Block DAG and synchronization engine for FerryDB nodes.
//!
//! This crate provides:
//! - `BlockGraph`: the per-node append-only DAG of update blocks
//! - `PendingBlockMap`: received blocks waiting for their ancestors
//! - The pure check-in and receive-blocks procedures
//! - `SyncEngine`: the two cooperative loops that keep a node converging
//! - `BrokerTransport` and an HTTP implementation over a pluggable client
//! - The bridge wiring a [`ferrydb_core::Database`] to an engine
//!
//! Convergence works without ordering guarantees from the transport:
//! blocks may arrive out of order or more than once, and integration is
//! idempotent by block id.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod db_bridge;
mod engine;
mod error;
mod graph;
mod http;
mod pending;
mod sync;
mod transport;

pub use config::{CheckInStatus, SyncConfig};
pub use db_bridge::{incoming_applier, wire_outgoing};
pub use engine::SyncEngine;
pub use error::{EngineError, EngineResult};
pub use graph::{BlockGraph, BLOCKS_COLLECTION, GRAPH_COLLECTION, HEAD_RECORD_ID};
pub use http::{HttpClient, HttpTransport};
pub use pending::PendingBlockMap;
pub use sync::{integrate_incoming_blocks, run_check_in, CheckInOutcome};
pub use transport::{BrokerTransport, MockTransport};

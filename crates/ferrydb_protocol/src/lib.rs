//! # FerryDB Protocol
//!
//! Protocol types and canonical JSON codec for FerryDB.
//!
//! This crate provides:
//! - `Update` for single field assignments and deletes
//! - `Block` for immutable bundles of updates with DAG parent links
//! - Broker request/response messages (check-in, pull, push, request)
//! - Canonical JSON encoding and SHA-256 hashing
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod block;
mod canonical;
mod error;
mod messages;
mod update;

pub use block::{Block, BlockDetails};
pub use canonical::{canonical_sha256_hex, to_canonical_json};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    CheckInRequest, CheckInResponse, NodeDetails, PullBlocksRequest, PullBlocksResponse,
    PushBlocksRequest, RequestBlocksRequest, WantedBlocks, BROKER_NODE_ID,
};
pub use update::{now_millis, Update};

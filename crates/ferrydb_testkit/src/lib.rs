//! # FerryDB Testkit
//!
//! Test generators and multi-node harness for FerryDB.
//!
//! This crate provides:
//! - proptest strategies for documents, updates, and well-formed blocks
//! - a seeded random update stream for soak-style convergence runs
//! - a loopback transport and `TestNode` bundling storage, database, and
//!   engine over an in-process broker

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod generators;
mod harness;

pub use generators::{
    block_chain_strategy, doc_id_strategy, field_name_strategy, leaf_value_strategy,
    update_strategy, GeneratedOp, UpdateStream,
};
pub use harness::{LoopbackTransport, TestNode};

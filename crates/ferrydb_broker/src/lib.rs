//! # FerryDB Broker
//!
//! Per-user relay broker for FerryDB nodes.
//!
//! The broker stores no document data. It keeps, per user:
//! - a directory of live nodes and their advertised heads
//! - each node's outstanding block-request set
//! - at most one long-poll registration per node
//!
//! Blocks only pass through: a push either lands in the addressee's open
//! long poll or is dropped, and the addressee re-requests what it still
//! needs at its next check-in. Broker state is process-lifetime; losing it
//! loses only the directory, which nodes rebuild by checking in again.
//!
//! The crate is transport-free. An HTTP server binds the handlers to the
//! wire routes; tests call them directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod config;
mod error;
mod state;

pub use broker::{Broker, GcHandle};
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use state::{BrokerStatus, UserStatus};

//! Error types for the database core.

use thiserror::Error;

/// Result type for database operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The underlying storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] ferrydb_storage::StorageError),

    /// A value could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ferrydb_protocol::ProtocolError),

    /// The collection name is reserved for the sync engine.
    #[error("collection name {0:?} is reserved")]
    ReservedCollection(String),
}

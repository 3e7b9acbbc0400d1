//! Error types for the sync engine.

use thiserror::Error;
use uuid::Uuid;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message or encoding).
    #[error("protocol error: {0}")]
    Protocol(#[from] ferrydb_protocol::ProtocolError),

    /// A block or head record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The underlying storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] ferrydb_storage::StorageError),

    /// A block carried an update with no timestamp set.
    #[error("block {block_id} carries an update without a timestamp")]
    MissingTimestamp {
        /// The offending block.
        block_id: Uuid,
    },

    /// A commit was attempted with no updates.
    #[error("refusing to commit an empty block")]
    EmptyCommit,

    /// Persisted graph state contradicts itself.
    #[error("block graph corrupted: {0}")]
    Corrupted(String),
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Transport {
                retryable: true,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::transport_retryable("connection lost").is_retryable());
        assert!(!EngineError::transport_fatal("bad certificate").is_retryable());
        assert!(!EngineError::EmptyCommit.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EngineError::MissingTimestamp {
            block_id: Uuid::nil(),
        };
        assert!(err.to_string().contains("without a timestamp"));
    }
}

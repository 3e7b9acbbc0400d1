//! Error types for the broker.

use thiserror::Error;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur while handling broker requests.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The request carried no `X-User-Id` header.
    #[error("missing user id")]
    MissingUserId,

    /// The request body was malformed or exceeded a configured ceiling.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler for this route.
    #[error("unknown route: {0}")]
    UnknownRoute(String),
}

impl BrokerError {
    /// Creates an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// The HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::MissingUserId => 401,
            BrokerError::InvalidRequest(_) => 400,
            BrokerError::UnknownRoute(_) => 404,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(BrokerError::MissingUserId.status_code(), 401);
        assert_eq!(BrokerError::invalid_request("x").status_code(), 400);
        assert_eq!(BrokerError::UnknownRoute("/x".into()).status_code(), 404);
    }
}

//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so different
//! libraries (reqwest, ureq, a loopback for tests) can carry the same
//! JSON protocol. The client's timeout must exceed the broker's
//! two-minute long-poll window or every quiet pull reads as a failure.

use crate::error::{EngineError, EngineResult};
use crate::transport::BrokerTransport;
use ferrydb_protocol::{
    CheckInRequest, CheckInResponse, PullBlocksRequest, PullBlocksResponse, PushBlocksRequest,
    RequestBlocksRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. The user id
/// travels as the `X-User-Id` header on every request.
pub trait HttpClient: Send + Sync {
    /// Sends a POST with a JSON body and returns the response body.
    fn post(&self, url: &str, user_id: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// HTTP-based broker transport speaking the JSON wire protocol.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    user_id: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against the broker at `base_url`
    /// (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: user_id.into(),
            client,
        }
    }

    /// Returns the broker base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> EngineResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url, &self.user_id, body)
            .map_err(EngineError::transport_retryable)?;
        serde_json::from_slice(&response).map_err(EngineError::from)
    }

    fn post_json_no_body<Req>(&self, endpoint: &str, request: &Req) -> EngineResult<()>
    where
        Req: Serialize,
    {
        let body = serde_json::to_vec(request)?;
        let url = format!("{}{}", self.base_url, endpoint);
        self.client
            .post(&url, &self.user_id, body)
            .map_err(EngineError::transport_retryable)?;
        Ok(())
    }
}

impl<C: HttpClient> BrokerTransport for HttpTransport<C> {
    fn check_in(&self, request: &CheckInRequest) -> EngineResult<CheckInResponse> {
        self.post_json("/check-in", request)
    }

    fn pull_blocks(&self, request: &PullBlocksRequest) -> EngineResult<PullBlocksResponse> {
        self.post_json("/pull-blocks", request)
    }

    fn push_blocks(&self, request: &PushBlocksRequest) -> EngineResult<()> {
        self.post_json_no_body("/push-blocks", request)
    }

    fn request_blocks(&self, request: &RequestBlocksRequest) -> EngineResult<()> {
        self.post_json_no_body("/request-blocks", request)
    }
}

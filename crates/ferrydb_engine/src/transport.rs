//! Transport layer abstraction for talking to the broker.

use crate::error::{EngineError, EngineResult};
use ferrydb_protocol::{
    CheckInRequest, CheckInResponse, PullBlocksRequest, PullBlocksResponse, PushBlocksRequest,
    RequestBlocksRequest,
};
use parking_lot::Mutex;

/// A broker transport handles network communication with the broker.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
/// `pull_blocks` is a long poll: the broker holds the request open until a
/// peer pushes blocks or the broker-side timer fires.
pub trait BrokerTransport: Send + Sync {
    /// Advertises the node's heads; returns the peer directory.
    fn check_in(&self, request: &CheckInRequest) -> EngineResult<CheckInResponse>;

    /// Long-polls for blocks addressed to this node.
    fn pull_blocks(&self, request: &PullBlocksRequest) -> EngineResult<PullBlocksResponse>;

    /// Delivers blocks to a peer via the broker.
    fn push_blocks(&self, request: &PushBlocksRequest) -> EngineResult<()>;

    /// Replaces this node's set of wanted block ids.
    fn request_blocks(&self, request: &RequestBlocksRequest) -> EngineResult<()>;
}

/// A mock transport for testing the pure sync procedures.
#[derive(Debug, Default)]
pub struct MockTransport {
    check_in_response: Mutex<Option<CheckInResponse>>,
    pull_response: Mutex<Option<PullBlocksResponse>>,
    pushed: Mutex<Vec<PushBlocksRequest>>,
    requested: Mutex<Vec<RequestBlocksRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the check-in response.
    pub fn set_check_in_response(&self, response: CheckInResponse) {
        *self.check_in_response.lock() = Some(response);
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullBlocksResponse) {
        *self.pull_response.lock() = Some(response);
    }

    /// Returns every recorded push.
    pub fn pushed(&self) -> Vec<PushBlocksRequest> {
        self.pushed.lock().clone()
    }

    /// Returns every recorded block request.
    pub fn requested(&self) -> Vec<RequestBlocksRequest> {
        self.requested.lock().clone()
    }
}

impl BrokerTransport for MockTransport {
    fn check_in(&self, _request: &CheckInRequest) -> EngineResult<CheckInResponse> {
        self.check_in_response.lock().clone().ok_or_else(|| {
            EngineError::transport_retryable("no mock check-in response set")
        })
    }

    fn pull_blocks(&self, _request: &PullBlocksRequest) -> EngineResult<PullBlocksResponse> {
        self.pull_response
            .lock()
            .clone()
            .ok_or_else(|| EngineError::transport_retryable("no mock pull response set"))
    }

    fn push_blocks(&self, request: &PushBlocksRequest) -> EngineResult<()> {
        self.pushed.lock().push(request.clone());
        Ok(())
    }

    fn request_blocks(&self, request: &RequestBlocksRequest) -> EngineResult<()> {
        self.requested.lock().push(request.clone());
        Ok(())
    }
}

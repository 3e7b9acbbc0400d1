//! In-process multi-node harness.

use ferrydb_broker::{Broker, BrokerResult};
use ferrydb_core::Database;
use ferrydb_engine::{
    incoming_applier, wire_outgoing, BrokerTransport, EngineError, EngineResult, SyncConfig,
    SyncEngine,
};
use ferrydb_protocol::{
    CheckInRequest, CheckInResponse, PullBlocksRequest, PullBlocksResponse, PushBlocksRequest,
    RequestBlocksRequest,
};
use ferrydb_storage::MemoryStorage;
use std::sync::Arc;
use std::time::Duration;

/// A transport that calls a shared in-process [`Broker`] directly,
/// skipping HTTP entirely.
pub struct LoopbackTransport {
    broker: Arc<Broker>,
    user_id: String,
}

impl LoopbackTransport {
    /// Creates a loopback transport for one user.
    pub fn new(broker: Arc<Broker>, user_id: impl Into<String>) -> Self {
        Self {
            broker,
            user_id: user_id.into(),
        }
    }
}

fn into_engine_err<T>(result: BrokerResult<T>) -> EngineResult<T> {
    result.map_err(|err| EngineError::transport_fatal(err.to_string()))
}

impl BrokerTransport for LoopbackTransport {
    fn check_in(&self, request: &CheckInRequest) -> EngineResult<CheckInResponse> {
        into_engine_err(self.broker.check_in(&self.user_id, request.clone()))
    }

    fn pull_blocks(&self, request: &PullBlocksRequest) -> EngineResult<PullBlocksResponse> {
        into_engine_err(self.broker.pull_blocks(&self.user_id, request.clone()))
    }

    fn push_blocks(&self, request: &PushBlocksRequest) -> EngineResult<()> {
        into_engine_err(self.broker.push_blocks(&self.user_id, request.clone()))
    }

    fn request_blocks(&self, request: &RequestBlocksRequest) -> EngineResult<()> {
        into_engine_err(self.broker.request_blocks(&self.user_id, request.clone()))
    }
}

/// One simulated node: in-memory storage, database, and engine bound to a
/// shared broker.
pub struct TestNode {
    /// The node's database.
    pub database: Arc<Database>,
    /// The node's sync engine.
    pub engine: Arc<SyncEngine<LoopbackTransport>>,
}

impl TestNode {
    /// Creates a node for `user_id` with fast test timing.
    pub fn new(broker: &Arc<Broker>, user_id: &str, node_id: &str) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let database = Arc::new(Database::new(node_id, storage.clone()));
        let config = SyncConfig::new(node_id, user_id)
            .with_tick_interval(Duration::from_millis(40))
            .with_pull_retry_delay(Duration::from_millis(20));
        let engine = Arc::new(SyncEngine::new(
            config,
            storage,
            LoopbackTransport::new(Arc::clone(broker), user_id),
            incoming_applier(Arc::clone(&database)),
        ));
        wire_outgoing(&database, Arc::clone(&engine));
        Self { database, engine }
    }

    /// The node's current database hash.
    pub fn hash(&self) -> String {
        self.database.hash().expect("hashing an in-memory database")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrydb_broker::BrokerConfig;
    use serde_json::json;

    #[test]
    fn loopback_round_trip() {
        let broker = Arc::new(Broker::new(
            BrokerConfig::default().with_pull_timeout(Duration::from_millis(50)),
        ));
        let node = TestNode::new(&broker, "u1", "n1");

        let mut partial = serde_json::Map::new();
        partial.insert("f".to_string(), json!(1));
        node.database
            .collection("tasks")
            .unwrap()
            .upsert_one("t1", partial)
            .unwrap();

        // The write became a block and the broker learned our head.
        let outcome = node.engine.check_in_once().unwrap();
        assert_eq!(outcome.peers_seen, 0);
        let status = broker.status();
        assert_eq!(status.users["u1"].nodes["n1"].head_blocks.len(), 1);
    }
}

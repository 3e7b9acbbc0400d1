//! Broker request and response messages.
//!
//! These are the bodies of the four node-facing POST endpoints plus the
//! debug status route. Every request additionally carries the user id in
//! the `X-User-Id` header, which stays outside the JSON body.

use crate::block::{Block, BlockDetails};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Sender id used by the broker itself, e.g. for long-poll timeouts.
pub const BROKER_NODE_ID: &str = "broker";

/// Periodic advertisement of a node's current heads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    /// The calling node.
    pub node_id: String,
    /// Projection of the node's current head blocks.
    pub head_blocks: Vec<BlockDetails>,
    /// The node's wall clock in milliseconds, for diagnostics.
    pub time: i64,
    /// Current database hash, if the node chooses to advertise it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_hash: Option<String>,
    /// Whether the node is still generating test data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generating_data: Option<bool>,
}

/// Directory entry returned for each known peer of the same user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetails {
    /// The peer's advertised head blocks.
    pub head_blocks: Vec<BlockDetails>,
    /// The peer's wall clock at its last check-in.
    pub time: i64,
    /// Broker wall clock of the peer's last check-in.
    pub last_seen: i64,
    /// The peer's advertised database hash, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_hash: Option<String>,
    /// Whether the peer reported it is still generating test data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generating_data: Option<bool>,
}

/// The block ids a peer has asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WantedBlocks {
    /// Ids of the blocks the peer still needs.
    pub required_hashes: BTreeSet<Uuid>,
}

/// Response to a check-in: the node directory and outstanding block wants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    /// Directory of every live node of this user, keyed by node id.
    pub node_details: BTreeMap<String, NodeDetails>,
    /// Outstanding block requests, keyed by the requesting node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wants_data: Option<BTreeMap<String, WantedBlocks>>,
}

/// Long-poll request for blocks addressed to this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullBlocksRequest {
    /// The calling node.
    pub node_id: String,
}

/// Resolution of a long poll: pushed blocks, or empty on timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullBlocksResponse {
    /// Delivered blocks; empty when the poll timed out.
    pub blocks: Vec<Block>,
    /// Node that pushed the blocks, or [`BROKER_NODE_ID`] on timeout.
    pub from_node_id: String,
}

impl PullBlocksResponse {
    /// The empty response the broker produces when a poll times out.
    pub fn timed_out() -> Self {
        Self {
            blocks: Vec::new(),
            from_node_id: BROKER_NODE_ID.to_string(),
        }
    }
}

/// Delivery of blocks to another node via the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBlocksRequest {
    /// Destination node.
    pub to_node_id: String,
    /// Originating node.
    pub from_node_id: String,
    /// The blocks being delivered.
    pub blocks: Vec<Block>,
}

/// Replaces the caller's set of wanted block ids.
///
/// The broker never unions: the caller must ask for everything it still
/// needs on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBlocksRequest {
    /// The calling node.
    pub node_id: String,
    /// Ids of all blocks the caller still needs.
    pub required_hashes: BTreeSet<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_in_request_wire_names() {
        let request = CheckInRequest {
            node_id: "n1".into(),
            head_blocks: Vec::new(),
            time: 123,
            database_hash: Some("abc".into()),
            generating_data: None,
        };

        let encoded = serde_json::to_string(&request).unwrap();
        assert!(encoded.contains("\"nodeId\":\"n1\""));
        assert!(encoded.contains("\"headBlocks\":[]"));
        assert!(encoded.contains("\"databaseHash\":\"abc\""));
        assert!(!encoded.contains("generatingData"));

        let decoded: CheckInRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn check_in_response_omits_empty_wants() {
        let response = CheckInResponse {
            node_details: BTreeMap::new(),
            wants_data: None,
        };
        let encoded = serde_json::to_string(&response).unwrap();
        assert!(!encoded.contains("wantsData"));
    }

    #[test]
    fn pull_timeout_response() {
        let response = PullBlocksResponse::timed_out();
        assert!(response.blocks.is_empty());
        assert_eq!(response.from_node_id, BROKER_NODE_ID);
    }

    #[test]
    fn request_blocks_roundtrip() {
        let mut wanted = BTreeSet::new();
        wanted.insert(Uuid::new_v4());
        wanted.insert(Uuid::new_v4());

        let request = RequestBlocksRequest {
            node_id: "n2".into(),
            required_hashes: wanted,
        };

        let encoded = serde_json::to_string(&request).unwrap();
        assert!(encoded.contains("\"requiredHashes\":["));

        let decoded: RequestBlocksRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, request);
    }
}

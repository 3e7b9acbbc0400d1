//! Per-user broker state.

use ferrydb_protocol::{NodeDetails, PullBlocksResponse};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::mpsc::SyncSender;
use uuid::Uuid;

/// One node's directory entry.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryEntry {
    /// What the node advertised at its last check-in.
    pub details: NodeDetails,
}

/// An installed long-poll response slot.
///
/// The slot is owned by the handler that installed it until it is either
/// fulfilled by a push or timed out; the `id` lets the installer tell its
/// own slot from a successor when cleaning up.
pub(crate) struct PullSlot {
    pub id: u64,
    pub sender: SyncSender<PullBlocksResponse>,
}

/// Everything the broker keeps for one user.
///
/// Handlers take the per-user mutex around this record, which is the
/// "only one handler mutates a given user at a time" guarantee; state of
/// different users is fully independent.
#[derive(Default)]
pub(crate) struct UserRecord {
    pub nodes: HashMap<String, DirectoryEntry>,
    pub pull_slots: HashMap<String, PullSlot>,
    pub block_requests: HashMap<String, BTreeSet<Uuid>>,
}

/// Debug snapshot of one user's state, as served by `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    /// Directory of live nodes.
    pub nodes: BTreeMap<String, NodeDetails>,
    /// Outstanding block requests per node.
    pub block_requests: BTreeMap<String, BTreeSet<Uuid>>,
    /// Nodes with an open long poll.
    pub pull_registrations: Vec<String>,
}

/// Debug snapshot of the whole broker, as served by `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    /// Per-user state, keyed by user id.
    pub users: BTreeMap<String, UserStatus>,
}

impl UserRecord {
    pub(crate) fn snapshot(&self) -> UserStatus {
        let mut pull_registrations: Vec<String> = self.pull_slots.keys().cloned().collect();
        pull_registrations.sort();
        UserStatus {
            nodes: self
                .nodes
                .iter()
                .map(|(id, entry)| (id.clone(), entry.details.clone()))
                .collect(),
            block_requests: self
                .block_requests
                .iter()
                .map(|(id, set)| (id.clone(), set.clone()))
                .collect(),
            pull_registrations,
        }
    }
}

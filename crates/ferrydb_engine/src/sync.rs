//! The transport-agnostic check-in and receive-blocks procedures.
//!
//! Both operate on a [`BlockGraph`] and a [`PendingBlockMap`] plus a
//! [`BrokerTransport`]; the engine owns locking and scheduling around
//! them, so everything here is straight-line logic that tests can drive
//! directly.

use crate::config::CheckInStatus;
use crate::error::EngineResult;
use crate::graph::BlockGraph;
use crate::pending::PendingBlockMap;
use crate::transport::BrokerTransport;
use ferrydb_protocol::{
    now_millis, Block, CheckInRequest, PushBlocksRequest, RequestBlocksRequest, Update,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// What one check-in tick did; used for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckInOutcome {
    /// Peers listed in the broker's directory, excluding this node.
    pub peers_seen: usize,
    /// Blocks pushed to peers that asked for them.
    pub blocks_pushed: usize,
    /// Block ids this node asked the broker to advertise for it.
    pub blocks_requested: usize,
}

/// Runs one check-in against the broker.
///
/// Advertises the local heads, pushes any blocks peers have asked for
/// (never to itself), and replaces this node's block-request set with
/// everything still missing: unknown peer heads plus unmet ancestors of
/// pending blocks.
///
/// Push and request failures are logged and retried implicitly on the
/// next tick; only the check-in call itself is fatal to the tick.
pub fn run_check_in<T: BrokerTransport>(
    node_id: &str,
    graph: &mut BlockGraph,
    pending: &PendingBlockMap,
    transport: &T,
    status: &CheckInStatus,
) -> EngineResult<CheckInOutcome> {
    let head_blocks = graph.head_block_details()?;
    let request = CheckInRequest {
        node_id: node_id.to_string(),
        head_blocks,
        time: now_millis(),
        database_hash: status.database_hash.clone(),
        generating_data: status.generating_data,
    };
    let response = transport.check_in(&request)?;

    let mut outcome = CheckInOutcome::default();

    // Serve peers that asked for blocks we hold.
    if let Some(wants_data) = &response.wants_data {
        for (peer_id, wanted) in wants_data {
            if peer_id == node_id {
                continue;
            }
            let mut resolved = Vec::new();
            for id in &wanted.required_hashes {
                if let Some(block) = graph.get_block(id)? {
                    resolved.push(block);
                }
            }
            if resolved.is_empty() {
                continue;
            }
            let push = PushBlocksRequest {
                to_node_id: peer_id.clone(),
                from_node_id: node_id.to_string(),
                blocks: resolved,
            };
            match transport.push_blocks(&push) {
                Ok(()) => outcome.blocks_pushed += push.blocks.len(),
                Err(err) => warn!(peer = %peer_id, %err, "push-blocks failed, will retry next tick"),
            }
        }
    }

    // Work out everything we are still missing.
    let mut needed: BTreeSet<Uuid> = BTreeSet::new();
    for (peer_id, details) in &response.node_details {
        if peer_id == node_id {
            continue;
        }
        outcome.peers_seen += 1;
        for head in &details.head_blocks {
            if !pending.contains(&head.id) && !graph.has_block(&head.id)? {
                needed.insert(head.id);
            }
        }
    }
    for block in pending.iter() {
        for parent in &block.prev_blocks {
            if !pending.contains(parent) && !graph.has_block(parent)? {
                needed.insert(*parent);
            }
        }
    }

    if !needed.is_empty() {
        outcome.blocks_requested = needed.len();
        let request = RequestBlocksRequest {
            node_id: node_id.to_string(),
            required_hashes: needed,
        };
        if let Err(err) = transport.request_blocks(&request) {
            warn!(%err, "request-blocks failed, will retry next tick");
            outcome.blocks_requested = 0;
        }
    }

    debug!(
        peers = outcome.peers_seen,
        pushed = outcome.blocks_pushed,
        requested = outcome.blocks_requested,
        "check-in complete"
    );
    Ok(outcome)
}

/// Files incoming blocks into the pending map and integrates every block
/// whose ancestors are all present, to a fixed point.
///
/// A single pass is insufficient: integrating one block can unblock
/// others that arrived before their ancestors. Returns one time-ordered
/// update batch per integrated block, in integration order, for the
/// caller to dispatch after releasing its locks.
pub fn integrate_incoming_blocks(
    graph: &mut BlockGraph,
    pending: &mut PendingBlockMap,
    incoming: Vec<Block>,
) -> EngineResult<Vec<Vec<Update>>> {
    for block in incoming {
        // Keep the pending map disjoint from the graph.
        if graph.has_block(&block.id)? {
            continue;
        }
        pending.insert(block);
    }

    let mut batches = Vec::new();
    let mut changed = true;
    while changed {
        changed = false;
        let candidates: Vec<(Uuid, Vec<Uuid>)> = pending
            .iter()
            .map(|b| (b.id, b.prev_blocks.iter().copied().collect()))
            .collect();
        for (id, parents) in candidates {
            let mut all_present = true;
            for parent in &parents {
                if !graph.has_block(parent)? {
                    all_present = false;
                    break;
                }
            }
            if !all_present {
                continue;
            }
            if let Some(block) = pending.remove(&id) {
                match integrate_incoming(graph, block.clone()) {
                    Ok(batch) => {
                        batches.push(batch);
                        changed = true;
                    }
                    Err(err) => {
                        // Keep the block around so the next pull retries
                        // it, unless the graph already holds it.
                        if !matches!(graph.has_block(&id), Ok(true)) {
                            pending.insert(block);
                        }
                        return Err(err);
                    }
                }
            }
        }
    }
    Ok(batches)
}

/// Integrates one block whose ancestors are all present and rebuilds the
/// affected slice of history.
///
/// All local blocks whose latest update is at or after the incoming
/// block's earliest update are replayed together with it, stably sorted
/// by timestamp, so later local writes keep winning over older remote
/// ones and vice versa.
fn integrate_incoming(graph: &mut BlockGraph, block: Block) -> EngineResult<Vec<Update>> {
    let Some(min_timestamp) = block.first_timestamp() else {
        // Nothing to replay for an empty block.
        graph.integrate(block)?;
        return Ok(Vec::new());
    };

    let mut affected = find_blocks_from_time(min_timestamp, graph)?;
    graph.integrate(block.clone())?;
    affected.push(block);

    let mut updates: Vec<Update> = affected.into_iter().flat_map(|b| b.data).collect();
    // Stable: equal timestamps keep concatenation order.
    updates.sort_by_key(Update::timestamp);
    Ok(updates)
}

/// Walks backwards from the heads collecting every block whose last
/// update is at or after `min_timestamp`.
///
/// The walk stops descending below the first block older than the cutoff:
/// such a block's effects are already reflected in the stored documents,
/// which holds because only integrated blocks are walked.
fn find_blocks_from_time(
    min_timestamp: i64,
    graph: &mut BlockGraph,
) -> EngineResult<Vec<Block>> {
    let mut queue: Vec<Uuid> = graph.head_block_ids().into_iter().collect();
    let mut visited: BTreeSet<Uuid> = BTreeSet::new();
    let mut affected = Vec::new();

    while let Some(id) = queue.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(block) = graph.get_block(&id)? else {
            continue;
        };
        let recent = block.last_timestamp().is_some_and(|ts| ts >= min_timestamp);
        if recent {
            queue.extend(block.prev_blocks.iter().copied());
            affected.push(block);
        }
    }

    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use ferrydb_protocol::{BlockDetails, CheckInResponse, NodeDetails, WantedBlocks};
    use ferrydb_storage::MemoryStorage;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn graph() -> BlockGraph {
        BlockGraph::new(Arc::new(MemoryStorage::new()))
    }

    fn update(ts: i64, doc: &str, field: &str, value: &str) -> Update {
        Update::field("x", doc, field, json!(value)).with_timestamp(ts)
    }

    fn peer_details(heads: Vec<BlockDetails>) -> NodeDetails {
        NodeDetails {
            head_blocks: heads,
            time: 0,
            last_seen: 0,
            database_hash: None,
            generating_data: None,
        }
    }

    #[test]
    fn check_in_pushes_wanted_blocks_but_never_to_self() {
        let mut graph = graph();
        let block = graph.commit(vec![update(1, "d", "f", "v")]).unwrap();

        let transport = MockTransport::new();
        let wanted = WantedBlocks {
            required_hashes: BTreeSet::from([block.id]),
        };
        let mut wants = BTreeMap::new();
        wants.insert("self".to_string(), wanted.clone());
        wants.insert("peer".to_string(), wanted);
        transport.set_check_in_response(CheckInResponse {
            node_details: BTreeMap::new(),
            wants_data: Some(wants),
        });

        let pending = PendingBlockMap::new();
        let outcome = run_check_in(
            "self",
            &mut graph,
            &pending,
            &transport,
            &CheckInStatus::default(),
        )
        .unwrap();

        let pushed = transport.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].to_node_id, "peer");
        assert_eq!(pushed[0].from_node_id, "self");
        assert_eq!(pushed[0].blocks[0].id, block.id);
        assert_eq!(outcome.blocks_pushed, 1);
    }

    #[test]
    fn check_in_skips_push_when_nothing_resolves() {
        let mut graph = graph();
        let transport = MockTransport::new();
        let mut wants = BTreeMap::new();
        wants.insert(
            "peer".to_string(),
            WantedBlocks {
                required_hashes: BTreeSet::from([Uuid::new_v4()]),
            },
        );
        transport.set_check_in_response(CheckInResponse {
            node_details: BTreeMap::new(),
            wants_data: Some(wants),
        });

        let pending = PendingBlockMap::new();
        run_check_in(
            "self",
            &mut graph,
            &pending,
            &transport,
            &CheckInStatus::default(),
        )
        .unwrap();

        assert!(transport.pushed().is_empty());
    }

    #[test]
    fn check_in_requests_unknown_peer_heads_and_pending_parents() {
        let mut graph = graph();
        let known = graph.commit(vec![update(1, "d", "f", "v")]).unwrap();

        let unknown_head = Uuid::new_v4();
        let missing_parent = Uuid::new_v4();

        let mut pending = PendingBlockMap::new();
        let orphan = Block::new(
            BTreeSet::from([missing_parent]),
            vec![update(2, "d", "f", "w")],
        );
        let orphan_id = orphan.id;
        pending.insert(orphan);

        let transport = MockTransport::new();
        let mut directory = BTreeMap::new();
        // A peer advertising one head we know and one we do not.
        directory.insert(
            "peer".to_string(),
            peer_details(vec![
                BlockDetails {
                    id: known.id,
                    prev_blocks: BTreeSet::new(),
                },
                BlockDetails {
                    id: unknown_head,
                    prev_blocks: BTreeSet::new(),
                },
                // A head already sitting in the pending map must not be
                // re-requested.
                BlockDetails {
                    id: orphan_id,
                    prev_blocks: BTreeSet::new(),
                },
            ]),
        );
        transport.set_check_in_response(CheckInResponse {
            node_details: directory,
            wants_data: None,
        });

        let outcome = run_check_in(
            "self",
            &mut graph,
            &pending,
            &transport,
            &CheckInStatus::default(),
        )
        .unwrap();

        let requested = transport.requested();
        assert_eq!(requested.len(), 1);
        assert_eq!(
            requested[0].required_hashes,
            BTreeSet::from([unknown_head, missing_parent])
        );
        assert_eq!(outcome.peers_seen, 1);
        assert_eq!(outcome.blocks_requested, 2);
    }

    #[test]
    fn check_in_requests_nothing_when_converged() {
        let mut graph = graph();
        let block = graph.commit(vec![update(1, "d", "f", "v")]).unwrap();

        let transport = MockTransport::new();
        let mut directory = BTreeMap::new();
        directory.insert("peer".to_string(), peer_details(vec![block.details()]));
        transport.set_check_in_response(CheckInResponse {
            node_details: directory,
            wants_data: None,
        });

        let pending = PendingBlockMap::new();
        run_check_in(
            "self",
            &mut graph,
            &pending,
            &transport,
            &CheckInStatus::default(),
        )
        .unwrap();

        assert!(transport.requested().is_empty());
    }

    #[test]
    fn out_of_order_delivery_parks_child_until_parent_arrives() {
        let mut origin = graph();
        let a = origin.commit(vec![update(1, "d1", "f", "A")]).unwrap();
        let c = origin.commit(vec![update(2, "d1", "f", "C")]).unwrap();

        let mut graph = graph();
        let mut pending = PendingBlockMap::new();

        // Child first: nothing integrates.
        let batches = integrate_incoming_blocks(&mut graph, &mut pending, vec![c.clone()]).unwrap();
        assert!(batches.is_empty());
        assert_eq!(pending.len(), 1);
        assert!(graph.head_block_ids().is_empty());

        // Parent arrives: both integrate, child becomes the sole head.
        let batches = integrate_incoming_blocks(&mut graph, &mut pending, vec![a.clone()]).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(pending.is_empty());
        assert_eq!(graph.head_block_ids(), BTreeSet::from([c.id]));
    }

    #[test]
    fn duplicate_delivery_is_ignored() {
        let mut origin = graph();
        let a = origin.commit(vec![update(1, "d1", "f", "A")]).unwrap();

        let mut graph = graph();
        let mut pending = PendingBlockMap::new();
        integrate_incoming_blocks(&mut graph, &mut pending, vec![a.clone()]).unwrap();
        let batches =
            integrate_incoming_blocks(&mut graph, &mut pending, vec![a.clone()]).unwrap();

        assert!(batches.is_empty());
        assert!(pending.is_empty());
        assert_eq!(graph.head_block_ids(), BTreeSet::from([a.id]));
    }

    #[test]
    fn replay_orders_across_local_and_remote_blocks() {
        let mut graph = graph();
        graph
            .commit(vec![update(10, "d1", "f", "local-old")])
            .unwrap();
        graph
            .commit(vec![update(30, "d1", "f", "local-new")])
            .unwrap();

        // Remote block interleaves between the two local writes.
        let remote = Block::new(BTreeSet::new(), vec![update(20, "d1", "f", "remote")]);
        let mut pending = PendingBlockMap::new();
        let batches =
            integrate_incoming_blocks(&mut graph, &mut pending, vec![remote]).unwrap();

        assert_eq!(batches.len(), 1);
        let timestamps: Vec<i64> = batches[0].iter().map(Update::timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
    }

    #[test]
    fn replay_cutoff_excludes_settled_history() {
        let mut graph = graph();
        graph.commit(vec![update(10, "d1", "f", "old")]).unwrap();
        graph.commit(vec![update(20, "d1", "f", "mid")]).unwrap();

        // Both local blocks predate every remote update.
        let remote = Block::new(BTreeSet::new(), vec![update(25, "d2", "f", "new")]);
        let mut pending = PendingBlockMap::new();
        let batches =
            integrate_incoming_blocks(&mut graph, &mut pending, vec![remote]).unwrap();

        let timestamps: Vec<i64> = batches[0].iter().map(Update::timestamp).collect();
        // The ts-10 block's latest update is older than 25; it is settled
        // state and stays out of the replay.
        assert_eq!(timestamps, vec![25]);
    }

    #[test]
    fn equal_timestamps_keep_concatenation_order() {
        let mut graph = graph();
        graph.commit(vec![update(10, "d1", "f", "local")]).unwrap();

        let remote = Block::new(BTreeSet::new(), vec![update(10, "d1", "f", "remote")]);
        let mut pending = PendingBlockMap::new();
        let batches =
            integrate_incoming_blocks(&mut graph, &mut pending, vec![remote]).unwrap();

        // Local history is concatenated before the incoming block, so on a
        // tie the incoming update lands last.
        let values: Vec<String> = batches[0]
            .iter()
            .map(|u| match u {
                Update::Field { value, .. } => value.as_str().unwrap().to_string(),
                Update::Delete { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec!["local", "remote"]);
    }

    #[test]
    fn pending_closure_holds_after_receive() {
        let mut origin = graph();
        let _a = origin.commit(vec![update(1, "d", "f", "a")]).unwrap();
        let b = origin.commit(vec![update(2, "d", "f", "b")]).unwrap();
        let c = origin.commit(vec![update(3, "d", "f", "c")]).unwrap();

        let mut graph = graph();
        let mut pending = PendingBlockMap::new();
        integrate_incoming_blocks(&mut graph, &mut pending, vec![b, c]).unwrap();

        // Both stay pending; each has at least one ancestor not yet in
        // the graph (b waits on a, c waits on b).
        assert_eq!(pending.len(), 2);
        let pending_blocks: Vec<Block> = pending.iter().cloned().collect();
        for block in pending_blocks {
            let mut unmet = 0;
            for parent in &block.prev_blocks {
                if !graph.has_block(parent).unwrap() {
                    unmet += 1;
                }
            }
            assert!(unmet >= 1, "pending block {} has no unmet ancestor", block.id);
        }
    }
}

//! Property tests for deterministic rebuild and idempotent integration.

use ferrydb_core::Database;
use ferrydb_engine::{integrate_incoming_blocks, BlockGraph, PendingBlockMap};
use ferrydb_protocol::Block;
use ferrydb_storage::MemoryStorage;
use ferrydb_testkit::block_chain_strategy;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Delivers blocks one at a time to a fresh node and returns the final
/// database hash, head set, and pending count.
fn deliver(blocks: Vec<Block>) -> (String, BTreeSet<Uuid>, usize) {
    let storage = Arc::new(MemoryStorage::new());
    let database = Database::new("db", storage.clone());
    let mut graph = BlockGraph::new(storage);
    let mut pending = PendingBlockMap::new();

    for block in blocks {
        let batches = integrate_incoming_blocks(&mut graph, &mut pending, vec![block])
            .expect("integration");
        for batch in batches {
            database.apply_incoming_updates(&batch).expect("apply");
        }
    }

    (
        database.hash().expect("hash"),
        graph.head_block_ids(),
        pending.len(),
    )
}

proptest! {
    /// Rebuilding from any delivery order of the same block set yields the
    /// same documents, heads, and hash.
    #[test]
    fn rebuild_is_delivery_order_independent(blocks in block_chain_strategy(10)) {
        let forward = deliver(blocks.clone());
        prop_assert_eq!(forward.2, 0, "forward delivery must leave nothing pending");

        let mut reversed = blocks.clone();
        reversed.reverse();
        let backward = deliver(reversed);

        prop_assert_eq!(&forward.0, &backward.0);
        prop_assert_eq!(&forward.1, &backward.1);
        prop_assert_eq!(backward.2, 0);
    }

    /// Delivering every block twice is equivalent to delivering it once.
    #[test]
    fn integration_is_idempotent(blocks in block_chain_strategy(10)) {
        let once = deliver(blocks.clone());

        let mut doubled = blocks.clone();
        doubled.extend(blocks);
        let twice = deliver(doubled);

        prop_assert_eq!(once, twice);
    }

    /// Heads are exactly the blocks no other block references.
    #[test]
    fn heads_match_reference_definition(blocks in block_chain_strategy(10)) {
        let (_, heads, _) = deliver(blocks.clone());

        let mut referenced: BTreeSet<Uuid> = BTreeSet::new();
        for block in &blocks {
            referenced.extend(block.prev_blocks.iter().copied());
        }
        let expected: BTreeSet<Uuid> = blocks
            .iter()
            .map(|b| b.id)
            .filter(|id| !referenced.contains(id))
            .collect();

        prop_assert_eq!(heads, expected);
    }
}

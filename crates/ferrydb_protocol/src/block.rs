//! Blocks: immutable bundles of updates forming the replication DAG.

use crate::update::Update;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// An immutable bundle of updates committed by one node.
///
/// Identity is by `id` (a random v4 UUID), never by content hash.
/// `prev_blocks` records the committing node's head set immediately before
/// the commit, which gives the DAG its edges; cycles are impossible because
/// a block can only reference blocks that existed before it did.
///
/// Once written a block replicates unchanged across nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Globally unique block id.
    pub id: Uuid,
    /// Ids of the head blocks observed at commit time.
    pub prev_blocks: BTreeSet<Uuid>,
    /// The updates carried by this block, in commit order.
    pub data: Vec<Update>,
}

impl Block {
    /// Creates a block with a freshly allocated id.
    pub fn new(prev_blocks: BTreeSet<Uuid>, data: Vec<Update>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prev_blocks,
            data,
        }
    }

    /// Returns the projection advertised during check-in.
    pub fn details(&self) -> BlockDetails {
        BlockDetails {
            id: self.id,
            prev_blocks: self.prev_blocks.clone(),
        }
    }

    /// Timestamp of the first update in the block, if any.
    pub fn first_timestamp(&self) -> Option<i64> {
        self.data.first().map(Update::timestamp)
    }

    /// Timestamp of the last update in the block, if any.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.data.last().map(Update::timestamp)
    }
}

/// The id and parent set of a block, without its payload.
///
/// Check-in advertises these for the local heads so peers can tell whether
/// they are missing anything without shipping update data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDetails {
    /// Block id.
    pub id: Uuid,
    /// Parent block ids.
    pub prev_blocks: BTreeSet<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_ids_are_unique() {
        let a = Block::new(BTreeSet::new(), Vec::new());
        let b = Block::new(BTreeSet::new(), Vec::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn block_roundtrip_preserves_identity() {
        let update = Update::field("x", "d1", "f", json!("v")).with_timestamp(1);
        let mut prev = BTreeSet::new();
        prev.insert(Uuid::new_v4());
        let block = Block::new(prev, vec![update]);

        let encoded = serde_json::to_string(&block).unwrap();
        // The wire field for the id is `id`, not `_id`.
        assert!(encoded.contains("\"id\":"));
        assert!(encoded.contains("\"prevBlocks\":"));

        let decoded: Block = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn details_project_id_and_parents() {
        let mut prev = BTreeSet::new();
        prev.insert(Uuid::new_v4());
        let block = Block::new(prev.clone(), Vec::new());

        let details = block.details();
        assert_eq!(details.id, block.id);
        assert_eq!(details.prev_blocks, prev);
    }

    #[test]
    fn timestamps_come_from_data() {
        let block = Block::new(
            BTreeSet::new(),
            vec![
                Update::field("x", "d", "f", json!(1)).with_timestamp(10),
                Update::field("x", "d", "g", json!(2)).with_timestamp(20),
            ],
        );
        assert_eq!(block.first_timestamp(), Some(10));
        assert_eq!(block.last_timestamp(), Some(20));

        let empty = Block::new(BTreeSet::new(), Vec::new());
        assert_eq!(empty.first_timestamp(), None);
    }
}

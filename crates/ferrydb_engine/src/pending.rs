//! Blocks received from peers but not yet integrable.

use ferrydb_protocol::Block;
use std::collections::HashMap;
use uuid::Uuid;

/// Received blocks whose ancestors are not yet all present locally.
///
/// A pending block leaves this map the moment every id in its
/// `prev_blocks` is present in the graph. The map and the graph's block
/// map are disjoint at all times.
#[derive(Debug, Default)]
pub struct PendingBlockMap {
    blocks: HashMap<Uuid, Block>,
}

impl PendingBlockMap {
    /// Creates an empty pending map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a block keyed by its id. Re-inserting the same id replaces
    /// the previous copy; blocks are immutable, so both copies are equal.
    pub fn insert(&mut self, block: Block) {
        self.blocks.insert(block.id, block);
    }

    /// Removes a block by id.
    pub fn remove(&mut self, id: &Uuid) -> Option<Block> {
        self.blocks.remove(id)
    }

    /// Returns true if the id is pending.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.blocks.contains_key(id)
    }

    /// Ids of all pending blocks.
    pub fn ids(&self) -> Vec<Uuid> {
        self.blocks.keys().copied().collect()
    }

    /// Iterates over the pending blocks.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Number of pending blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn insert_contains_remove() {
        let mut pending = PendingBlockMap::new();
        let block = Block::new(BTreeSet::new(), Vec::new());
        let id = block.id;

        assert!(pending.is_empty());
        pending.insert(block);
        assert!(pending.contains(&id));
        assert_eq!(pending.len(), 1);

        let removed = pending.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(pending.is_empty());
    }

    #[test]
    fn reinsert_is_idempotent() {
        let mut pending = PendingBlockMap::new();
        let block = Block::new(BTreeSet::new(), Vec::new());
        pending.insert(block.clone());
        pending.insert(block);
        assert_eq!(pending.len(), 1);
    }
}

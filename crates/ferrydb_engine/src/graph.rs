//! The per-node append-only DAG of update blocks.

use crate::error::{EngineError, EngineResult};
use ferrydb_protocol::{Block, BlockDetails};
use ferrydb_storage::{Document, Storage};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Storage collection holding one document per block.
pub const BLOCKS_COLLECTION: &str = "blocks";
/// Storage collection holding the graph's head record.
pub const GRAPH_COLLECTION: &str = "block-graphs";
/// Id of the head record inside [`GRAPH_COLLECTION`].
pub const HEAD_RECORD_ID: &str = "head-blocks";

/// The block DAG of one node.
///
/// Edges run from a block to each id in its `prev_blocks`; the heads are
/// the blocks no other block references. The in-memory block map is a
/// fetch-through cache over storage, which owns durability: a graph can
/// always be rehydrated from its head record.
///
/// Concurrent commits on one graph are not allowed; callers serialize.
pub struct BlockGraph {
    storage: Arc<dyn Storage>,
    blocks: HashMap<Uuid, Block>,
    heads: BTreeSet<Uuid>,
}

impl BlockGraph {
    /// Creates an empty graph over the given storage.
    ///
    /// Call [`BlockGraph::load_head_blocks`] to pick up persisted state.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            blocks: HashMap::new(),
            heads: BTreeSet::new(),
        }
    }

    /// Loads the persisted head record and hydrates the listed blocks.
    pub fn load_head_blocks(&mut self) -> EngineResult<()> {
        let record = self.storage.get_document(GRAPH_COLLECTION, HEAD_RECORD_ID)?;
        let Some(record) = record else {
            return Ok(());
        };

        let heads_value = record.get("heads").cloned().unwrap_or(Value::Null);
        let heads: BTreeSet<Uuid> = serde_json::from_value(heads_value)?;

        for id in &heads {
            if self.get_block(id)?.is_none() {
                return Err(EngineError::Corrupted(format!(
                    "head record lists {id} but the block is not in storage"
                )));
            }
        }

        debug!(heads = heads.len(), "loaded block graph heads");
        self.heads = heads;
        Ok(())
    }

    /// Returns the current head ids.
    ///
    /// Always consistent with the block map: every head is hydrated.
    pub fn head_block_ids(&self) -> BTreeSet<Uuid> {
        self.heads.clone()
    }

    /// Returns the `{id, prev_blocks}` projection of every head.
    pub fn head_block_details(&mut self) -> EngineResult<Vec<BlockDetails>> {
        let ids = self.head_block_ids();
        let mut details = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_block(&id)? {
                Some(block) => details.push(block.details()),
                None => {
                    return Err(EngineError::Corrupted(format!(
                        "head {id} is not present in the graph"
                    )))
                }
            }
        }
        Ok(details)
    }

    /// Returns true if the block is present in memory or in storage.
    ///
    /// A storage hit hydrates the block into the in-memory map.
    pub fn has_block(&mut self, id: &Uuid) -> EngineResult<bool> {
        Ok(self.get_block(id)?.is_some())
    }

    /// Fetch-through lookup: memory first, then storage.
    pub fn get_block(&mut self, id: &Uuid) -> EngineResult<Option<Block>> {
        if let Some(block) = self.blocks.get(id) {
            return Ok(Some(block.clone()));
        }

        let document = self.storage.get_document(BLOCKS_COLLECTION, &id.to_string())?;
        match document {
            Some(document) => {
                let block = document_to_block(&document)?;
                self.blocks.insert(*id, block.clone());
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Commits a new block carrying `data`.
    ///
    /// The block's parents are the current heads, and afterwards the new
    /// block is the sole head: committing with a diverged graph produces a
    /// merge block. The in-memory graph is updated before persistence, and
    /// a persistence failure is surfaced without rolling it back; on
    /// restart the graph rehydrates from storage and may lose the
    /// unpersisted head.
    pub fn commit(&mut self, data: Vec<ferrydb_protocol::Update>) -> EngineResult<Block> {
        if data.is_empty() {
            return Err(EngineError::EmptyCommit);
        }

        let block = Block::new(self.heads.clone(), data);
        debug!(block_id = %block.id, parents = block.prev_blocks.len(), "committing block");

        self.blocks.insert(block.id, block.clone());
        self.heads = BTreeSet::from([block.id]);

        self.persist_block(&block)?;
        self.persist_heads()?;
        Ok(block)
    }

    /// Integrates a block committed elsewhere.
    ///
    /// Idempotent by id: integrating a block the graph already has is a
    /// no-op. The caller is responsible for only integrating blocks whose
    /// parents are all present.
    pub fn integrate(&mut self, block: Block) -> EngineResult<()> {
        if self.has_block(&block.id)? {
            return Ok(());
        }

        if block.data.iter().any(|u| u.timestamp() <= 0) {
            return Err(EngineError::MissingTimestamp { block_id: block.id });
        }

        debug!(block_id = %block.id, "integrating block");
        for parent in &block.prev_blocks {
            self.heads.remove(parent);
        }
        self.heads.insert(block.id);
        self.blocks.insert(block.id, block.clone());

        self.persist_block(&block)?;
        self.persist_heads()?;
        Ok(())
    }

    /// Returns every hydrated block.
    pub fn loaded_blocks(&self) -> Vec<Block> {
        self.blocks.values().cloned().collect()
    }

    fn persist_block(&self, block: &Block) -> EngineResult<()> {
        let document = block_to_document(block)?;
        self.storage.store_document(BLOCKS_COLLECTION, document)?;
        Ok(())
    }

    fn persist_heads(&self) -> EngineResult<()> {
        let heads = serde_json::to_value(&self.heads)?;
        let record = Document::new(HEAD_RECORD_ID).with("heads", heads);
        self.storage.store_document(GRAPH_COLLECTION, record)?;
        Ok(())
    }
}

fn block_to_document(block: &Block) -> EngineResult<Document> {
    let value = serde_json::to_value(block)?;
    let Value::Object(mut fields) = value else {
        return Err(EngineError::Corrupted(
            "block did not encode as an object".into(),
        ));
    };
    fields.remove("id");
    Ok(Document {
        id: block.id.to_string(),
        fields,
    })
}

fn document_to_block(document: &Document) -> EngineResult<Block> {
    let mut fields = document.fields.clone();
    fields.insert("id".to_string(), Value::String(document.id.clone()));
    Ok(serde_json::from_value(Value::Object(fields))?)
}

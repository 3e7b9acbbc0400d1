//! Property-based test generators and seeded random update streams.

use ferrydb_protocol::{Block, Update};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Strategy for generating valid document ids.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("d[0-9]{1,3}").expect("valid regex")
}

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("valid regex")
}

/// Strategy for generating JSON leaf values.
pub fn leaf_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z]{0,12}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Strategy for a single update with the given timestamp.
pub fn update_strategy(timestamp: i64) -> impl Strategy<Value = Update> {
    (
        doc_id_strategy(),
        field_name_strategy(),
        leaf_value_strategy(),
        prop::bool::weighted(0.15),
    )
        .prop_map(move |(doc_id, field, value, delete)| {
            if delete {
                Update::delete("x", doc_id).with_timestamp(timestamp)
            } else {
                Update::field("x", doc_id, field, value).with_timestamp(timestamp)
            }
        })
}

/// Strategy for a well-formed list of blocks.
///
/// Blocks are generated in commit order with strictly increasing
/// timestamps; each block's parents are the simulated head set at its
/// creation, with occasional forks (a block reusing its predecessor's
/// parents), so delivery-order shuffles exercise the pending map.
pub fn block_chain_strategy(max_blocks: usize) -> impl Strategy<Value = Vec<Block>> {
    let updates = prop::collection::vec((update_strategy(0), any::<bool>()), 1..=max_blocks);
    updates.prop_map(|entries| {
        let mut blocks: Vec<Block> = Vec::with_capacity(entries.len());
        let mut heads: BTreeSet<uuid::Uuid> = BTreeSet::new();
        let mut ts = 1i64;
        for (update, fork) in entries {
            // A fork reuses the previous block's parents instead of the
            // current heads, producing siblings.
            let parents = if fork && !blocks.is_empty() {
                blocks[blocks.len() - 1].prev_blocks.clone()
            } else {
                heads.clone()
            };
            let block = Block::new(parents.clone(), vec![update.with_timestamp(ts)]);
            ts += 1;
            for parent in &parents {
                heads.remove(parent);
            }
            heads.insert(block.id);
            blocks.push(block);
        }
        blocks
    })
}

/// A deterministic stream of random collection writes.
///
/// Used by soak tests and the node binary's data generator: the same seed
/// always produces the same sequence of operations.
pub struct UpdateStream {
    rng: StdRng,
    doc_pool: usize,
}

/// One generated write operation.
#[derive(Debug, Clone)]
pub enum GeneratedOp {
    /// Upsert the given document with the given partial.
    Upsert {
        /// Document id.
        doc_id: String,
        /// Fields to assign.
        partial: Map<String, Value>,
    },
    /// Delete the given document.
    Delete {
        /// Document id.
        doc_id: String,
    },
}

impl UpdateStream {
    /// Creates a stream from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            doc_pool: 16,
        }
    }

    /// Produces the next operation.
    pub fn next_op(&mut self) -> GeneratedOp {
        let doc_id = format!("d{}", self.rng.gen_range(0..self.doc_pool));
        if self.rng.gen_bool(0.1) {
            return GeneratedOp::Delete { doc_id };
        }

        let mut partial = Map::new();
        for _ in 0..self.rng.gen_range(1..=3) {
            let field = format!("f{}", self.rng.gen_range(0..6));
            let value = match self.rng.gen_range(0..3) {
                0 => json!(self.rng.gen_range(0..1000)),
                1 => json!(self.rng.gen_bool(0.5)),
                _ => json!(format!("v{}", self.rng.gen_range(0..100))),
            };
            partial.insert(field, value);
        }
        GeneratedOp::Upsert { doc_id, partial }
    }
}

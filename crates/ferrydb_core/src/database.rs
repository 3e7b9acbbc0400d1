//! The database: a named namespace of collections plus the sync bridge.

use crate::collection::Collection;
use crate::error::{CoreError, CoreResult};
use ferrydb_protocol::{canonical_sha256_hex, Update};
use ferrydb_storage::Storage;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Collection names owned by the sync engine's block graph.
///
/// Application collections may not use them; the engine and the database
/// share one storage and stay out of each other's way by name.
pub const SYNC_RESERVED_COLLECTIONS: [&str; 2] = ["blocks", "block-graphs"];

type OutgoingHandler = Arc<dyn Fn(&[Update]) + Send + Sync>;

/// Holder for the injected outgoing-update handler.
///
/// The handler is registered after construction (the engine needs the
/// database and vice versa); until then local writes simply skip the
/// outgoing hop.
pub(crate) struct OutgoingSlot {
    handler: RwLock<Option<OutgoingHandler>>,
}

impl OutgoingSlot {
    pub(crate) fn new() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }

    pub(crate) fn set(&self, handler: OutgoingHandler) {
        *self.handler.write() = Some(handler);
    }

    pub(crate) fn emit(&self, updates: &[Update]) {
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(updates);
        }
    }
}

/// A named document database over a shared [`Storage`].
///
/// Collections are created on first access and live as long as the
/// database; subscribing twice to the "same" collection therefore always
/// lands on one instance.
pub struct Database {
    name: String,
    storage: Arc<dyn Storage>,
    collections: RwLock<BTreeMap<String, Arc<Collection>>>,
    outgoing: Arc<OutgoingSlot>,
}

impl Database {
    /// Creates a database over the given storage.
    pub fn new(name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            name: name.into(),
            storage,
            collections: RwLock::new(BTreeMap::new()),
            outgoing: Arc::new(OutgoingSlot::new()),
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the collection with the given name, creating it on first
    /// access.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReservedCollection`] for names the sync engine
    /// owns.
    pub fn collection(&self, name: &str) -> CoreResult<Arc<Collection>> {
        if SYNC_RESERVED_COLLECTIONS.contains(&name) {
            return Err(CoreError::ReservedCollection(name.to_string()));
        }

        if let Some(collection) = self.collections.read().get(name) {
            return Ok(Arc::clone(collection));
        }

        let mut collections = self.collections.write();
        let collection = collections.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Collection::new(
                name.to_string(),
                Arc::clone(&self.storage),
                Arc::clone(&self.outgoing),
            ))
        });
        Ok(Arc::clone(collection))
    }

    /// Registers the handler that receives every locally produced update
    /// batch. In a running node this is the sync engine's commit path.
    pub fn set_outgoing_handler(&self, handler: impl Fn(&[Update]) + Send + Sync + 'static) {
        self.outgoing.set(Arc::new(handler));
    }

    /// Applies a batch of remote updates.
    ///
    /// Called by the sync engine only. The batch arrives timestamp-sorted;
    /// it is partitioned by collection preserving arrival order, every
    /// affected collection's subscribers are notified first, then the
    /// updates are applied to storage one by one in arrival order.
    pub fn apply_incoming_updates(&self, updates: &[Update]) -> CoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        debug!(database = %self.name, updates = updates.len(), "applying incoming updates");

        let mut order: Vec<&str> = Vec::new();
        let mut by_collection: BTreeMap<&str, Vec<Update>> = BTreeMap::new();
        for update in updates {
            let name = update.collection();
            if !by_collection.contains_key(name) {
                order.push(name);
            }
            by_collection.entry(name).or_default().push(update.clone());
        }

        let mut targets = Vec::with_capacity(order.len());
        for name in &order {
            targets.push((self.collection(name)?, &by_collection[name]));
        }

        for (collection, batch) in &targets {
            collection.notify_subscribers(batch);
        }
        for (collection, batch) in &targets {
            collection.apply_to_storage(batch)?;
        }
        Ok(())
    }

    /// Computes the canonical hash of the full document state.
    ///
    /// Every document collection the storage holds is read (the sync
    /// engine's reserved collections are skipped), each document set is
    /// sorted by `_id`, the sets are assembled into one
    /// `collection name -> documents` object, and the canonical JSON
    /// encoding is hashed. The listing comes from storage, not the
    /// in-process registry, so a freshly constructed database over
    /// pre-existing storage hashes identically to the one that wrote it.
    /// Two converged replicas produce equal hashes.
    pub fn hash(&self) -> CoreResult<String> {
        let mut top = Map::new();
        for name in self.storage.collection_names()? {
            if SYNC_RESERVED_COLLECTIONS.contains(&name.as_str()) {
                continue;
            }
            let mut documents = self.storage.get_all_documents(&name)?;
            documents.sort_by(|a, b| a.id.cmp(&b.id));
            let docs: Vec<Value> = documents.iter().map(|d| d.to_value()).collect();
            top.insert(name, Value::Array(docs));
        }

        Ok(canonical_sha256_hex(&Value::Object(top)))
    }
}

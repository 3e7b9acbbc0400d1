//! Collections: document CRUD that emits sync updates.

use crate::database::OutgoingSlot;
use crate::error::CoreResult;
use crate::subscription::{Subscribers, Subscription};
use ferrydb_protocol::Update;
use ferrydb_storage::{Document, Storage};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// An ordered bag of documents addressed by `_id`.
///
/// Every local write synthesizes timestamped updates and fans them out in
/// a fixed order: subscribers first (UI latency), then the outgoing
/// handler (which reaches the sync engine), then storage. Incoming remote
/// updates take the same path minus the outgoing hop, via
/// [`crate::Database::apply_incoming_updates`].
///
/// Callers must treat a collection as single-threaded: concurrent writes
/// to the same collection are not coordinated here.
pub struct Collection {
    name: String,
    storage: Arc<dyn Storage>,
    subscribers: Subscribers,
    outgoing: Arc<OutgoingSlot>,
}

impl Collection {
    pub(crate) fn new(
        name: String,
        storage: Arc<dyn Storage>,
        outgoing: Arc<OutgoingSlot>,
    ) -> Self {
        Self {
            name,
            storage,
            subscribers: Subscribers::new(),
            outgoing,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads every document.
    pub fn get_all(&self) -> CoreResult<Vec<Document>> {
        Ok(self.storage.get_all_documents(&self.name)?)
    }

    /// Reads every document whose `field` equals `value`.
    pub fn get_matching(&self, field: &str, value: &Value) -> CoreResult<Vec<Document>> {
        Ok(self
            .storage
            .get_matching_documents(&self.name, field, value)?)
    }

    /// Reads one document by id.
    pub fn get_one(&self, id: &str) -> CoreResult<Option<Document>> {
        Ok(self.storage.get_document(&self.name, id)?)
    }

    /// Creates or updates a document from a partial field bag.
    ///
    /// One `Field` update is synthesized per entry of `partial` (the `_id`
    /// key is skipped), each stamped with the current wall clock. The
    /// updates are delivered to subscribers, handed to the outgoing
    /// handler, and finally merged into the stored document.
    pub fn upsert_one(&self, id: &str, partial: Map<String, Value>) -> CoreResult<()> {
        let updates: Vec<Update> = partial
            .iter()
            .filter(|(field, _)| field.as_str() != "_id")
            .map(|(field, value)| {
                Update::field(self.name.as_str(), id, field.as_str(), value.clone())
            })
            .collect();
        if updates.is_empty() {
            return Ok(());
        }

        debug!(collection = %self.name, doc_id = %id, updates = updates.len(), "upsert");
        self.subscribers.notify(&updates);
        self.outgoing.emit(&updates);

        let mut document = self
            .storage
            .get_document(&self.name, id)?
            .unwrap_or_else(|| Document::new(id));
        for (field, value) in partial {
            if field != "_id" {
                document.set(field, value);
            }
        }
        self.storage.store_document(&self.name, document)?;
        Ok(())
    }

    /// Removes a document.
    ///
    /// Emits a single `Delete` update through the same three-step fan-out
    /// as [`Collection::upsert_one`].
    pub fn delete_one(&self, id: &str) -> CoreResult<()> {
        let updates = vec![Update::delete(self.name.as_str(), id)];

        debug!(collection = %self.name, doc_id = %id, "delete");
        self.subscribers.notify(&updates);
        self.outgoing.emit(&updates);

        self.storage.delete_document(&self.name, id)?;
        Ok(())
    }

    /// Registers a callback invoked with each batch of updates affecting
    /// this collection, local and remote alike.
    ///
    /// Subscription is unfiltered; filtering belongs to higher layers.
    pub fn subscribe(
        &self,
        callback: impl Fn(&[Update]) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribers.subscribe(Arc::new(callback))
    }

    /// Delivers an incoming batch to this collection's subscribers.
    pub(crate) fn notify_subscribers(&self, updates: &[Update]) {
        self.subscribers.notify(updates);
    }

    /// Applies an incoming batch to storage, one update at a time, in
    /// arrival order. The batch is already timestamp-sorted by the sync
    /// engine's rebuild.
    pub(crate) fn apply_to_storage(&self, updates: &[Update]) -> CoreResult<()> {
        for update in updates {
            match update {
                Update::Field {
                    doc_id,
                    field,
                    value,
                    ..
                } => {
                    let mut document = self
                        .storage
                        .get_document(&self.name, doc_id)?
                        .unwrap_or_else(|| Document::new(doc_id));
                    document.set(field, value.clone());
                    self.storage.store_document(&self.name, document)?;
                }
                Update::Delete { doc_id, .. } => {
                    self.storage.delete_document(&self.name, doc_id)?;
                }
            }
        }
        Ok(())
    }
}

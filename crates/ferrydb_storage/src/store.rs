//! Storage trait definition.

use crate::document::Document;
use crate::error::StorageResult;
use serde_json::Value;

/// A durable per-collection document store.
///
/// Backends map `(collection name, document id)` to a [`Document`]. They
/// are shared between the sync engine (for its `blocks` and `block-graphs`
/// collections) and the database (for application documents); the two use
/// disjoint collection names, so backends need no cross-collection
/// coordination.
///
/// # Invariants
///
/// - `store_document` upserts: a second store with the same id replaces
///   the first
/// - `get_document` returns exactly what was last stored for that id
/// - deleting an absent document is a no-op, not an error
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryStorage`] - For testing
/// - [`super::FileStorage`] - For persistent storage
pub trait Storage: Send + Sync {
    /// Reads every document in a collection.
    ///
    /// An unknown collection reads as empty.
    fn get_all_documents(&self, collection: &str) -> StorageResult<Vec<Document>>;

    /// Reads every document whose `field` equals `value`.
    ///
    /// `_id` may be matched like any other field. A naive full scan is an
    /// acceptable implementation.
    fn get_matching_documents(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StorageResult<Vec<Document>>;

    /// Reads one document by id.
    fn get_document(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Writes one document, replacing any existing document with its id.
    fn store_document(&self, collection: &str, document: Document) -> StorageResult<()>;

    /// Removes one document by id.
    fn delete_document(&self, collection: &str, id: &str) -> StorageResult<()>;

    /// Removes every document in a collection.
    fn delete_all_documents(&self, collection: &str) -> StorageResult<()>;

    /// Names of every collection currently holding at least one document,
    /// sorted ascending.
    ///
    /// A collection exists exactly as long as it has documents: one that
    /// was emptied by deletes reads the same as one never written. The
    /// database hash is built over this listing, so it must reflect the
    /// stored state, not any in-memory bookkeeping.
    fn collection_names(&self) -> StorageResult<Vec<String>>;
}

/// Returns the documents of `collection` whose `field` equals `value`,
/// implemented as a full scan over `get_all_documents`.
///
/// Shared by backends that do not maintain secondary indexes.
pub(crate) fn scan_matching(
    documents: Vec<Document>,
    field: &str,
    value: &Value,
) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|doc| {
            if field == "_id" {
                value.as_str() == Some(doc.id.as_str())
            } else {
                doc.get(field) == Some(value)
            }
        })
        .collect()
}

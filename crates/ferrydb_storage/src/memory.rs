//! In-memory storage backend for testing and ephemeral nodes.

use crate::document::Document;
use crate::error::StorageResult;
use crate::store::{scan_matching, Storage};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// An in-memory storage backend.
///
/// Suitable for unit tests, integration tests, and nodes that do not need
/// to survive a restart. Documents within a collection are kept ordered by
/// id so that iteration order is deterministic.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStorage {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_all_documents(&self, collection: &str) -> StorageResult<Vec<Document>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    fn get_matching_documents(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StorageResult<Vec<Document>> {
        Ok(scan_matching(
            self.get_all_documents(collection)?,
            field,
            value,
        ))
    }

    fn get_document(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn store_document(&self, collection: &str, document: Document) -> StorageResult<()> {
        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(document.id.clone(), document);
        Ok(())
    }

    fn delete_document(&self, collection: &str, id: &str) -> StorageResult<()> {
        let mut collections = self.collections.write();
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    fn delete_all_documents(&self, collection: &str) -> StorageResult<()> {
        let mut collections = self.collections.write();
        collections.remove(collection);
        Ok(())
    }

    fn collection_names(&self) -> StorageResult<Vec<String>> {
        let collections = self.collections.read();
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_collection_reads_empty() {
        let storage = MemoryStorage::new();
        assert!(storage.get_all_documents("missing").unwrap().is_empty());
        assert!(storage.get_document("missing", "x").unwrap().is_none());
    }

    #[test]
    fn store_and_get() {
        let storage = MemoryStorage::new();
        let doc = Document::new("d1").with("f", json!(1));
        storage.store_document("c", doc.clone()).unwrap();

        assert_eq!(storage.get_document("c", "d1").unwrap(), Some(doc));
    }

    #[test]
    fn store_replaces() {
        let storage = MemoryStorage::new();
        storage
            .store_document("c", Document::new("d1").with("f", json!(1)))
            .unwrap();
        storage
            .store_document("c", Document::new("d1").with("f", json!(2)))
            .unwrap();

        let doc = storage.get_document("c", "d1").unwrap().unwrap();
        assert_eq!(doc.get("f"), Some(&json!(2)));
        assert_eq!(storage.get_all_documents("c").unwrap().len(), 1);
    }

    #[test]
    fn get_all_is_ordered_by_id() {
        let storage = MemoryStorage::new();
        for id in ["b", "a", "c"] {
            storage.store_document("c", Document::new(id)).unwrap();
        }
        let ids: Vec<String> = storage
            .get_all_documents("c")
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn matching_scans_fields_and_id() {
        let storage = MemoryStorage::new();
        storage
            .store_document("c", Document::new("d1").with("kind", json!("task")))
            .unwrap();
        storage
            .store_document("c", Document::new("d2").with("kind", json!("note")))
            .unwrap();

        let tasks = storage
            .get_matching_documents("c", "kind", &json!("task"))
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "d1");

        let by_id = storage
            .get_matching_documents("c", "_id", &json!("d2"))
            .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].id, "d2");
    }

    #[test]
    fn delete_document_and_all() {
        let storage = MemoryStorage::new();
        storage.store_document("c", Document::new("d1")).unwrap();
        storage.store_document("c", Document::new("d2")).unwrap();

        storage.delete_document("c", "d1").unwrap();
        assert!(storage.get_document("c", "d1").unwrap().is_none());

        // Deleting an absent document is a no-op.
        storage.delete_document("c", "d1").unwrap();

        storage.delete_all_documents("c").unwrap();
        assert!(storage.get_all_documents("c").unwrap().is_empty());
    }

    #[test]
    fn collections_are_disjoint() {
        let storage = MemoryStorage::new();
        storage.store_document("a", Document::new("d")).unwrap();
        storage.store_document("b", Document::new("d")).unwrap();

        storage.delete_document("a", "d").unwrap();
        assert!(storage.get_document("b", "d").unwrap().is_some());
        assert_eq!(storage.collection_names().unwrap(), vec!["b"]);
    }

    #[test]
    fn collection_names_track_stored_state() {
        let storage = MemoryStorage::new();
        assert!(storage.collection_names().unwrap().is_empty());

        storage.store_document("b", Document::new("d")).unwrap();
        storage.store_document("a", Document::new("d")).unwrap();
        assert_eq!(storage.collection_names().unwrap(), vec!["a", "b"]);

        // A collection emptied by deletes no longer exists.
        storage.delete_document("a", "d").unwrap();
        assert_eq!(storage.collection_names().unwrap(), vec!["b"]);
    }
}

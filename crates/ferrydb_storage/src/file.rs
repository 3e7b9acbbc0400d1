//! File-based storage backend for persistent storage.

use crate::document::Document;
use crate::error::{StorageError, StorageResult};
use crate::store::{scan_matching, Storage};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// Each collection is kept as one JSON file (`<collection>.json`) under a
/// root directory, holding a map from document id to document. Collections
/// load lazily on first access and stay cached; every mutation rewrites
/// the collection file through a temporary file and rename, so a crash
/// mid-write leaves the previous contents intact.
///
/// Data survives process restarts; within a run the in-memory cache is
/// authoritative. Collection enumeration reads file stems back as
/// collection names, so names should be file-name safe: path separators
/// and dots are replaced on write and that replacement is not reversed.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    cache: Mutex<HashMap<String, BTreeMap<String, Document>>>,
}

impl FileStorage {
    /// Opens or creates a file storage rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        // Collection names come from trusted callers, but never let one
        // escape the root directory.
        let safe: String = collection
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '.' { '_' } else { c })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    fn load(
        &self,
        cache: &mut HashMap<String, BTreeMap<String, Document>>,
        collection: &str,
    ) -> StorageResult<()> {
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let docs = if path.exists() {
            let bytes = fs::read(&path)?;
            let by_id: BTreeMap<String, Document> = serde_json::from_slice(&bytes)?;
            for (id, doc) in &by_id {
                if *id != doc.id {
                    return Err(StorageError::Corrupted(format!(
                        "document keyed {id} carries _id {}",
                        doc.id
                    )));
                }
            }
            by_id
        } else {
            BTreeMap::new()
        };

        cache.insert(collection.to_string(), docs);
        Ok(())
    }

    fn persist(
        &self,
        collection: &str,
        docs: &BTreeMap<String, Document>,
    ) -> StorageResult<()> {
        let path = self.collection_path(collection);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(docs)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_all_documents(&self, collection: &str) -> StorageResult<Vec<Document>> {
        let mut cache = self.cache.lock();
        self.load(&mut cache, collection)?;
        Ok(cache[collection].values().cloned().collect())
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
        let mut cache = self.cache.lock();
        self.load(&mut cache, collection)?;
        Ok(cache[collection].get(id).cloned())
    }

    fn store_document(&self, collection: &str, document: Document) -> StorageResult<()> {
        let mut cache = self.cache.lock();
        self.load(&mut cache, collection)?;
        let docs = cache.entry(collection.to_string()).or_default();
        docs.insert(document.id.clone(), document);
        self.persist(collection, docs)
    }

    fn delete_document(&self, collection: &str, id: &str) -> StorageResult<()> {
        let mut cache = self.cache.lock();
        self.load(&mut cache, collection)?;
        let docs = cache.entry(collection.to_string()).or_default();
        if docs.remove(id).is_some() {
            self.persist(collection, docs)?;
        }
        Ok(())
    }

    fn delete_all_documents(&self, collection: &str) -> StorageResult<()> {
        let mut cache = self.cache.lock();
        cache.insert(collection.to_string(), BTreeMap::new());
        let path = self.collection_path(collection);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn collection_names(&self) -> StorageResult<Vec<String>> {
        let mut cache = self.cache.lock();

        let mut candidates: BTreeSet<String> = cache.keys().cloned().collect();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                candidates.insert(stem.to_string());
            }
        }

        let mut names = Vec::new();
        for name in candidates {
            self.load(&mut cache, &name)?;
            if !cache[&name].is_empty() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

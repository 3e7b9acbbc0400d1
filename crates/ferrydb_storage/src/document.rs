//! The document type stored by every backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single document: a unique id plus a flat bag of JSON fields.
///
/// On the wire and on disk the id travels inline as `_id`, matching the
/// application-facing shape `{ _id, ...fields }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique id within the collection.
    #[serde(rename = "_id")]
    pub id: String,
    /// All remaining fields of the document.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Creates an empty document with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Sets one field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Reads one field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns the document as a single JSON object including `_id`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_travels_as_underscore_id() {
        let doc = Document::new("d1").with("title", json!("hello"));
        let encoded = serde_json::to_string(&doc).unwrap();
        assert!(encoded.contains("\"_id\":\"d1\""));
        assert!(encoded.contains("\"title\":\"hello\""));

        let decoded: Document = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn to_value_includes_id() {
        let doc = Document::new("d2").with("n", json!(5));
        assert_eq!(doc.to_value(), json!({"_id": "d2", "n": 5}));
    }

    #[test]
    fn set_replaces() {
        let mut doc = Document::new("d3");
        doc.set("f", json!(1));
        doc.set("f", json!(2));
        assert_eq!(doc.get("f"), Some(&json!(2)));
    }
}

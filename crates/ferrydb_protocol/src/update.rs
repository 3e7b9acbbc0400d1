//! Update records: the unit of change in FerryDB.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall clock in milliseconds since the Unix epoch.
///
/// This is the sole ordering key for updates. Clock skew between nodes is
/// tolerated the same way last-writer-wins tolerates it: the later stamp
/// wins regardless of which node produced it.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// An immutable record describing one change to one document.
///
/// Updates are stamped with the originating node's wall clock at creation
/// time and never mutated afterwards. Replicas replay updates in timestamp
/// order to rebuild document state, so equal inputs always produce equal
/// documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Update {
    /// Assigns one field of one document.
    #[serde(rename_all = "camelCase")]
    Field {
        /// Originating wall clock in milliseconds since epoch.
        timestamp: i64,
        /// Collection the document lives in.
        collection: String,
        /// Document id.
        doc_id: String,
        /// Field name being assigned.
        field: String,
        /// New field value, kept as opaque JSON until the application
        /// decodes it with a schema it owns.
        value: Value,
    },
    /// Removes one document.
    #[serde(rename_all = "camelCase")]
    Delete {
        /// Originating wall clock in milliseconds since epoch.
        timestamp: i64,
        /// Collection the document lives in.
        collection: String,
        /// Document id.
        doc_id: String,
    },
}

impl Update {
    /// Creates a field assignment stamped with the current wall clock.
    pub fn field(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        field: impl Into<String>,
        value: Value,
    ) -> Self {
        Self::Field {
            timestamp: now_millis(),
            collection: collection.into(),
            doc_id: doc_id.into(),
            field: field.into(),
            value,
        }
    }

    /// Creates a delete stamped with the current wall clock.
    pub fn delete(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self::Delete {
            timestamp: now_millis(),
            collection: collection.into(),
            doc_id: doc_id.into(),
        }
    }

    /// Returns the update's timestamp.
    pub fn timestamp(&self) -> i64 {
        match self {
            Update::Field { timestamp, .. } | Update::Delete { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the collection this update targets.
    pub fn collection(&self) -> &str {
        match self {
            Update::Field { collection, .. } | Update::Delete { collection, .. } => collection,
        }
    }

    /// Returns the document id this update targets.
    pub fn doc_id(&self) -> &str {
        match self {
            Update::Field { doc_id, .. } | Update::Delete { doc_id, .. } => doc_id,
        }
    }

    /// Returns a copy with the timestamp replaced.
    ///
    /// Used by tests and generators that need explicit clocks.
    pub fn with_timestamp(mut self, ts: i64) -> Self {
        match &mut self {
            Update::Field { timestamp, .. } | Update::Delete { timestamp, .. } => *timestamp = ts,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_update_roundtrip() {
        let update = Update::field("tasks", "t1", "title", json!("buy milk")).with_timestamp(42);

        let encoded = serde_json::to_string(&update).unwrap();
        assert!(encoded.contains("\"type\":\"field\""));
        assert!(encoded.contains("\"docId\":\"t1\""));

        let decoded: Update = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn delete_update_roundtrip() {
        let update = Update::delete("tasks", "t1").with_timestamp(7);

        let encoded = serde_json::to_string(&update).unwrap();
        assert!(encoded.contains("\"type\":\"delete\""));

        let decoded: Update = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, update);
        assert_eq!(decoded.timestamp(), 7);
    }

    #[test]
    fn accessors() {
        let update = Update::field("projects", "p9", "name", json!(1)).with_timestamp(100);
        assert_eq!(update.collection(), "projects");
        assert_eq!(update.doc_id(), "p9");
        assert_eq!(update.timestamp(), 100);
    }

    #[test]
    fn now_millis_is_recent() {
        // Anything after 2020-01-01 counts as a sane wall clock.
        assert!(now_millis() > 1_577_836_800_000);
    }
}

//! The record model shared by every backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A stored record. `data` is opaque to the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// UUID v4 string.
    pub id: String,
    /// Collection the record belongs to.
    pub collection: String,
    /// Creation time, ms since epoch.
    pub created_at: i64,
    /// Last update time, ms since epoch.
    pub updated_at: i64,
    /// Application payload.
    pub data: Value,
}

impl Record {
    /// Creates a record with a fresh id.
    pub fn new(collection: impl Into<String>, data: Value, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            collection: collection.into(),
            created_at: now_ms,
            updated_at: now_ms,
            data,
        }
    }

    /// Applies `patch` and bumps `updated_at`.
    ///
    /// Object patches are merged field by field at the top level; a `null`
    /// field removes the key. Any other patch replaces `data`.
    pub fn apply_patch(&mut self, patch: Value, now_ms: i64) {
        match (&mut self.data, patch) {
            (Value::Object(current), Value::Object(fields)) => {
                for (k, v) in fields {
                    if v.is_null() {
                        current.remove(&k);
                    } else {
                        current.insert(k, v);
                    }
                }
            }
            (_, patch) => self.data = patch,
        }
        self.updated_at = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_has_uuid() {
        let r = Record::new("patients", json!({"name": "A"}), 5);
        assert!(Uuid::parse_str(&r.id).is_ok());
        assert_eq!(r.created_at, 5);
        assert_eq!(r.updated_at, 5);
    }

    #[test]
    fn test_object_patch_merges() {
        let mut r = Record::new("patients", json!({"name": "A", "age": 30, "ward": 3}), 0);
        r.apply_patch(json!({"age": 31, "ward": null}), 9);
        assert_eq!(r.data, json!({"name": "A", "age": 31}));
        assert_eq!(r.updated_at, 9);
        assert_eq!(r.created_at, 0);
    }

    #[test]
    fn test_non_object_patch_replaces() {
        let mut r = Record::new("notes", json!("draft"), 0);
        r.apply_patch(json!(["final"]), 1);
        assert_eq!(r.data, json!(["final"]));
    }
}

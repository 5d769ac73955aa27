//! Default dataset for a freshly activated fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::backend::RecordBackend;
use crate::error::BackendResult;

/// Departments created in an empty fallback.
pub const DEFAULT_DEPARTMENTS: [&str; 5] = [
    "General Medicine",
    "Emergency",
    "Pediatrics",
    "Surgery",
    "Radiology",
];

/// Records to create per collection when the fallback has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    /// Whether seeding runs at all.
    pub enabled: bool,
    /// Collection name to the records it should start with.
    pub collections: BTreeMap<String, Vec<Value>>,
}

impl Default for SeedData {
    fn default() -> Self {
        let mut collections = BTreeMap::new();
        collections.insert(
            "users".to_string(),
            vec![json!({
                "username": "admin",
                "display_name": "Administrator",
                "role": "admin",
            })],
        );
        collections.insert(
            "departments".to_string(),
            DEFAULT_DEPARTMENTS
                .iter()
                .map(|name| json!({ "name": name }))
                .collect(),
        );
        Self {
            enabled: true,
            collections,
        }
    }
}

impl SeedData {
    /// A dataset that creates nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            collections: BTreeMap::new(),
        }
    }
}

/// Creates each seeded collection in `backend` if it holds no records yet.
/// Returns the number of records created.
pub async fn seed_backend<B: RecordBackend>(backend: &B, seed: &SeedData) -> BackendResult<usize> {
    if !seed.enabled {
        return Ok(0);
    }
    let mut created = 0;
    for (collection, records) in &seed.collections {
        if backend.count(collection).await? > 0 {
            debug!(collection = %collection, "collection already populated, not seeding");
            continue;
        }
        for data in records {
            backend.create(collection, data.clone()).await?;
            created += 1;
        }
    }
    info!(backend = backend.name(), created, "seeded default dataset");
    Ok(created)
}

//! Rows stored by the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::RowKey;

/// A row: primary key, version metadata and JSON column values.
///
/// Serialized form uses `_`-prefixed metadata fields so they cannot collide
/// with user columns:
///
/// ```text
/// { "_pk": "abc123", "_version": 1, "_created_at": "...", "_updated_at": "...", "name": "abc" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "_pk")]
    pub key: RowKey,
    #[serde(rename = "_version")]
    pub version: u64,
    #[serde(rename = "_created_at")]
    pub created_at: String,
    #[serde(rename = "_updated_at")]
    pub updated_at: String,
    #[serde(flatten)]
    pub data: BTreeMap<String, Value>,
}

impl Row {
    /// Creates a new row at version 1, stamped with the current time.
    pub fn new(key: RowKey, data: BTreeMap<String, Value>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            key,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
            data,
        }
    }

    /// Create a row from a JSON object.
    pub fn from_value(key: RowKey, value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(key, map.into_iter().collect())),
            _ => Err(StorageError::SchemaViolation(
                "row data must be a JSON object".to_string(),
            )),
        }
    }

    /// Serialize the row, metadata included.
    pub fn to_value(&self) -> StorageResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Merge column updates into this row, bumping version and timestamp.
    pub fn merge_data(&mut self, updates: BTreeMap<String, Value>) {
        self.data.extend(updates);
        self.version += 1;
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Get a column value by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }
}

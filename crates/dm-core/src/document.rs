//! Structured model of document-store migration files.
//!
//! A file under `migrations/mongodb/` is a JSON object with required
//! `version` and `description` keys and up to four optional operation
//! blocks. Each block is parsed into its own typed record at discovery, so
//! a malformed block is rejected before anything touches the store.
//!
//! ```json
//! {
//!   "version": "1.1",
//!   "description": "Create transaction events",
//!   "collections": [{ "name": "transaction_events" }],
//!   "indexes": [{ "collection": "transaction_events",
//!                 "index": { "account_id": 1, "created_at": -1 },
//!                 "options": { "name": "account_created" } }],
//!   "data": [{ "type": "insert", "collection": "event_types",
//!              "documents": [{ "code": "DEPOSIT" }] }],
//!   "aggregations": [{ "collection": "event_types",
//!                      "pipeline": [{ "$match": { "code": "DEPOSIT" } }] }]
//! }
//! ```

use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::string_or_number;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// A JSON object (key order preserved).
pub type JsonObject = serde_json::Map<String, Value>;

/// Parsed document migration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMigration {
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,

    pub description: String,

    #[serde(default)]
    pub collections: Vec<CreateCollection>,

    #[serde(default)]
    pub indexes: Vec<CreateIndex>,

    #[serde(default)]
    pub data: Vec<DataOperation>,

    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

/// Create a collection if it does not already exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCollection {
    pub name: String,
    #[serde(default)]
    pub options: JsonObject,
}

/// Create an index. `index` is the ordered key specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndex {
    pub collection: String,
    pub index: JsonObject,
    #[serde(default)]
    pub options: JsonObject,
}

/// One or many documents for an insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Documents {
    Many(Vec<JsonObject>),
    One(JsonObject),
}

impl Documents {
    /// Borrow the documents as a slice, regardless of shape.
    pub fn as_slice(&self) -> &[JsonObject] {
        match self {
            Documents::Many(docs) => docs,
            Documents::One(doc) => std::slice::from_ref(doc),
        }
    }
}

/// A data manipulation operation, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataOperation {
    Insert {
        collection: String,
        documents: Documents,
    },
    Update {
        collection: String,
        filter: JsonObject,
        /// Update document (`{"$set": ...}`) or update pipeline (array)
        update: Value,
        #[serde(default)]
        options: JsonObject,
    },
    Delete {
        collection: String,
        filter: JsonObject,
    },
}

impl DataOperation {
    /// Target collection of the operation.
    pub fn collection(&self) -> &str {
        match self {
            DataOperation::Insert { collection, .. }
            | DataOperation::Update { collection, .. }
            | DataOperation::Delete { collection, .. } => collection,
        }
    }

    /// Operation name as written in the file.
    pub fn kind(&self) -> &'static str {
        match self {
            DataOperation::Insert { .. } => "insert",
            DataOperation::Update { .. } => "update",
            DataOperation::Delete { .. } => "delete",
        }
    }
}

/// Aggregation pipeline, run and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub collection: String,
    pub pipeline: Vec<JsonObject>,
}

/// One operation of a document migration, in application order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocumentOperation<'a> {
    CreateCollection(&'a CreateCollection),
    CreateIndex(&'a CreateIndex),
    Data(&'a DataOperation),
    Aggregate(&'a Aggregation),
}

impl DocumentMigration {
    /// Parse a migration file's content.
    ///
    /// Errors distinguish the three ways a file can be unusable:
    /// - [`CoreError::Json`]: the content is not valid JSON
    /// - [`CoreError::MissingField`]: `version` or `description` is absent or empty
    /// - [`CoreError::InvalidMigration`]: an operation block has the wrong shape
    pub fn parse(content: &str, path: &Path) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(content)?;

        let Some(object) = value.as_object() else {
            return Err(CoreError::InvalidMigration {
                path: path.display().to_string(),
                reason: "top-level value must be a JSON object".to_string(),
            });
        };

        for field in ["version", "description"] {
            let present = match object.get(field) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            };
            if !present {
                return Err(CoreError::MissingField {
                    path: path.display().to_string(),
                    field: field.to_string(),
                });
            }
        }

        serde_json::from_value(value).map_err(|e| CoreError::InvalidMigration {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// All operations in the fixed application order: collection creation,
    /// index creation, data operations (file order), aggregations.
    pub fn operations(&self) -> impl Iterator<Item = DocumentOperation<'_>> {
        self.collections
            .iter()
            .map(DocumentOperation::CreateCollection)
            .chain(self.indexes.iter().map(DocumentOperation::CreateIndex))
            .chain(self.data.iter().map(DocumentOperation::Data))
            .chain(self.aggregations.iter().map(DocumentOperation::Aggregate))
    }

    /// Number of declared operations (not the number of affected records).
    pub fn declared_operations(&self) -> usize {
        self.collections.len() + self.indexes.len() + self.data.len() + self.aggregations.len()
    }
}

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;

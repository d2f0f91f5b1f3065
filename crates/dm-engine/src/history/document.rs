//! Migration history collection in the document store.

use super::HistoryRepository;
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dm_core::serde_helpers::sortable_timestamp;
use dm_core::{AppliedMigrationRecord, MigrationKind};
use dm_db::{Document, DocumentStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Stored shape of one history document.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    version: String,
    description: String,
    #[serde(rename = "type")]
    kind: MigrationKind,
    script: String,
    checksum: String,
    installed_by: String,
    #[serde(with = "sortable_timestamp")]
    installed_on: DateTime<Utc>,
    #[serde(default)]
    execution_time: i64,
    success: bool,
    #[serde(default)]
    operations_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl From<&AppliedMigrationRecord> for HistoryDocument {
    fn from(record: &AppliedMigrationRecord) -> Self {
        Self {
            version: record.version.clone(),
            description: record.description.clone(),
            kind: record.kind,
            script: record.script.clone(),
            checksum: record.checksum.clone(),
            installed_by: record.installed_by.clone(),
            installed_on: record.installed_on,
            execution_time: record.execution_time_ms,
            success: record.success,
            operations_count: record.operations_count.unwrap_or(0),
            error_message: record.error_message.clone(),
        }
    }
}

impl From<HistoryDocument> for AppliedMigrationRecord {
    fn from(doc: HistoryDocument) -> Self {
        Self {
            installed_rank: None,
            version: doc.version,
            description: doc.description,
            kind: doc.kind,
            script: doc.script,
            checksum: doc.checksum,
            installed_by: doc.installed_by,
            installed_on: doc.installed_on,
            execution_time_ms: doc.execution_time,
            success: doc.success,
            error_message: doc.error_message,
            operations_count: Some(doc.operations_count),
        }
    }
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Migration history stored as one document per attempt
pub struct DocumentHistory {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl DocumentHistory {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl HistoryRepository for DocumentHistory {
    fn target(&self) -> &str {
        &self.collection
    }

    async fn initialize(&self) -> EngineResult<()> {
        let existing = self.store.list_collections().await?;
        if !existing.iter().any(|c| c == &self.collection) {
            self.store
                .create_collection(&self.collection, &Document::new())
                .await?;
            self.store
                .create_index(
                    &self.collection,
                    &object(json!({"version": 1})),
                    &object(json!({"unique": true})),
                )
                .await?;
            self.store
                .create_index(&self.collection, &object(json!({"installed_on": 1})), &Document::new())
                .await?;
            self.store
                .create_index(&self.collection, &object(json!({"success": 1})), &Document::new())
                .await?;
            log::info!("Created migration history collection '{}'", self.collection);
        }
        log::info!("Migration history collection '{}' initialized", self.collection);
        Ok(())
    }

    async fn applied(&self) -> EngineResult<Vec<AppliedMigrationRecord>> {
        let docs = match self
            .store
            .find_sorted(
                &self.collection,
                &Document::new(),
                &object(json!({"installed_on": 1})),
                None,
            )
            .await
        {
            Ok(docs) => docs,
            Err(e) if e.is_table_not_found() => {
                log::debug!(
                    "History collection '{}' not found; no applied migrations",
                    self.collection
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<HistoryDocument>(Value::Object(doc)) {
                Ok(parsed) => records.push(parsed.into()),
                Err(e) => log::warn!(
                    "Skipping unreadable history document in '{}': {}",
                    self.collection,
                    e
                ),
            }
        }
        Ok(records)
    }

    async fn record(&self, record: &AppliedMigrationRecord) -> EngineResult<()> {
        let value = serde_json::to_value(HistoryDocument::from(record))
            .map_err(|e| EngineError::InvalidRecord(e.to_string()))?;
        let Value::Object(doc) = value else {
            return Err(EngineError::InvalidRecord(
                "history document is not an object".into(),
            ));
        };
        self.store.insert_one(&self.collection, &doc).await?;
        log::debug!("Recorded {} in '{}'", record.version, self.collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dm_db::{DbError, MemoryDocumentStore};

    fn record(version: &str, at: DateTime<Utc>, success: bool) -> AppliedMigrationRecord {
        AppliedMigrationRecord {
            installed_rank: None,
            version: version.to_string(),
            description: "seed".to_string(),
            kind: MigrationKind::NoSql,
            script: format!("{}_seed.json", version),
            checksum: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            installed_by: "tester".to_string(),
            installed_on: at,
            execution_time_ms: 4,
            success,
            error_message: (!success).then(|| "boom".to_string()),
            operations_count: Some(3),
        }
    }

    #[tokio::test]
    async fn test_initialize_creates_collection_and_indexes_once() {
        let store = Arc::new(MemoryDocumentStore::new());
        let history = DocumentHistory::new(store.clone(), "migration_history");
        history.initialize().await.unwrap();
        history.initialize().await.unwrap();
        assert_eq!(
            store.index_names("migration_history").unwrap(),
            vec!["version_1", "installed_on_1", "success_1"]
        );
    }

    #[tokio::test]
    async fn test_applied_sorted_by_installed_on() {
        let store = Arc::new(MemoryDocumentStore::new());
        let history = DocumentHistory::new(store.clone(), "migration_history");
        history.initialize().await.unwrap();
        let now = Utc::now();
        history.record(&record("2", now, true)).await.unwrap();
        history
            .record(&record("1", now - Duration::seconds(5), false))
            .await
            .unwrap();

        let applied = history.applied().await.unwrap();
        let versions: Vec<&str> = applied.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1", "2"]);
        assert_eq!(applied[0].error_message.as_deref(), Some("boom"));
        assert_eq!(applied[1].operations_count, Some(3));
        assert_eq!(applied[1].kind, MigrationKind::NoSql);
    }

    #[tokio::test]
    async fn test_stored_document_shape() {
        let store = Arc::new(MemoryDocumentStore::new());
        let history = DocumentHistory::new(store.clone(), "h");
        history.record(&record("1", Utc::now(), true)).await.unwrap();
        let docs = store.documents("h").unwrap();
        assert_eq!(docs[0]["type"], "NoSQL");
        assert_eq!(docs[0]["execution_time"], 4);
        assert!(docs[0]["installed_on"].as_str().unwrap().ends_with('Z'));
        assert!(docs[0].get("error_message").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_version_rejected_by_index() {
        let store = Arc::new(MemoryDocumentStore::new());
        let history = DocumentHistory::new(store.clone(), "h");
        history.initialize().await.unwrap();
        history.record(&record("1", Utc::now(), true)).await.unwrap();
        assert!(history.record(&record("1", Utc::now(), true)).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let store = Arc::new(MemoryDocumentStore::new());
        let history = DocumentHistory::new(store.clone(), "h");
        assert!(history.applied().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_store_is_an_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let history = DocumentHistory::new(store.clone(), "h");
        history.record(&record("1", Utc::now(), true)).await.unwrap();
        store.set_offline(true);
        let err = history.applied().await.unwrap_err();
        assert!(matches!(err, EngineError::Db(DbError::ConnectionError(_))));
    }
}

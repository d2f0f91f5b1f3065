//! Document engine against the in-memory document store.

use dm_core::{Checksum, MigrationState};
use dm_db::{DocumentStore, MemoryDocumentStore};
use dm_engine::DocumentEngine;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const HISTORY: &str = "migration_history";

fn write(dir: &Path, name: &str, value: serde_json::Value) -> String {
    let content = serde_json::to_string_pretty(&value).unwrap();
    fs::write(dir.join(name), &content).unwrap();
    content
}

fn engine(store: &Arc<MemoryDocumentStore>, dir: &Path) -> DocumentEngine {
    DocumentEngine::for_store(store.clone(), dir, HISTORY, "tester")
}

#[tokio::test]
async fn test_four_phases_and_operation_count() {
    let tmp = TempDir::new().unwrap();
    let content = write(
        tmp.path(),
        "001_users.json",
        json!({
            "version": "1",
            "description": "users",
            "aggregations": [
                {"collection": "users", "pipeline": [{"$match": {"role": "admin"}}]}
            ],
            "data": [
                {"type": "insert", "collection": "users", "documents": [
                    {"email": "a@x", "role": "admin"},
                    {"email": "b@x", "role": "user"}
                ]},
                {"type": "update", "collection": "users",
                 "filter": {"role": "user"}, "update": {"$set": {"active": true}}},
                {"type": "delete", "collection": "users", "filter": {"email": "nobody"}}
            ],
            "indexes": [
                {"collection": "users", "index": {"email": 1}, "options": {"unique": true}}
            ],
            "collections": [{"name": "users"}]
        }),
    );

    let store = Arc::new(MemoryDocumentStore::new());
    let engine = engine(&store, tmp.path());
    let results = engine.migrate().await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.is_success());
    // 1 collection + 1 index + 2 inserted + 1 modified + 0 deleted + 1 aggregated
    assert_eq!(result.operations_count, 6);
    assert_eq!(result.checksum, Checksum::for_document(&content).as_stored());

    let users = store.documents("users").unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1]["active"], true);
    assert_eq!(store.index_names("users").unwrap(), vec!["email_1"]);

    let applied = engine.applied().await.unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].operations_count, Some(6));
    assert_eq!(applied[0].script, "001_users.json");
}

#[tokio::test]
async fn test_existing_collection_is_skipped() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "001.json",
        json!({"version": 1, "description": "c", "collections": [{"name": "events"}]}),
    );
    let store = Arc::new(MemoryDocumentStore::new());
    store
        .create_collection("events", &serde_json::Map::new())
        .await
        .unwrap();

    let results = engine(&store, tmp.path()).migrate().await.unwrap();
    assert!(results[0].is_success());
    assert_eq!(results[0].operations_count, 0);
    assert_eq!(results[0].version, "1");
}

#[tokio::test]
async fn test_failure_stops_batch_and_is_recorded() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "001_seed.json",
        json!({"version": "1", "description": "seed",
               "indexes": [{"collection": "users", "index": {"email": 1}, "options": {"unique": true}}],
               "data": [{"type": "insert", "collection": "users", "documents": {"email": "a@x"}}]}),
    );
    write(
        tmp.path(),
        "002_dupe.json",
        json!({"version": "2", "description": "dupe",
               "data": [{"type": "insert", "collection": "users", "documents": [
                   {"email": "c@x"}, {"email": "a@x"}
               ]}]}),
    );
    write(
        tmp.path(),
        "003_after.json",
        json!({"version": "3", "description": "after", "collections": [{"name": "later"}]}),
    );

    let store = Arc::new(MemoryDocumentStore::new());
    let engine = engine(&store, tmp.path());
    let results = engine.migrate().await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].state, MigrationState::Success);
    assert_eq!(results[1].state, MigrationState::Failed);
    assert!(results[1]
        .error_details
        .as_deref()
        .unwrap()
        .contains("Duplicate key"));

    let applied = engine.applied().await.unwrap();
    assert_eq!(applied.len(), 2);
    assert!(!applied[1].success);
    assert!(applied[1].error_message.is_some());
    assert!(!store.list_collections().await.unwrap().contains(&"later".to_string()));
}

#[tokio::test]
async fn test_invalid_files_are_skipped() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "001.json", json!({"version": "1", "description": "ok"}));
    write(tmp.path(), "002.json", json!({"description": "no version"}));
    fs::write(tmp.path().join("003.json"), "{ not json").unwrap();

    let store = Arc::new(MemoryDocumentStore::new());
    let engine = engine(&store, tmp.path());
    let scan = engine.discover();
    assert_eq!(scan.descriptors.len(), 1);
    assert_eq!(scan.skipped.len(), 2);

    let results = engine.migrate().await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_validate_detects_changed_file() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "001.json", json!({"version": "1", "description": "a"}));
    let store = Arc::new(MemoryDocumentStore::new());
    let engine = engine(&store, tmp.path());
    engine.migrate().await.unwrap();
    assert!(engine.validate().await.unwrap().is_valid());

    write(tmp.path(), "001.json", json!({"version": "1", "description": "b"}));
    let report = engine.validate().await.unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.mismatches[0].version, "1");
}

#[tokio::test]
async fn test_second_run_has_nothing_pending() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "001.json", json!({"version": "1.0", "description": "a"}));
    write(tmp.path(), "002.json", json!({"version": "1.1", "description": "b"}));
    let store = Arc::new(MemoryDocumentStore::new());
    let engine = engine(&store, tmp.path());

    assert_eq!(engine.migrate().await.unwrap().len(), 2);
    assert!(engine.pending().await.unwrap().is_empty());
    assert!(engine.migrate().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_history_does_not_hide_drift() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "001.json", json!({"version": "1", "description": "a"}));
    let store = Arc::new(MemoryDocumentStore::new());
    let engine = engine(&store, tmp.path());
    engine.migrate().await.unwrap();
    write(tmp.path(), "001.json", json!({"version": "1", "description": "b"}));

    store.set_offline(true);
    assert!(engine.validate().await.is_err());
    assert!(engine.pending().await.is_err());
    assert!(engine.migrate().await.is_err());

    store.set_offline(false);
    assert!(!engine.validate().await.unwrap().is_valid());
    assert_eq!(store.documents(HISTORY).unwrap().len(), 1);
}

//! Destructive clean across DuckDB and the in-memory document store.

use dm_db::{Database, DocumentStore, DuckDbBackend, MemoryDocumentStore};
use dm_engine::{clean, CleanConfirmation, CleanTargets, EngineError, ExecutionTracker};
use serde_json::{json, Map};
use std::sync::Arc;

const HISTORY: &str = "flyway_schema_history";
const CONTROL: &str = "migration_execution_history";

async fn seeded() -> (Arc<DuckDbBackend>, MemoryDocumentStore) {
    let db = Arc::new(DuckDbBackend::in_memory().unwrap());
    db.execute_batch(
        "CREATE TABLE flyway_schema_history (installed_rank INTEGER);
         CREATE TABLE parents (id INTEGER PRIMARY KEY);
         CREATE TABLE children (id INTEGER, parent_id INTEGER REFERENCES parents(id));
         CREATE VIEW parent_ids AS SELECT id FROM parents;",
    )
    .await
    .unwrap();
    ExecutionTracker::new(db.clone(), CONTROL)
        .initialize()
        .await
        .unwrap();

    let store = MemoryDocumentStore::new();
    store.create_collection("users", &Map::new()).await.unwrap();
    store
        .insert_one("migration_history", json!({"version": "1"}).as_object().unwrap())
        .await
        .unwrap();
    (db, store)
}

fn targets<'a>(db: &'a DuckDbBackend, store: &'a MemoryDocumentStore) -> CleanTargets<'a> {
    CleanTargets {
        db,
        schema: None,
        history_table: HISTORY,
        control_table: Some(CONTROL),
        store: Some(store),
    }
}

#[tokio::test]
async fn test_unconfirmed_clean_touches_nothing() {
    let (db, store) = seeded().await;
    let err = clean(CleanConfirmation::NotConfirmed, targets(&db, &store))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CleanNotConfirmed));

    assert!(db.relation_exists(HISTORY).await.unwrap());
    assert!(db.relation_exists(CONTROL).await.unwrap());
    assert!(db.relation_exists("children").await.unwrap());
    assert_eq!(store.list_collections().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_confirmed_clean_drops_everything() {
    let (db, store) = seeded().await;
    let report = clean(CleanConfirmation::Confirmed, targets(&db, &store))
        .await
        .unwrap();

    assert_eq!(report.dropped_tables[0], CONTROL);
    assert_eq!(report.dropped_tables[1], HISTORY);
    assert!(report.dropped_tables.contains(&"parents".to_string()));
    assert!(report.dropped_tables.contains(&"children".to_string()));
    assert!(db.list_tables(None).await.unwrap().is_empty());
    assert_eq!(report.dropped_views, vec!["parent_ids"]);
    assert!(db.list_views(None).await.unwrap().is_empty());

    let mut collections = report.dropped_collections.clone();
    collections.sort();
    assert_eq!(collections, vec!["migration_history", "users"]);
    assert!(store.list_collections().await.unwrap().is_empty());
    assert!(report.document_errors.is_empty());
}

#[tokio::test]
async fn test_unreachable_document_store_is_a_soft_failure() {
    let (db, store) = seeded().await;
    store.set_offline(true);

    let report = clean(CleanConfirmation::Confirmed, targets(&db, &store))
        .await
        .unwrap();
    assert!(db.list_tables(None).await.unwrap().is_empty());
    assert!(report.dropped_collections.is_empty());
    assert_eq!(report.document_errors.len(), 1);
}

#[tokio::test]
async fn test_clean_without_document_store() {
    let (db, _store) = seeded().await;
    let report = clean(
        CleanConfirmation::Confirmed,
        CleanTargets {
            db: db.as_ref(),
            schema: None,
            history_table: HISTORY,
            control_table: None,
            store: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(report.dropped_tables[0], HISTORY);
    assert!(db.list_tables(None).await.unwrap().is_empty());
    assert!(report.dropped_collections.is_empty());
}

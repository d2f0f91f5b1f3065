use super::*;
use dm_db::{Database, DocumentStore};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_migrations(root: &Path) {
    let sql = root.join("migrations/postgresql");
    let docs = root.join("migrations/mongodb");
    fs::create_dir_all(&sql).unwrap();
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        sql.join("V1__create_accounts.sql"),
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner VARCHAR);",
    )
    .unwrap();
    fs::write(
        docs.join("001_events.json"),
        r#"{"version": "1", "description": "events", "collections": [{"name": "events"}]}"#,
    )
    .unwrap();
}

#[tokio::test]
async fn test_migrate_runs_both_engines() {
    let tmp = tempdir().unwrap();
    write_migrations(tmp.path());
    let ctx = RuntimeContext::in_memory(tmp.path());

    let outcome = execute(&ctx).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.attempted, Some((1, 1)));
    assert_eq!(outcome.postgres_results[0]["state"], "SUCCESS");
    assert_eq!(outcome.mongodb_results[0]["type"], "NoSQL");

    assert!(ctx.db.relation_exists("accounts").await.unwrap());
    let store = ctx.store.as_ref().unwrap();
    assert!(store
        .list_collections()
        .await
        .unwrap()
        .contains(&"events".to_string()));

    let again = execute(&ctx).await.unwrap();
    assert!(again.success);
    assert_eq!(again.attempted, Some((0, 0)));
}

#[tokio::test]
async fn test_relational_failure_still_runs_document_engine() {
    let tmp = tempdir().unwrap();
    write_migrations(tmp.path());
    fs::write(
        tmp.path().join("migrations/postgresql/V2__broken.sql"),
        "INSERT INTO no_such_table VALUES (1);",
    )
    .unwrap();
    let ctx = RuntimeContext::in_memory(tmp.path());

    let outcome = execute(&ctx).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Some migrations failed"));
    assert_eq!(outcome.postgres_results.len(), 2);
    assert_eq!(outcome.postgres_results[1]["state"], "FAILED");
    assert_eq!(outcome.mongodb_results.len(), 1);
}

#[tokio::test]
async fn test_migrate_without_document_store() {
    let tmp = tempdir().unwrap();
    write_migrations(tmp.path());
    let mut ctx = RuntimeContext::in_memory(tmp.path());
    ctx.store = None;

    let outcome = execute(&ctx).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.attempted, Some((1, 0)));
    assert!(outcome.mongodb_results.is_empty());
}

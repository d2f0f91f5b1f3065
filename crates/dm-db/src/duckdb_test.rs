use super::*;
use crate::sql::first_count;

#[tokio::test]
async fn test_in_memory() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.db_type(), "duckdb");
}

#[tokio::test]
async fn test_execute_batch() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE t1 (id INT); CREATE TABLE t2 (id INT); INSERT INTO t1 VALUES (1);",
    )
    .await
    .unwrap();

    assert!(db.relation_exists("t1").await.unwrap());
    assert!(db.relation_exists("t2").await.unwrap());
}

#[tokio::test]
async fn test_relation_not_exists() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert!(!db.relation_exists("nonexistent").await.unwrap());
}

#[tokio::test]
async fn test_schema_qualified_relation() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE SCHEMA staging; CREATE TABLE staging.events (id INT);")
        .await
        .unwrap();

    assert!(db.relation_exists("staging.events").await.unwrap());
    assert!(!db.relation_exists("events").await.unwrap());
}

#[tokio::test]
async fn test_params_round_trip() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE h (installed_rank INTEGER, version VARCHAR, ok BOOLEAN, note VARCHAR)")
        .await
        .unwrap();

    let inserted = db
        .execute_params(
            "INSERT INTO h VALUES ($1, $2, $3, $4)",
            &[
                SqlValue::Int(1),
                "1.0".into(),
                true.into(),
                SqlValue::Null,
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let rows = db
        .query("SELECT installed_rank, version, ok, note FROM h WHERE version = $1", &["1.0".into()])
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![
            SqlValue::Int(1),
            SqlValue::Text("1.0".to_string()),
            SqlValue::Bool(true),
            SqlValue::Null,
        ]]
    );
}

#[tokio::test]
async fn test_timestamp_cast_as_text() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE ts (created TIMESTAMP)").await.unwrap();
    db.execute_params(
        "INSERT INTO ts VALUES (CAST($1 AS TIMESTAMP))",
        &["2026-10-16 12:30:45.123456".into()],
    )
    .await
    .unwrap();

    let rows = db
        .query("SELECT CAST(created AS VARCHAR) FROM ts", &[])
        .await
        .unwrap();
    assert_eq!(rows[0][0].as_str(), Some("2026-10-16 12:30:45.123456"));
}

#[tokio::test]
async fn test_uncast_timestamp_is_rejected() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db
        .query("SELECT TIMESTAMP '2026-01-01 00:00:00'", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(_)));
}

#[tokio::test]
async fn test_count_is_int() {
    let db = DuckDbBackend::in_memory().unwrap();
    let rows = db
        .query("SELECT COUNT(*) FROM range(10) t(n)", &[])
        .await
        .unwrap();
    assert_eq!(first_count(&rows), 10);
}

#[tokio::test]
async fn test_missing_table_is_classified() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db.query("SELECT * FROM nope", &[]).await.unwrap_err();
    assert!(err.is_table_not_found(), "got {:?}", err);
}

#[tokio::test]
async fn test_list_tables_excludes_views() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE b (id INT); CREATE TABLE a (id INT); CREATE VIEW v AS SELECT * FROM a;",
    )
    .await
    .unwrap();

    assert_eq!(db.list_tables(None).await.unwrap(), vec!["a", "b"]);
    assert_eq!(db.list_tables(Some("main")).await.unwrap(), vec!["a", "b"]);
    assert!(db.list_tables(Some("other")).await.unwrap().is_empty());
    assert_eq!(db.list_views(None).await.unwrap(), vec!["v"]);
}

#[tokio::test]
async fn test_drop_if_exists() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE to_drop AS SELECT 1 AS id; CREATE VIEW v_drop AS SELECT 1 AS id;")
        .await
        .unwrap();

    db.drop_if_exists("to_drop").await.unwrap();
    db.drop_if_exists("v_drop").await.unwrap();
    db.drop_if_exists("never_existed").await.unwrap();

    assert!(!db.relation_exists("to_drop").await.unwrap());
    assert!(!db.relation_exists("v_drop").await.unwrap());
}

#[tokio::test]
async fn test_failed_batch_can_roll_back() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE t (id INT)").await.unwrap();

    let result = db
        .execute_batch("BEGIN; INSERT INTO t VALUES (1); INSERT INTO missing VALUES (2); COMMIT;")
        .await;
    assert!(result.is_err());
    db.execute_batch("ROLLBACK").await.unwrap();

    let rows = db.query("SELECT COUNT(*) FROM t", &[]).await.unwrap();
    assert_eq!(first_count(&rows), 0);
}

//! Flyway-compatible schema history table.

use super::HistoryRepository;
use crate::error::{EngineError, EngineResult};
use crate::row_helpers::{bare_name, boolean, int, opt_text, text, timestamp};
use async_trait::async_trait;
use dm_core::serde_helpers::to_sql_timestamp;
use dm_core::{AppliedMigrationRecord, MigrationKind};
use dm_db::sql::{first_count, quote_qualified};
use dm_db::{Database, SqlRow, SqlValue};
use std::sync::Arc;

/// Schema history stored in a relational table
pub struct RelationalHistory {
    db: Arc<dyn Database>,
    table: String,
}

impl RelationalHistory {
    pub fn new(db: Arc<dyn Database>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    fn create_sql(&self) -> String {
        let table = quote_qualified(&self.table);
        let base = bare_name(&self.table);
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                installed_rank INTEGER NOT NULL,
                version VARCHAR(50),
                description VARCHAR(200) NOT NULL,
                type VARCHAR(20) NOT NULL,
                script VARCHAR(1000) NOT NULL,
                checksum INTEGER,
                installed_by VARCHAR(100) NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                execution_time INTEGER NOT NULL,
                success BOOLEAN NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS \"{base}_ir_idx\" ON {table} (installed_rank);
            CREATE INDEX IF NOT EXISTS \"{base}_version_idx\" ON {table} (version);"
        )
    }
}

fn parse_kind(raw: &str) -> EngineResult<MigrationKind> {
    match raw {
        "SQL" => Ok(MigrationKind::Sql),
        "NoSQL" => Ok(MigrationKind::NoSql),
        other => Err(EngineError::InvalidRecord(format!(
            "unknown migration type '{}'",
            other
        ))),
    }
}

fn record_from_row(row: &SqlRow) -> EngineResult<AppliedMigrationRecord> {
    let installed_rank = int(row, 0, "installed_rank")?;
    Ok(AppliedMigrationRecord {
        installed_rank: Some(i32::try_from(installed_rank).map_err(|_| {
            EngineError::InvalidRecord(format!("installed_rank {} out of range", installed_rank))
        })?),
        version: opt_text(row, 1, "version")?.unwrap_or_default(),
        description: text(row, 2, "description")?,
        kind: parse_kind(&text(row, 3, "type")?)?,
        script: text(row, 4, "script")?,
        checksum: opt_text(row, 5, "checksum")?.unwrap_or_default(),
        installed_by: text(row, 6, "installed_by")?,
        installed_on: timestamp(row, 7, "installed_on")?,
        execution_time_ms: int(row, 8, "execution_time")?,
        success: boolean(row, 9, "success")?,
        error_message: None,
        operations_count: None,
    })
}

#[async_trait]
impl HistoryRepository for RelationalHistory {
    fn target(&self) -> &str {
        &self.table
    }

    async fn initialize(&self) -> EngineResult<()> {
        self.db.execute_batch(&self.create_sql()).await?;
        log::info!("Schema history table '{}' initialized", self.table);
        Ok(())
    }

    async fn applied(&self) -> EngineResult<Vec<AppliedMigrationRecord>> {
        let sql = format!(
            "SELECT installed_rank, version, description, type, script, checksum, \
             installed_by, CAST(installed_on AS VARCHAR), execution_time, success \
             FROM {} ORDER BY installed_rank",
            quote_qualified(&self.table)
        );
        let rows = match self.db.query(&sql, &[]).await {
            Ok(rows) => rows,
            Err(e) if e.is_table_not_found() => {
                log::debug!("History table '{}' not found; no applied migrations", self.table);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        rows.iter().map(record_from_row).collect()
    }

    async fn record(&self, record: &AppliedMigrationRecord) -> EngineResult<()> {
        let table = quote_qualified(&self.table);
        let rows = self
            .db
            .query(
                &format!("SELECT COALESCE(MAX(installed_rank), 0) + 1 FROM {}", table),
                &[],
            )
            .await?;
        let next_rank = first_count(&rows).max(1);

        let checksum = if record.checksum.is_empty() {
            SqlValue::Null
        } else {
            let value: i32 = record.checksum.parse().map_err(|_| {
                EngineError::InvalidRecord(format!(
                    "checksum '{}' of {} is not a 32-bit integer",
                    record.checksum, record.version
                ))
            })?;
            SqlValue::from(value)
        };

        let sql = format!(
            "INSERT INTO {} (installed_rank, version, description, type, script, checksum, \
             installed_by, installed_on, execution_time, success) \
             VALUES (CAST($1 AS INTEGER), $2, $3, $4, $5, CAST($6 AS INTEGER), $7, \
             CAST($8 AS TIMESTAMP), CAST($9 AS INTEGER), $10)",
            table
        );
        self.db
            .execute_params(
                &sql,
                &[
                    SqlValue::Int(next_rank),
                    record.version.as_str().into(),
                    record.description.as_str().into(),
                    record.kind.as_str().into(),
                    record.script.as_str().into(),
                    checksum,
                    record.installed_by.as_str().into(),
                    to_sql_timestamp(&record.installed_on).into(),
                    SqlValue::Int(record.execution_time_ms),
                    SqlValue::Bool(record.success),
                ],
            )
            .await?;
        log::debug!(
            "Recorded {} in '{}' with rank {}",
            record.version,
            self.table,
            next_rank
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dm_db::DuckDbBackend;

    fn history() -> (Arc<DuckDbBackend>, RelationalHistory) {
        let db = Arc::new(DuckDbBackend::in_memory().unwrap());
        let history = RelationalHistory::new(db.clone(), "flyway_schema_history");
        (db, history)
    }

    fn record(version: &str, checksum: &str, success: bool) -> AppliedMigrationRecord {
        AppliedMigrationRecord {
            installed_rank: None,
            version: version.to_string(),
            description: format!("step {}", version),
            kind: MigrationKind::Sql,
            script: format!("V{}__step.sql", version),
            checksum: checksum.to_string(),
            installed_by: "tester".to_string(),
            installed_on: Utc::now(),
            execution_time_ms: 12,
            success,
            error_message: None,
            operations_count: None,
        }
    }

    #[tokio::test]
    async fn test_missing_table_reads_empty() {
        let (_db, history) = history();
        assert!(history.applied().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (db, history) = history();
        history.initialize().await.unwrap();
        history.initialize().await.unwrap();
        assert!(db.relation_exists("flyway_schema_history").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_assigns_increasing_ranks() {
        let (_db, history) = history();
        history.initialize().await.unwrap();
        history.record(&record("1", "-12345", true)).await.unwrap();
        history.record(&record("2", "987", false)).await.unwrap();

        let applied = history.applied().await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].installed_rank, Some(1));
        assert_eq!(applied[0].checksum, "-12345");
        assert!(applied[0].success);
        assert_eq!(applied[0].execution_time_ms, 12);
        assert_eq!(applied[1].installed_rank, Some(2));
        assert_eq!(applied[1].version, "2");
        assert!(!applied[1].success);
        assert_eq!(applied[1].kind, MigrationKind::Sql);
    }

    #[tokio::test]
    async fn test_non_integer_checksum_rejected() {
        let (_db, history) = history();
        history.initialize().await.unwrap();
        let err = history.record(&record("1", "abc", true)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord(_)));
        assert!(history.applied().await.unwrap().is_empty());
    }
}

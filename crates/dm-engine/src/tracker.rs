//! Execution tracker: one control-table row per CLI invocation.
//!
//! Lifecycle: `STARTED -> IN_PROGRESS -> {SUCCESS, FAILED}`, with
//! `CANCELLED` reachable from any non-terminal state. The in-memory
//! [`ExecutionRecord`] is updated only after the row is written.

use crate::error::{EngineError, EngineResult};
use crate::row_helpers::{bare_name, opt_int, opt_text, opt_timestamp, text, timestamp};
use chrono::Utc;
use dm_core::serde_helpers::to_sql_timestamp;
use dm_core::{identity, ExecutionRecord, ExecutionStatus};
use dm_db::sql::quote_qualified;
use dm_db::{Database, SqlRow, SqlValue};
use std::sync::Arc;

const SELECT_COLUMNS: &str = "CAST(execution_id AS VARCHAR), command, environment, status, \
     CAST(start_time AS VARCHAR), CAST(end_time AS VARCHAR), duration_seconds, executed_by, \
     error_message, postgres_migrations_count, mongodb_migrations_count, report_path";

/// Control-plane history in the relational store
pub struct ExecutionTracker {
    db: Arc<dyn Database>,
    table: String,
}

impl ExecutionTracker {
    pub fn new(db: Arc<dyn Database>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the control table and its indexes if absent.
    pub async fn initialize(&self) -> EngineResult<()> {
        let table = quote_qualified(&self.table);
        let base = bare_name(&self.table);
        // status is updated in place; it stays unindexed
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                execution_id UUID PRIMARY KEY,
                command VARCHAR(100) NOT NULL,
                environment VARCHAR(50) NOT NULL,
                status VARCHAR(20) NOT NULL,
                start_time TIMESTAMP NOT NULL,
                end_time TIMESTAMP,
                duration_seconds INTEGER DEFAULT 0,
                executed_by VARCHAR(255) DEFAULT 'system',
                error_message TEXT,
                postgres_migrations_count INTEGER DEFAULT 0,
                mongodb_migrations_count INTEGER DEFAULT 0,
                report_path TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS \"idx_{base}_start_time\" ON {table} (start_time);
            CREATE INDEX IF NOT EXISTS \"idx_{base}_environment\" ON {table} (environment);"
        );
        self.db.execute_batch(&sql).await?;
        log::info!("Migration control table '{}' initialized", self.table);
        Ok(())
    }

    /// Insert a `STARTED` row for a new invocation.
    pub async fn start(&self, command: &str, environment: &str) -> EngineResult<ExecutionRecord> {
        self.initialize().await?;

        let record = ExecutionRecord {
            execution_id: identity::new_execution_id(),
            command: command.to_string(),
            environment: environment.to_string(),
            status: ExecutionStatus::Started,
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: None,
            executed_by: identity::executed_by(),
            error_message: None,
            postgres_migrations_count: 0,
            mongodb_migrations_count: 0,
            report_path: None,
        };

        let sql = format!(
            "INSERT INTO {} (execution_id, command, environment, status, start_time, executed_by) \
             VALUES (CAST($1 AS UUID), $2, $3, $4, CAST($5 AS TIMESTAMP), $6)",
            quote_qualified(&self.table)
        );
        self.db
            .execute_params(
                &sql,
                &[
                    record.execution_id.as_str().into(),
                    record.command.as_str().into(),
                    record.environment.as_str().into(),
                    record.status.as_str().into(),
                    to_sql_timestamp(&record.start_time).into(),
                    record.executed_by.as_str().into(),
                ],
            )
            .await?;

        log::info!("Started migration execution: {}", record.execution_id);
        Ok(record)
    }

    fn check_transition(
        execution: &ExecutionRecord,
        next: ExecutionStatus,
    ) -> EngineResult<()> {
        if execution.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: execution.status,
                to: next,
            })
        }
    }

    /// Record per-store counts and move to `IN_PROGRESS`.
    pub async fn progress(
        &self,
        execution: &mut ExecutionRecord,
        postgres_count: i64,
        mongodb_count: i64,
    ) -> EngineResult<()> {
        Self::check_transition(execution, ExecutionStatus::InProgress)?;

        let sql = format!(
            "UPDATE {} SET postgres_migrations_count = CAST($1 AS INTEGER), \
             mongodb_migrations_count = CAST($2 AS INTEGER), status = $3 \
             WHERE execution_id = CAST($4 AS UUID)",
            quote_qualified(&self.table)
        );
        let updated = self
            .db
            .execute_params(
                &sql,
                &[
                    SqlValue::Int(postgres_count),
                    SqlValue::Int(mongodb_count),
                    ExecutionStatus::InProgress.as_str().into(),
                    execution.execution_id.as_str().into(),
                ],
            )
            .await?;
        if updated == 0 {
            return Err(EngineError::ExecutionNotFound(execution.execution_id.clone()));
        }

        execution.status = ExecutionStatus::InProgress;
        execution.postgres_migrations_count = postgres_count;
        execution.mongodb_migrations_count = mongodb_count;
        log::debug!("Updated execution progress: {}", execution.execution_id);
        Ok(())
    }

    /// Write the final status; returns the duration in seconds.
    ///
    /// A missing control table (dropped by `clean` during this run) skips
    /// tracking and returns 0.
    pub async fn complete(
        &self,
        execution: &mut ExecutionRecord,
        status: ExecutionStatus,
        error_message: Option<&str>,
        report_path: Option<&str>,
    ) -> EngineResult<i64> {
        Self::check_transition(execution, status)?;

        let end_time = Utc::now();
        let duration = (end_time - execution.start_time).num_seconds().max(0);

        let sql = format!(
            "UPDATE {} SET status = $1, end_time = CAST($2 AS TIMESTAMP), \
             duration_seconds = CAST($3 AS INTEGER), error_message = $4, report_path = $5 \
             WHERE execution_id = CAST($6 AS UUID)",
            quote_qualified(&self.table)
        );
        let outcome = self
            .db
            .execute_params(
                &sql,
                &[
                    status.as_str().into(),
                    to_sql_timestamp(&end_time).into(),
                    SqlValue::Int(duration),
                    error_message.into(),
                    report_path.into(),
                    execution.execution_id.as_str().into(),
                ],
            )
            .await;

        match outcome {
            Ok(0) => return Err(EngineError::ExecutionNotFound(execution.execution_id.clone())),
            Ok(_) => {}
            Err(e) if e.is_table_not_found() => {
                log::info!("Control table not found - execution tracking skipped");
                execution.status = status;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        }

        execution.status = status;
        execution.end_time = Some(end_time);
        execution.duration_seconds = Some(duration);
        execution.error_message = error_message.map(String::from);
        execution.report_path = report_path.map(String::from);
        log::info!(
            "Completed migration execution: {} with status: {}",
            execution.execution_id,
            status
        );
        Ok(duration)
    }

    /// Mark the execution `CANCELLED`.
    pub async fn cancel(&self, execution: &mut ExecutionRecord, reason: &str) -> EngineResult<i64> {
        self.complete(execution, ExecutionStatus::Cancelled, Some(reason), None)
            .await
    }

    /// Most recent executions first. A missing table reads as empty.
    pub async fn history(&self, limit: usize) -> EngineResult<Vec<ExecutionRecord>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY start_time DESC LIMIT {}",
            SELECT_COLUMNS,
            quote_qualified(&self.table),
            limit
        );
        let rows = match self.db.query(&sql, &[]).await {
            Ok(rows) => rows,
            Err(e) if e.is_table_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        rows.iter().map(execution_from_row).collect()
    }

    /// One execution by id.
    pub async fn get(&self, execution_id: &str) -> EngineResult<Option<ExecutionRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE execution_id = CAST($1 AS UUID)",
            SELECT_COLUMNS,
            quote_qualified(&self.table)
        );
        let rows = match self.db.query(&sql, &[execution_id.into()]).await {
            Ok(rows) => rows,
            Err(e) if e.is_table_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        rows.first().map(execution_from_row).transpose()
    }
}

fn execution_from_row(row: &SqlRow) -> EngineResult<ExecutionRecord> {
    let status = text(row, 3, "status")?;
    Ok(ExecutionRecord {
        execution_id: text(row, 0, "execution_id")?,
        command: text(row, 1, "command")?,
        environment: text(row, 2, "environment")?,
        status: status.parse().map_err(EngineError::InvalidRecord)?,
        start_time: timestamp(row, 4, "start_time")?,
        end_time: opt_timestamp(row, 5, "end_time")?,
        duration_seconds: opt_int(row, 6, "duration_seconds")?,
        executed_by: opt_text(row, 7, "executed_by")?.unwrap_or_default(),
        error_message: opt_text(row, 8, "error_message")?,
        postgres_migrations_count: opt_int(row, 9, "postgres_migrations_count")?.unwrap_or(0),
        mongodb_migrations_count: opt_int(row, 10, "mongodb_migrations_count")?.unwrap_or(0),
        report_path: opt_text(row, 11, "report_path")?,
    })
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;

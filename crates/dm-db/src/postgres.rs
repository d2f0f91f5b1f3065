//! PostgreSQL database backend implementation
//!
//! Holds one dedicated connection rather than a pool so that a script
//! wrapped in `BEGIN`/`COMMIT` and a follow-up `ROLLBACK` run in the same
//! session.

use crate::error::{DbError, DbResult};
use crate::sql::{first_count, quote_qualified, split_qualified};
use crate::traits::{Database, SqlRow, SqlValue};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use tokio::sync::Mutex;

/// PostgreSQL database backend
pub struct PostgresBackend {
    conn: Mutex<Option<PgConnection>>,
}

impl PostgresBackend {
    /// Connect to `url`, overriding credentials when given.
    ///
    /// A `jdbc:` prefix is accepted. When `schema` is set it becomes the
    /// session's `search_path`.
    pub async fn connect(
        url: &str,
        username: Option<&str>,
        password: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Self> {
        let url = url.trim();
        let url = url.strip_prefix("jdbc:").unwrap_or(url);
        let mut options =
            PgConnectOptions::from_str(url).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        if let Some(user) = username {
            options = options.username(user);
        }
        if let Some(pass) = password {
            options = options.password(pass);
        }

        let mut conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        if let Some(schema) = schema {
            sqlx::raw_sql(&format!("SET search_path TO {}", quote_qualified(schema)))
                .execute(&mut conn)
                .await?;
        }

        log::debug!("Connected to PostgreSQL");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }
}

/// Bind every parameter in order. Nulls bind as `TEXT`; cast them in SQL
/// when the target column is not textual.
fn bind_all<'q>(sql: &'q str, params: &'q [SqlValue]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

/// Convert a result row. Types outside the supported scalar set must be
/// cast to `VARCHAR` in the query.
fn row_values(row: &PgRow) -> DbResult<SqlRow> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(i)?.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let value = match column.type_info().name() {
            "BOOL" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
            "INT2" => SqlValue::Int(i64::from(row.try_get::<i16, _>(i)?)),
            "INT4" => SqlValue::Int(i64::from(row.try_get::<i32, _>(i)?)),
            "INT8" => SqlValue::Int(row.try_get::<i64, _>(i)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => SqlValue::Text(row.try_get::<String, _>(i)?),
            other => {
                return Err(DbError::ExecutionError(format!(
                    "unsupported column type {} for '{}'; cast it to VARCHAR",
                    other,
                    column.name()
                )))
            }
        };
        values.push(value);
    }
    Ok(values)
}

impl PostgresBackend {
    async fn list_relations(&self, schema: Option<&str>, table_type: &str) -> DbResult<Vec<String>> {
        // information_schema columns are domain types; cast to a plain type
        let rows = match schema {
            Some(schema) => {
                self.query(
                    "SELECT CAST(table_name AS VARCHAR) FROM information_schema.tables \
                     WHERE table_schema = $1 AND table_type = $2 ORDER BY table_name",
                    &[schema.into(), table_type.into()],
                )
                .await?
            }
            None => {
                self.query(
                    "SELECT CAST(table_name AS VARCHAR) FROM information_schema.tables \
                     WHERE table_schema = current_schema() AND table_type = $1 \
                     ORDER BY table_name",
                    &[table_type.into()],
                )
                .await?
            }
        };
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.to_text()))
            .collect())
    }
}

/// Dependent views and foreign keys go with the table.
fn drop_table_sql(quoted: &str) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", quoted)
}

#[async_trait]
impl Database for PostgresBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn execute_params(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        let result = bind_all(sql, params).execute(conn).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<SqlRow>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        let rows = bind_all(sql, params).fetch_all(conn).await?;
        rows.iter().map(row_values).collect()
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        let rows = match split_qualified(name) {
            (Some(schema), table) => {
                self.query(
                    "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = $1 AND table_name = $2",
                    &[schema.into(), table.into()],
                )
                .await?
            }
            (None, table) => {
                self.query(
                    "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = current_schema() AND table_name = $1",
                    &[table.into()],
                )
                .await?
            }
        };
        Ok(first_count(&rows) > 0)
    }

    async fn list_tables(&self, schema: Option<&str>) -> DbResult<Vec<String>> {
        self.list_relations(schema, "BASE TABLE").await
    }

    async fn list_views(&self, schema: Option<&str>) -> DbResult<Vec<String>> {
        self.list_relations(schema, "VIEW").await
    }

    async fn drop_if_exists(&self, name: &str) -> DbResult<()> {
        let quoted = quote_qualified(name);
        if let Err(e) = self.execute(&format!("DROP VIEW IF EXISTS {} CASCADE", quoted)).await {
            log::debug!("DROP VIEW {} ignored: {}", name, e);
        }
        self.execute(&drop_table_sql(&quoted)).await?;
        Ok(())
    }

    fn db_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> DbResult<()> {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| DbError::ConnectionError(e.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_table_cascades() {
        assert_eq!(
            drop_table_sql(&quote_qualified("public.orders")),
            "DROP TABLE IF EXISTS \"public\".\"orders\" CASCADE"
        );
    }
}

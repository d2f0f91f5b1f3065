//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::sql::{first_count, quote_qualified, split_qualified};
use crate::traits::{Database, SqlRow, SqlValue};
use async_trait::async_trait;
use duckdb::types::{ToSqlOutput, Value, ValueRef};
use duckdb::{params_from_iter, Connection, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB database backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path.is_empty() || path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    fn execute_sync(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        let conn = self.lock()?;
        conn.execute(sql, params_from_iter(params.iter()))
            .map_err(DbError::from)
    }

    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql).map_err(DbError::from)
    }

    fn list_relations(&self, schema: Option<&str>, table_type: &str) -> DbResult<Vec<String>> {
        let rows = match schema {
            Some(schema) => self.query_sync(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = $2 ORDER BY table_name",
                &[schema.into(), table_type.into()],
            )?,
            None => self.query_sync(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = $1 \
                 ORDER BY table_name",
                &[table_type.into()],
            )?,
        };
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.to_text()))
            .collect())
    }

    fn query_sync(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<SqlRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let width = row.as_ref().column_count();
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?)?);
            }
            out.push(values);
        }
        Ok(out)
    }
}

/// Convert a DuckDB cell to a [`SqlValue`]. Types outside the supported
/// scalar set must be cast to `VARCHAR` in the query.
fn from_value_ref(value: ValueRef<'_>) -> DbResult<SqlValue> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Boolean(b) => SqlValue::Bool(b),
        ValueRef::TinyInt(i) => SqlValue::Int(i64::from(i)),
        ValueRef::SmallInt(i) => SqlValue::Int(i64::from(i)),
        ValueRef::Int(i) => SqlValue::Int(i64::from(i)),
        ValueRef::BigInt(i) => SqlValue::Int(i),
        ValueRef::UTinyInt(i) => SqlValue::Int(i64::from(i)),
        ValueRef::USmallInt(i) => SqlValue::Int(i64::from(i)),
        ValueRef::UInt(i) => SqlValue::Int(i64::from(i)),
        ValueRef::UBigInt(i) => match i64::try_from(i) {
            Ok(v) => SqlValue::Int(v),
            Err(_) => SqlValue::Text(i.to_string()),
        },
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => SqlValue::Int(v),
            Err(_) => SqlValue::Text(i.to_string()),
        },
        ValueRef::Float(f) => SqlValue::Text(f.to_string()),
        ValueRef::Double(f) => SqlValue::Text(f.to_string()),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        other => {
            return Err(DbError::ExecutionError(format!(
                "unsupported column type {:?}; cast it to VARCHAR",
                other.data_type()
            )))
        }
    })
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Boolean(*b)),
            SqlValue::Int(i) => ToSqlOutput::Owned(Value::BigInt(*i)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql, &[])
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn execute_params(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        self.execute_sync(sql, params)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<SqlRow>> {
        self.query_sync(sql, params)
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        let rows = match split_qualified(name) {
            (Some(schema), table) => self.query_sync(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                &[schema.into(), table.into()],
            )?,
            (None, table) => self.query_sync(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1",
                &[table.into()],
            )?,
        };
        Ok(first_count(&rows) > 0)
    }

    async fn list_tables(&self, schema: Option<&str>) -> DbResult<Vec<String>> {
        self.list_relations(schema, "BASE TABLE")
    }

    async fn list_views(&self, schema: Option<&str>) -> DbResult<Vec<String>> {
        self.list_relations(schema, "VIEW")
    }

    async fn drop_if_exists(&self, name: &str) -> DbResult<()> {
        let quoted = quote_qualified(name);
        // Dropping a table as a view fails; only the table drop is authoritative.
        if let Err(e) = self.execute_sync(&format!("DROP VIEW IF EXISTS {}", quoted), &[]) {
            log::debug!("DROP VIEW {} ignored: {}", name, e);
        }
        self.execute_sync(&format!("DROP TABLE IF EXISTS {}", quoted), &[])?;
        Ok(())
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;

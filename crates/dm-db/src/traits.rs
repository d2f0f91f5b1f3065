//! Store trait definitions

use crate::error::DbResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// A JSON object exchanged with a [`DocumentStore`].
pub type Document = Map<String, Value>;

/// A scalar crossing the relational boundary.
///
/// Timestamps and UUIDs travel as [`SqlValue::Text`] and are converted with
/// an explicit `CAST` in the SQL text, which both backends understand.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text form of any non-null value.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<i32> for SqlValue {
    fn from(i: i32) -> Self {
        SqlValue::Int(i64::from(i))
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row.
pub type SqlRow = Vec<SqlValue>;

/// Relational store abstraction.
///
/// Placeholders are `$1..$n`. Implementations must be Send + Sync for async
/// operation.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute one statement, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple SQL statements as one script
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Execute one parameterized statement, returns affected rows
    async fn execute_params(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize>;

    /// Run a parameterized query and return every row
    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<SqlRow>>;

    /// Check if a table or view exists in the current schema
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Base tables in `schema`, or in the current schema when `None`
    async fn list_tables(&self, schema: Option<&str>) -> DbResult<Vec<String>>;

    /// Views in `schema`, or in the current schema when `None`
    async fn list_views(&self, schema: Option<&str>) -> DbResult<Vec<String>>;

    /// Drop a table or view if it exists
    async fn drop_if_exists(&self, name: &str) -> DbResult<()>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;

    /// Release the connection. Backends that hold a network session fail
    /// later calls with `DbError::Closed`; the default does nothing.
    async fn close(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Document store abstraction. Documents are JSON objects; backends convert
/// to their native representation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Round-trip to the server
    async fn ping(&self) -> DbResult<()>;

    async fn list_collections(&self) -> DbResult<Vec<String>>;

    /// Create a collection; fails if it already exists
    async fn create_collection(&self, name: &str, options: &Document) -> DbResult<()>;

    /// Create an index with an ordered key spec; returns the index name
    async fn create_index(&self, collection: &str, keys: &Document, options: &Document)
        -> DbResult<String>;

    async fn insert_one(&self, collection: &str, document: &Document) -> DbResult<()>;

    /// Returns the number of inserted documents
    async fn insert_many(&self, collection: &str, documents: &[Document]) -> DbResult<u64>;

    /// `update` is an update document or pipeline; returns modified count
    async fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Value,
        options: &Document,
    ) -> DbResult<u64>;

    /// Returns the number of deleted documents
    async fn delete_many(&self, collection: &str, filter: &Document) -> DbResult<u64>;

    /// Run a pipeline and discard the output; returns the result count
    async fn aggregate(&self, collection: &str, pipeline: &[Document]) -> DbResult<u64>;

    /// Documents matching `filter`, sorted by `sort` (`{field: 1|-1}`)
    async fn find_sorted(
        &self,
        collection: &str,
        filter: &Document,
        sort: &Document,
        limit: Option<i64>,
    ) -> DbResult<Vec<Document>>;

    async fn drop_collection(&self, name: &str) -> DbResult<()>;

    /// Store type identifier for logging
    fn store_type(&self) -> &'static str;
}

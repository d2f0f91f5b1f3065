//! dm-db - Store abstraction layer for Dualmig
//!
//! This crate provides the `Database` trait for relational stores (DuckDB and
//! PostgreSQL) and the `DocumentStore` trait for document stores (MongoDB),
//! plus an in-memory document store behind the `test-support` feature.

pub mod duckdb;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod mongo;
pub mod postgres;
pub mod sql;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryDocumentStore;
pub use mongo::MongoBackend;
pub use postgres::PostgresBackend;
pub use traits::{Database, Document, DocumentStore, SqlRow, SqlValue};

//! Applying one migration's payload to its store.

use async_trait::async_trait;
use dm_core::document::{DataOperation, DocumentMigration, DocumentOperation, Documents};
use dm_core::{MigrationDescriptor, SqlScript};
use dm_db::{Database, DbError, DocumentStore};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// A failed application, with how much work finished before the failure.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct ApplyError {
    pub operations_completed: u64,
    pub source: DbError,
}

impl ApplyError {
    fn new(operations_completed: u64, source: DbError) -> Self {
        Self {
            operations_completed,
            source,
        }
    }
}

/// Applies the payload of one descriptor; returns the operations count.
#[async_trait]
pub trait MigrationApplier<P>: Send + Sync {
    async fn apply(&self, descriptor: &MigrationDescriptor<P>) -> Result<u64, ApplyError>;
}

/// A statement line that opens or ends a transaction. PL/pgSQL block
/// `BEGIN` lines carry no semicolon and do not match.
fn transaction_control_pattern() -> &'static Regex {
    static TX_RE: OnceLock<Regex> = OnceLock::new();
    TX_RE.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*(BEGIN(\s+(TRANSACTION|WORK))?|START\s+TRANSACTION|COMMIT(\s+(TRANSACTION|WORK))?|ROLLBACK(\s+(TRANSACTION|WORK))?)\s*;",
        )
        .expect("valid regex")
    })
}

/// `true` when the script issues its own transaction control.
pub(crate) fn manages_own_transaction(sql: &str) -> bool {
    transaction_control_pattern().is_match(sql)
}

/// Runs a SQL script as one batch.
pub struct SqlApplier {
    db: Arc<dyn Database>,
    transactional: bool,
}

impl SqlApplier {
    /// When `transactional` the script runs between `BEGIN` and `COMMIT`
    /// and a failure issues `ROLLBACK`.
    pub fn new(db: Arc<dyn Database>, transactional: bool) -> Self {
        Self { db, transactional }
    }

    async fn rollback(&self) {
        if let Err(e) = self.db.execute_batch("ROLLBACK").await {
            log::warn!("ROLLBACK failed: {}", e);
        }
    }
}

#[async_trait]
impl MigrationApplier<SqlScript> for SqlApplier {
    async fn apply(&self, descriptor: &MigrationDescriptor<SqlScript>) -> Result<u64, ApplyError> {
        let sql = &descriptor.payload().sql;
        let wrap = self.transactional && !manages_own_transaction(sql);
        if self.transactional && !wrap {
            log::info!(
                "{} manages its own transaction; running it unwrapped",
                descriptor.source_identifier()
            );
        }
        if !wrap {
            self.db
                .execute_batch(sql)
                .await
                .map_err(|e| ApplyError::new(0, e))?;
            return Ok(0);
        }

        self.db
            .execute_batch("BEGIN")
            .await
            .map_err(|e| ApplyError::new(0, e))?;
        if let Err(e) = self.db.execute_batch(sql).await {
            self.rollback().await;
            return Err(ApplyError::new(0, e));
        }
        if let Err(e) = self.db.execute_batch("COMMIT").await {
            self.rollback().await;
            return Err(ApplyError::new(0, e));
        }
        Ok(0)
    }
}

/// Applies document operations in phase order: collections, indexes, data,
/// aggregations.
pub struct DocumentApplier {
    store: Arc<dyn DocumentStore>,
}

impl DocumentApplier {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Count contributed by one operation.
    async fn apply_operation(&self, op: DocumentOperation<'_>) -> Result<u64, DbError> {
        match op {
            DocumentOperation::CreateCollection(create) => {
                let existing = self.store.list_collections().await?;
                if existing.iter().any(|c| c == &create.name) {
                    log::info!("Collection '{}' already exists, skipping", create.name);
                    return Ok(0);
                }
                self.store
                    .create_collection(&create.name, &create.options)
                    .await?;
                log::info!("Created collection: {}", create.name);
                Ok(1)
            }
            DocumentOperation::CreateIndex(index) => {
                let name = self
                    .store
                    .create_index(&index.collection, &index.index, &index.options)
                    .await?;
                log::info!("Created index '{}' on {}", name, index.collection);
                Ok(1)
            }
            DocumentOperation::Data(data) => self.apply_data(data).await,
            DocumentOperation::Aggregate(aggregation) => {
                let count = self
                    .store
                    .aggregate(&aggregation.collection, &aggregation.pipeline)
                    .await?;
                log::debug!(
                    "Aggregation on {} produced {} result(s)",
                    aggregation.collection,
                    count
                );
                Ok(count)
            }
        }
    }

    async fn apply_data(&self, data: &DataOperation) -> Result<u64, DbError> {
        let count = match data {
            DataOperation::Insert {
                collection,
                documents,
            } => match documents {
                Documents::One(doc) => {
                    self.store.insert_one(collection, doc).await?;
                    1
                }
                Documents::Many(docs) => {
                    self.store.insert_many(collection, docs).await?
                }
            },
            DataOperation::Update {
                collection,
                filter,
                update,
                options,
            } => {
                self.store
                    .update_many(collection, filter, update, options)
                    .await?
            }
            DataOperation::Delete { collection, filter } => {
                self.store.delete_many(collection, filter).await?
            }
        };
        log::debug!("{} on {} affected {} document(s)", data.kind(), data.collection(), count);
        Ok(count)
    }
}

#[async_trait]
impl MigrationApplier<DocumentMigration> for DocumentApplier {
    async fn apply(
        &self,
        descriptor: &MigrationDescriptor<DocumentMigration>,
    ) -> Result<u64, ApplyError> {
        log::debug!(
            "{} declares {} operation(s)",
            descriptor.source_identifier(),
            descriptor.payload().declared_operations()
        );
        let mut total = 0u64;
        for op in descriptor.payload().operations() {
            match self.apply_operation(op).await {
                Ok(count) => total += count,
                Err(e) => return Err(ApplyError::new(total, e)),
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_explicit_transaction_control() {
        assert!(manages_own_transaction("BEGIN;\nCREATE TABLE t (id INT);\nCOMMIT;"));
        assert!(manages_own_transaction("start transaction;\nSELECT 1;\ncommit work;"));
        assert!(!manages_own_transaction("CREATE TABLE t (id INT);"));
        assert!(!manages_own_transaction(
            "CREATE FUNCTION f() RETURNS void AS $$\nBEGIN\n  PERFORM 1;\nEND;\n$$ LANGUAGE plpgsql;"
        ));
    }
}

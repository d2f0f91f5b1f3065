//! Migration engines.
//!
//! A [`MigrationEngine`] composes a scanner, a history repository and an
//! applier. The relational and document engines differ only in those
//! collaborators.

use crate::applier::{DocumentApplier, MigrationApplier, SqlApplier};
use crate::error::EngineResult;
use crate::executor::Executor;
use crate::history::{DocumentHistory, HistoryRepository, RelationalHistory};
use dm_core::{
    planner, validator, AppliedMigrationRecord, DocumentScanner, InfoReport, MigrationDescriptor,
    MigrationResult, MigrationScanner, Scan, SqlScanner, ValidationReport,
};
use dm_db::{Database, DocumentStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Scanner + history + applier for one datastore
pub struct MigrationEngine<S: MigrationScanner> {
    scanner: S,
    history: Arc<dyn HistoryRepository>,
    applier: Arc<dyn MigrationApplier<S::Payload>>,
    installed_by: String,
}

/// Engine for SQL scripts against a relational store.
pub type RelationalEngine = MigrationEngine<SqlScanner>;

/// Engine for JSON operation files against a document store.
pub type DocumentEngine = MigrationEngine<DocumentScanner>;

impl RelationalEngine {
    /// Relational engine with a Flyway-shaped history table.
    pub fn for_database(
        db: Arc<dyn Database>,
        migrations_dir: impl Into<PathBuf>,
        history_table: &str,
        transactional: bool,
        installed_by: impl Into<String>,
    ) -> Self {
        Self::new(
            SqlScanner::new(migrations_dir),
            Arc::new(RelationalHistory::new(db.clone(), history_table)),
            Arc::new(SqlApplier::new(db, transactional)),
            installed_by,
        )
    }
}

impl DocumentEngine {
    /// Document engine with a history collection.
    pub fn for_store(
        store: Arc<dyn DocumentStore>,
        migrations_dir: impl Into<PathBuf>,
        history_collection: &str,
        installed_by: impl Into<String>,
    ) -> Self {
        Self::new(
            DocumentScanner::new(migrations_dir),
            Arc::new(DocumentHistory::new(store.clone(), history_collection)),
            Arc::new(DocumentApplier::new(store)),
            installed_by,
        )
    }
}

impl<S> MigrationEngine<S>
where
    S: MigrationScanner,
    S::Payload: Clone + 'static,
{
    pub fn new(
        scanner: S,
        history: Arc<dyn HistoryRepository>,
        applier: Arc<dyn MigrationApplier<S::Payload>>,
        installed_by: impl Into<String>,
    ) -> Self {
        Self {
            scanner,
            history,
            applier,
            installed_by: installed_by.into(),
        }
    }

    pub fn history(&self) -> &dyn HistoryRepository {
        self.history.as_ref()
    }

    /// Scan the migrations directory.
    pub fn discover(&self) -> Scan<S::Payload> {
        self.scanner.scan()
    }

    /// Applied history in installation order.
    pub async fn applied(&self) -> EngineResult<Vec<AppliedMigrationRecord>> {
        self.history.applied().await
    }

    /// Discovered migrations not yet in history, in version order.
    pub async fn pending(&self) -> EngineResult<Vec<MigrationDescriptor<S::Payload>>> {
        let scan = self.discover();
        let applied = self.applied().await?;
        let pending: Vec<_> = planner::plan(&scan.descriptors, &applied)
            .into_iter()
            .cloned()
            .collect();
        log::info!("Found {} pending {} migration(s)", pending.len(), self.scanner.kind());
        Ok(pending)
    }

    /// Initialize history, then apply every pending migration, stopping at
    /// the first failure.
    pub async fn migrate(&self) -> EngineResult<Vec<MigrationResult>> {
        self.history.initialize().await?;

        let scan = self.discover();
        for dup in scan.duplicate_versions() {
            log::warn!(
                "Version {} is claimed by {}; only the first is applied",
                dup.version,
                dup.files.join(", ")
            );
        }
        let applied = self.applied().await?;
        let pending = planner::plan(&scan.descriptors, &applied);
        if pending.is_empty() {
            log::info!("{} schema is up to date. No migration necessary.", self.scanner.kind());
            return Ok(Vec::new());
        }
        log::info!("Found {} pending {} migration(s)", pending.len(), self.scanner.kind());

        let executor = Executor::new(
            self.applier.as_ref(),
            self.history.as_ref(),
            self.scanner.kind(),
            &self.installed_by,
        );
        Ok(executor.execute_all(&pending).await)
    }

    /// Status of every discovered migration, and the files that were skipped.
    pub async fn info(&self) -> EngineResult<InfoReport> {
        let scan = self.discover();
        let applied = self.applied().await?;
        Ok(InfoReport {
            migrations: planner::info(&scan.descriptors, &applied, self.scanner.kind()),
            skipped: scan.skipped,
        })
    }

    /// Compare applied checksums with the files on disk.
    pub async fn validate(&self) -> EngineResult<ValidationReport> {
        let scan = self.discover();
        let applied = self.applied().await?;
        Ok(validator::validate(&scan.descriptors, &applied))
    }
}

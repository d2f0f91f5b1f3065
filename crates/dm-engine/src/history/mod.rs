//! Applied-set repositories.
//!
//! Each engine keeps an append-only history of migration attempts. The
//! relational engine uses a Flyway-shaped table, the document engine a
//! collection with one document per attempt.

mod document;
mod relational;

pub use document::DocumentHistory;
pub use relational::RelationalHistory;

use crate::error::EngineResult;
use async_trait::async_trait;
use dm_core::AppliedMigrationRecord;

/// Persistent record of migration attempts.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Table or collection name, for log lines
    fn target(&self) -> &str;

    /// Create the history store and its indexes if absent.
    async fn initialize(&self) -> EngineResult<()>;

    /// Every record in installation order. A missing store reads as empty.
    async fn applied(&self) -> EngineResult<Vec<AppliedMigrationRecord>>;

    /// Append one record. Prior records are never touched.
    async fn record(&self, record: &AppliedMigrationRecord) -> EngineResult<()>;
}

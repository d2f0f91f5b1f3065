//! Error types for the migration engines.

use dm_core::{CoreError, ExecutionStatus};
use dm_db::DbError;
use thiserror::Error;

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Discovery or configuration failure from dm-core (G001).
    #[error("[G001] {0}")]
    Core(#[from] CoreError),

    /// Store failure outside a single migration attempt (G002).
    #[error("[G002] {0}")]
    Db(#[from] DbError),

    /// Execution status change not allowed by the state machine (G003).
    #[error("[G003] Invalid execution status transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// Clean called without confirmation (G004).
    #[error("[G004] Clean requires explicit confirmation; nothing was dropped")]
    CleanNotConfirmed,

    /// No control-table row for the execution id (G005).
    #[error("[G005] Execution not found: {0}")]
    ExecutionNotFound(String),

    /// A stored row could not be read back (G006).
    #[error("[G006] Invalid history record: {0}")]
    InvalidRecord(String),
}

/// Result type alias for [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

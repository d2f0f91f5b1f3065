//! dm-engine - Migration engines for Dualmig.
//!
//! Composes the store-independent pieces from `dm-core` with the stores from
//! `dm-db`: applied-set repositories, appliers, the fail-fast executor, the
//! relational and document engines, the execution tracker and clean.

pub mod applier;
pub mod clean;
pub mod engine;
pub mod error;
pub mod executor;
pub mod history;
pub(crate) mod row_helpers;
pub mod tracker;

pub use applier::{ApplyError, DocumentApplier, MigrationApplier, SqlApplier};
pub use clean::{clean, CleanConfirmation, CleanReport, CleanTargets};
pub use engine::{DocumentEngine, MigrationEngine, RelationalEngine};
pub use error::{EngineError, EngineResult};
pub use executor::Executor;
pub use history::{DocumentHistory, HistoryRepository, RelationalHistory};
pub use tracker::ExecutionTracker;

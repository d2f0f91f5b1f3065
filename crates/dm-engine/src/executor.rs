//! Sequential, fail-fast application of pending migrations.

use crate::applier::MigrationApplier;
use crate::history::HistoryRepository;
use dm_core::{AppliedMigrationRecord, MigrationDescriptor, MigrationKind, MigrationResult};
use std::time::Instant;

/// Applies pending migrations one at a time and records every attempt.
pub struct Executor<'a, P> {
    applier: &'a dyn MigrationApplier<P>,
    history: &'a dyn HistoryRepository,
    kind: MigrationKind,
    installed_by: &'a str,
}

impl<'a, P: Send + Sync> Executor<'a, P> {
    pub fn new(
        applier: &'a dyn MigrationApplier<P>,
        history: &'a dyn HistoryRepository,
        kind: MigrationKind,
        installed_by: &'a str,
    ) -> Self {
        Self {
            applier,
            history,
            kind,
            installed_by,
        }
    }

    /// Apply `pending` in order, stopping after the first failure.
    ///
    /// Every attempt produces exactly one history record. A success whose
    /// record cannot be written is reported as a failure.
    pub async fn execute_all(&self, pending: &[&MigrationDescriptor<P>]) -> Vec<MigrationResult> {
        let mut results = Vec::with_capacity(pending.len());
        for descriptor in pending {
            let result = self.execute_one(descriptor).await;
            let failed = !result.is_success();
            results.push(result);
            if failed {
                let skipped = pending.len() - results.len();
                if skipped > 0 {
                    log::warn!(
                        "Stopping {} migrations after failure; {} pending migration(s) not attempted",
                        self.kind,
                        skipped
                    );
                }
                break;
            }
        }
        results
    }

    async fn execute_one(&self, descriptor: &MigrationDescriptor<P>) -> MigrationResult {
        let label = descriptor.label();
        log::info!("Executing {} migration: {}", self.kind, label);

        let started = Instant::now();
        let outcome = self.applier.apply(descriptor).await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        let result = match outcome {
            Ok(count) => MigrationResult::success(descriptor, self.kind, elapsed_ms, count),
            Err(e) => {
                log::error!("Migration {} failed: {}", descriptor.version(), e);
                MigrationResult::failure(
                    descriptor,
                    self.kind,
                    elapsed_ms,
                    e.operations_completed,
                    e.to_string(),
                )
            }
        };

        let record =
            AppliedMigrationRecord::for_attempt(descriptor, self.kind, self.installed_by, &result);
        let result = match self.history.record(&record).await {
            Ok(()) => result,
            Err(e) if result.is_success() => {
                log::error!(
                    "Migration {} applied but could not be recorded in '{}': {}",
                    descriptor.version(),
                    self.history.target(),
                    e
                );
                MigrationResult::failure(
                    descriptor,
                    self.kind,
                    elapsed_ms,
                    result.operations_count,
                    format!("applied but not recorded in history: {}", e),
                )
            }
            Err(e) => {
                log::error!(
                    "Could not record failure of migration {} in '{}': {}",
                    descriptor.version(),
                    self.history.target(),
                    e
                );
                result
            }
        };

        log::info!(
            "{}: {} ({}ms)",
            label,
            if result.is_success() { "SUCCESS" } else { "FAILED" },
            result.execution_time_ms
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::ApplyError;
    use crate::error::{EngineError, EngineResult};
    use async_trait::async_trait;
    use dm_core::{Checksum, MigrationState, MigrationVersion};
    use dm_db::DbError;
    use std::sync::Mutex;

    /// Fails every version listed in `failing`.
    struct StubApplier {
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl MigrationApplier<()> for StubApplier {
        async fn apply(&self, descriptor: &MigrationDescriptor<()>) -> Result<u64, ApplyError> {
            if self.failing.contains(&descriptor.version().as_str()) {
                return Err(ApplyError {
                    operations_completed: 1,
                    source: DbError::ExecutionError("boom".into()),
                });
            }
            Ok(3)
        }
    }

    #[derive(Default)]
    struct StubHistory {
        rejects: bool,
        records: Mutex<Vec<AppliedMigrationRecord>>,
    }

    #[async_trait]
    impl HistoryRepository for StubHistory {
        fn target(&self) -> &str {
            "stub"
        }

        async fn initialize(&self) -> EngineResult<()> {
            Ok(())
        }

        async fn applied(&self) -> EngineResult<Vec<AppliedMigrationRecord>> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn record(&self, record: &AppliedMigrationRecord) -> EngineResult<()> {
            if self.rejects {
                return Err(EngineError::Db(DbError::ConnectionError("gone".into())));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn descriptor(version: &str) -> MigrationDescriptor<()> {
        MigrationDescriptor::new(
            MigrationVersion::parse(version),
            "step",
            format!("{}.json", version),
            format!("/tmp/{}.json", version),
            Checksum::for_document(version),
            (),
        )
    }

    #[tokio::test]
    async fn test_stops_after_first_failure() {
        let applier: &dyn MigrationApplier<()> = &StubApplier { failing: vec!["2"] };
        let history = StubHistory::default();
        let executor = Executor::new(applier, &history, MigrationKind::NoSql, "tester");

        let (a, b, c) = (descriptor("1"), descriptor("2"), descriptor("3"));
        let results = executor.execute_all(&[&a, &b, &c]).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].operations_count, 3);
        assert_eq!(results[1].state, MigrationState::Failed);
        assert_eq!(results[1].operations_count, 1);

        let records = history.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].success);
        assert!(!records[1].success);
        assert_eq!(records[1].installed_by, "tester");
    }

    #[tokio::test]
    async fn test_unrecorded_success_becomes_failure() {
        let applier: &dyn MigrationApplier<()> = &StubApplier { failing: vec![] };
        let history = StubHistory {
            rejects: true,
            ..Default::default()
        };
        let executor = Executor::new(applier, &history, MigrationKind::NoSql, "tester");

        let (a, b) = (descriptor("1"), descriptor("2"));
        let results = executor.execute_all(&[&a, &b]).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, MigrationState::Failed);
        assert!(results[0]
            .error_details
            .as_deref()
            .unwrap()
            .contains("not recorded"));
    }
}

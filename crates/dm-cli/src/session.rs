//! One tracked invocation: the control-table row, interrupt handling and
//! the report.

use anyhow::{Context, Result};
use chrono::Utc;
use dm_core::{identity, ExecutionStatus};
use std::future::Future;

use crate::cli::Commands;
use crate::commands::common::{CommandOutcome, EXIT_INTERRUPTED};
use crate::commands::dispatch;
use crate::context::RuntimeContext;
use crate::report::{MigrationReport, SystemInfo};

const INTERRUPTED: &str = "Migration interrupted by user";

/// Run `command` until it finishes or Ctrl-C arrives; returns the exit code.
pub(crate) async fn run(command: &Commands, ctx: &RuntimeContext) -> Result<i32> {
    run_until(command, ctx, tokio::signal::ctrl_c()).await
}

/// [`run`] with an explicit interrupt source. When `interrupt` resolves
/// first the command is abandoned and the execution marked CANCELLED.
pub(crate) async fn run_until<F>(
    command: &Commands,
    ctx: &RuntimeContext,
    interrupt: F,
) -> Result<i32>
where
    F: Future<Output = std::io::Result<()>>,
{
    let start_time = Utc::now();
    let mut execution = match &ctx.tracker {
        Some(tracker) => Some(
            tracker
                .start(command.name(), &ctx.environment)
                .await
                .context("Failed to start execution tracking")?,
        ),
        None => None,
    };
    let execution_id = execution
        .as_ref()
        .map(|e| e.execution_id.clone())
        .unwrap_or_else(identity::new_execution_id);
    log::info!(
        "Execution {} started: {} (environment '{}')",
        execution_id,
        command.name(),
        ctx.environment
    );

    let finished = tokio::select! {
        biased;
        Ok(()) = interrupt => None,
        result = dispatch(command, ctx) => Some(result),
    };

    let (status, outcome) = match finished {
        Some(Ok(outcome)) if outcome.success => (ExecutionStatus::Success, outcome),
        Some(Ok(outcome)) => (ExecutionStatus::Failed, outcome),
        Some(Err(e)) => {
            log::error!("{} failed: {:#}", command.name(), e);
            (ExecutionStatus::Failed, CommandOutcome::failed(format!("{:#}", e)))
        }
        None => {
            log::warn!("{}", INTERRUPTED);
            ctx.rollback_open_transaction().await;
            (ExecutionStatus::Cancelled, CommandOutcome::failed(INTERRUPTED))
        }
    };

    if let (Some(tracker), Some(exec), Some((pg, mongo))) =
        (&ctx.tracker, execution.as_mut(), outcome.attempted)
    {
        if let Err(e) = tracker.progress(exec, pg, mongo).await {
            log::warn!("Could not record progress for {}: {}", execution_id, e);
        }
    }

    let end_time = Utc::now();
    let report = MigrationReport {
        execution_id: execution_id.clone(),
        command: command.name().to_string(),
        environment: ctx.environment.clone(),
        start_time,
        end_time,
        status: status.to_string(),
        duration_seconds: (end_time - start_time).num_seconds(),
        error_message: outcome.error.clone(),
        postgres_results: outcome.postgres_results,
        mongodb_results: outcome.mongodb_results,
        skipped_files: outcome.skipped_files,
        executed_by: identity::executed_by(),
        generated_at: Utc::now(),
        system_info: SystemInfo::collect(),
    };
    let report_path = if ctx.config.execution.generate_report {
        match report.write(&ctx.reports_dir()) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Could not write report: {:#}", e);
                None
            }
        }
    } else {
        None
    };
    report.print_summary(report_path.as_deref());

    if let (Some(tracker), Some(exec)) = (&ctx.tracker, execution.as_mut()) {
        let report_path = report_path.as_ref().map(|p| p.display().to_string());
        let completed = match status {
            ExecutionStatus::Cancelled => tracker.cancel(exec, INTERRUPTED).await,
            _ => {
                tracker
                    .complete(exec, status, report.error_message.as_deref(), report_path.as_deref())
                    .await
            }
        };
        if let Err(e) = completed {
            log::warn!("Could not complete execution {}: {}", execution_id, e);
        }
    }

    log::info!("Execution {} finished: {}", execution_id, status);
    Ok(exit_code(status))
}

pub(crate) fn exit_code(status: ExecutionStatus) -> i32 {
    match status {
        ExecutionStatus::Success => 0,
        ExecutionStatus::Cancelled => EXIT_INTERRUPTED,
        _ => 1,
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

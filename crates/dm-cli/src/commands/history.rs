//! History command implementation

use anyhow::{Context, Result};
use dm_core::ExecutionRecord;

use crate::cli::HistoryArgs;
use crate::commands::common::{print_table, truncate, CommandOutcome};
use crate::context::RuntimeContext;

/// Show the most recent runner executions, newest first.
pub(crate) async fn execute(args: &HistoryArgs, ctx: &RuntimeContext) -> Result<CommandOutcome> {
    let Some(tracker) = &ctx.tracker else {
        println!("Execution tracking is disabled (control.enabled = false)");
        return Ok(CommandOutcome::ok());
    };

    if let Some(id) = &args.execution_id {
        let execution = tracker
            .get(id)
            .await
            .with_context(|| format!("Failed to read execution {}", id))?;
        return Ok(match execution {
            Some(execution) => {
                print_table(&HEADERS, &rows(std::slice::from_ref(&execution)));
                CommandOutcome::ok()
            }
            None => {
                println!("Execution {} not found", id);
                CommandOutcome::failed(format!("Execution {} not found", id))
            }
        });
    }

    log::info!("Retrieving execution history...");
    let executions = tracker
        .history(args.limit)
        .await
        .context("Failed to read execution history")?;

    if executions.is_empty() {
        println!("No executions recorded");
    } else {
        print_table(&HEADERS, &rows(&executions));
    }
    Ok(CommandOutcome::ok())
}

const HEADERS: [&str; 10] = [
    "EXECUTION ID",
    "COMMAND",
    "ENVIRONMENT",
    "STATUS",
    "STARTED",
    "DURATION",
    "PG",
    "MONGO",
    "EXECUTED BY",
    "ERROR",
];

fn rows(executions: &[ExecutionRecord]) -> Vec<Vec<String>> {
    executions
        .iter()
        .map(|e| {
            vec![
                e.execution_id.clone(),
                e.command.clone(),
                e.environment.clone(),
                e.status.to_string(),
                e.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.duration_seconds
                    .map(|d| format!("{}s", d))
                    .unwrap_or_default(),
                e.postgres_migrations_count.to_string(),
                e.mongodb_migrations_count.to_string(),
                e.executed_by.clone(),
                e.error_message
                    .as_deref()
                    .map(|m| truncate(m, 40))
                    .unwrap_or_default(),
            ]
        })
        .collect()
}

//! Clean command implementation

use anyhow::{Context, Result};
use dm_engine::{clean, CleanConfirmation, CleanReport, CleanTargets};
use std::io::Write;

use crate::cli::CleanArgs;
use crate::commands::common::CommandOutcome;
use crate::context::RuntimeContext;

/// The exact answer that confirms a clean.
pub(crate) const CONFIRMATION_WORD: &str = "YES";

/// Drop every table and collection after confirmation.
pub(crate) async fn execute(args: &CleanArgs, ctx: &RuntimeContext) -> Result<CommandOutcome> {
    log::warn!("DANGER: this will clean all database schemas");
    println!("This operation will permanently delete:");
    if let Some(tracker) = &ctx.tracker {
        println!("  - the execution control table ({})", tracker.table());
    }
    println!(
        "  - the migration history table ({})",
        ctx.config.relational.history_table
    );
    println!("  - every other table in the relational schema");
    if ctx.store.is_some() {
        println!("  - every collection in the document database");
    }

    let confirmation = if args.yes {
        CleanConfirmation::Confirmed
    } else {
        CleanConfirmation::from_flag(is_confirmed(&prompt().await?))
    };
    run(confirmation, ctx).await
}

/// Perform the clean with a decided confirmation.
pub(crate) async fn run(
    confirmation: CleanConfirmation,
    ctx: &RuntimeContext,
) -> Result<CommandOutcome> {
    if confirmation != CleanConfirmation::Confirmed {
        println!("Clean operation cancelled");
        return Ok(CommandOutcome::ok());
    }

    let targets = CleanTargets {
        db: ctx.db.as_ref(),
        schema: ctx.schema(),
        history_table: &ctx.config.relational.history_table,
        control_table: ctx.tracker.as_ref().map(|t| t.table()),
        store: ctx.store.as_deref(),
    };
    let report = clean(confirmation, targets)
        .await
        .context("Clean operation failed")?;
    print_report(&report);
    Ok(CommandOutcome::ok())
}

pub(crate) fn is_confirmed(answer: &str) -> bool {
    answer.trim() == CONFIRMATION_WORD
}

async fn prompt() -> Result<String> {
    print!(
        "Are you sure you want to proceed? Type '{}' to confirm: ",
        CONFIRMATION_WORD
    );
    std::io::stdout().flush().context("Failed to write prompt")?;
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .context("Confirmation prompt aborted")?
    .context("Failed to read confirmation")?;
    Ok(answer)
}

fn print_report(report: &CleanReport) {
    println!();
    if !report.dropped_views.is_empty() {
        println!("Dropped {} view(s)", report.dropped_views.len());
        for view in &report.dropped_views {
            println!("  {}", view);
        }
    }
    println!("Dropped {} table(s)", report.dropped_tables.len());
    for table in &report.dropped_tables {
        println!("  {}", table);
    }
    println!("Dropped {} collection(s)", report.dropped_collections.len());
    for collection in &report.dropped_collections {
        println!("  {}", collection);
    }
    if !report.document_errors.is_empty() {
        println!("Document store cleanup was incomplete:");
        for error in &report.document_errors {
            println!("  {}", error);
        }
    }
    println!("Database cleanup completed");
}

#[cfg(test)]
#[path = "clean_test.rs"]
mod tests;

//! Migrate command implementation

use anyhow::{Context, Result};
use dm_core::MigrationResult;

use crate::commands::common::{print_table, to_values, truncate, CommandOutcome};
use crate::context::RuntimeContext;

/// Apply pending relational migrations, then pending document migrations.
///
/// Each engine stops at its own first failure; the document engine still
/// runs when the relational one failed.
pub(crate) async fn execute(ctx: &RuntimeContext) -> Result<CommandOutcome> {
    log::info!("Executing relational migrations...");
    let relational = ctx
        .relational_engine()
        .migrate()
        .await
        .context("Relational migration failed")?;

    let document = match ctx.document_engine() {
        Some(engine) => {
            log::info!("Executing document migrations...");
            engine
                .migrate()
                .await
                .context("Document migration failed")?
        }
        None => Vec::new(),
    };

    print_results("PostgreSQL", &relational);
    print_results("MongoDB", &document);

    let failed = relational
        .iter()
        .chain(&document)
        .filter(|r| !r.is_success())
        .count();

    let mut outcome = if failed == 0 {
        println!("All migrations completed successfully");
        CommandOutcome::ok()
    } else {
        println!("{} migration(s) failed", failed);
        CommandOutcome::failed("Some migrations failed")
    };
    outcome.attempted = Some((relational.len() as i64, document.len() as i64));
    outcome.postgres_results = to_values(&relational)?;
    outcome.mongodb_results = to_values(&document)?;
    Ok(outcome)
}

fn print_results(label: &str, results: &[MigrationResult]) {
    if results.is_empty() {
        return;
    }
    println!();
    println!("{} migrations", label);
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| {
            vec![
                r.version.clone(),
                truncate(&r.description, 40),
                r.state.to_string(),
                format!("{}ms", r.execution_time_ms),
                r.error_details
                    .as_deref()
                    .map(|e| truncate(e, 60))
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["VERSION", "DESCRIPTION", "STATE", "TIME", "ERROR"], &rows);
}

#[cfg(test)]
#[path = "migrate_test.rs"]
mod tests;

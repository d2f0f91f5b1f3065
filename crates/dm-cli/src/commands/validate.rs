//! Validate command implementation

use anyhow::{Context, Result};
use dm_core::ValidationReport;

use crate::commands::common::{print_table, CommandOutcome};
use crate::context::RuntimeContext;

/// Check applied checksums of both engines against the files on disk.
pub(crate) async fn execute(ctx: &RuntimeContext) -> Result<CommandOutcome> {
    log::info!("Validating migrations...");
    let relational = ctx
        .relational_engine()
        .validate()
        .await
        .context("Failed to validate relational migrations")?;
    let mut valid = report("PostgreSQL", &relational);

    if let Some(engine) = ctx.document_engine() {
        let document = engine
            .validate()
            .await
            .context("Failed to validate document migrations")?;
        valid &= report("MongoDB", &document);
    }

    if valid {
        println!("All migrations validated successfully");
        Ok(CommandOutcome::ok())
    } else {
        println!("Migration validation failed");
        Ok(CommandOutcome::failed("Validation failed"))
    }
}

/// Print one engine's findings; true when it has no drift.
fn report(label: &str, report: &ValidationReport) -> bool {
    if report.is_valid() {
        log::info!(
            "{}: {} applied migration(s) match their files",
            label,
            report.checked
        );
        return true;
    }
    println!();
    println!("{} checksum mismatches", label);
    let rows: Vec<Vec<String>> = report
        .mismatches
        .iter()
        .map(|m| {
            vec![
                m.version.clone(),
                m.script.clone(),
                m.applied.clone(),
                m.current.clone(),
            ]
        })
        .collect();
    print_table(&["VERSION", "SCRIPT", "APPLIED", "CURRENT"], &rows);
    false
}

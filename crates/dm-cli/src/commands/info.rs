//! Info command implementation

use anyhow::{Context, Result};
use dm_core::{InfoReport, MigrationInfo, SkippedFile};
use serde_json::{json, Value};

use crate::commands::common::{print_table, to_values, truncate, CommandOutcome};
use crate::context::RuntimeContext;

/// Show every discovered migration with its state against history, and
/// the files that were not picked up.
pub(crate) async fn execute(ctx: &RuntimeContext) -> Result<CommandOutcome> {
    log::info!("Retrieving migration status...");
    let relational = ctx
        .relational_engine()
        .info()
        .await
        .context("Failed to read relational migration status")?;
    let document = match ctx.document_engine() {
        Some(engine) => engine
            .info()
            .await
            .context("Failed to read document migration status")?,
        None => InfoReport::default(),
    };

    print_info("PostgreSQL", &relational.migrations);
    if ctx.store.is_some() {
        print_info("MongoDB", &document.migrations);
    }

    let skipped: Vec<Value> = skipped_entries("PostgreSQL", &relational.skipped)
        .chain(skipped_entries("MongoDB", &document.skipped))
        .collect();
    print_skipped(&skipped);

    let mut outcome = CommandOutcome::ok();
    outcome.postgres_results = to_values(&relational.migrations)?;
    outcome.mongodb_results = to_values(&document.migrations)?;
    outcome.skipped_files = skipped;
    Ok(outcome)
}

fn skipped_entries<'a>(
    engine: &'a str,
    skipped: &'a [SkippedFile],
) -> impl Iterator<Item = Value> + 'a {
    skipped
        .iter()
        .map(move |s| json!({"engine": engine, "file": s.file, "reason": s.reason}))
}

fn print_info(label: &str, infos: &[MigrationInfo]) {
    println!();
    println!("{} migrations", label);
    if infos.is_empty() {
        println!("No migrations found");
        return;
    }
    let rows: Vec<Vec<String>> = infos
        .iter()
        .map(|i| {
            vec![
                i.version.clone(),
                truncate(&i.description, 40),
                i.script.clone(),
                i.state.to_string(),
                i.installed_on
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(
        &["VERSION", "DESCRIPTION", "SCRIPT", "STATE", "INSTALLED ON"],
        &rows,
    );
}

fn print_skipped(skipped: &[Value]) {
    if skipped.is_empty() {
        return;
    }
    println!();
    println!("Skipped files");
    let field = |v: &Value, key: &str| v[key].as_str().unwrap_or_default().to_string();
    let rows: Vec<Vec<String>> = skipped
        .iter()
        .map(|s| vec![field(s, "engine"), field(s, "file"), truncate(&field(s, "reason"), 60)])
        .collect();
    print_table(&["ENGINE", "FILE", "REASON"], &rows);
}

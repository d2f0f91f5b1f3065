//! Destructive clean of both stores.

use crate::error::{EngineError, EngineResult};
use dm_db::{Database, DbError, DocumentStore};
use serde::Serialize;

/// Explicit consent to drop everything. There is no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanConfirmation {
    Confirmed,
    NotConfirmed,
}

impl CleanConfirmation {
    pub fn from_flag(confirmed: bool) -> Self {
        if confirmed {
            CleanConfirmation::Confirmed
        } else {
            CleanConfirmation::NotConfirmed
        }
    }
}

/// What to drop.
pub struct CleanTargets<'a> {
    pub db: &'a dyn Database,
    /// Schema whose tables are dropped; `None` means the current schema
    pub schema: Option<&'a str>,
    pub history_table: &'a str,
    pub control_table: Option<&'a str>,
    pub store: Option<&'a dyn DocumentStore>,
}

/// What was dropped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub dropped_views: Vec<String>,
    pub dropped_tables: Vec<String>,
    pub dropped_collections: Vec<String>,
    /// Document-store failures; these do not fail the clean
    pub document_errors: Vec<String>,
}

fn qualify(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) if !table.contains('.') => format!("{}.{}", schema, table),
        _ => table.to_string(),
    }
}

/// Drop the control table, the history table, every view and every other
/// table in the schema, then every collection in the document database.
///
/// Without [`CleanConfirmation::Confirmed`] nothing is touched. Relational
/// failures abort; document-store failures are logged and reported.
pub async fn clean(
    confirmation: CleanConfirmation,
    targets: CleanTargets<'_>,
) -> EngineResult<CleanReport> {
    if confirmation != CleanConfirmation::Confirmed {
        return Err(EngineError::CleanNotConfirmed);
    }

    let mut report = CleanReport::default();
    clean_relational(&targets, &mut report).await?;
    if let Some(store) = targets.store {
        clean_documents(store, &mut report).await;
    }
    log::warn!(
        "Clean dropped {} table(s) and {} collection(s)",
        report.dropped_tables.len(),
        report.dropped_collections.len()
    );
    Ok(report)
}

async fn clean_relational(targets: &CleanTargets<'_>, report: &mut CleanReport) -> EngineResult<()> {
    let db = targets.db;

    let mut bookkeeping = Vec::new();
    if let Some(control) = targets.control_table {
        bookkeeping.push(control.to_string());
    }
    bookkeeping.push(targets.history_table.to_string());
    for table in bookkeeping {
        db.drop_if_exists(&table).await?;
        log::warn!("Dropped table {}", table);
        report.dropped_tables.push(table);
    }

    for view in db.list_views(targets.schema).await? {
        let view = qualify(targets.schema, &view);
        db.drop_if_exists(&view).await?;
        log::warn!("Dropped view {}", view);
        report.dropped_views.push(view);
    }

    let mut remaining: Vec<String> = db
        .list_tables(targets.schema)
        .await?
        .into_iter()
        .map(|t| qualify(targets.schema, &t))
        .collect();

    // Tables referenced by foreign keys drop only after their dependents;
    // repeat until a pass makes no progress.
    while !remaining.is_empty() {
        let mut failed: Vec<(String, DbError)> = Vec::new();
        let before = remaining.len();
        for table in remaining {
            match db.drop_if_exists(&table).await {
                Ok(()) => {
                    log::warn!("Dropped table {}", table);
                    report.dropped_tables.push(table);
                }
                Err(e) => failed.push((table, e)),
            }
        }
        if failed.len() == before {
            if let Some((table, e)) = failed.into_iter().next() {
                log::error!("Could not drop table {}: {}", table, e);
                return Err(e.into());
            }
            break;
        }
        remaining = failed.into_iter().map(|(table, _)| table).collect();
    }
    Ok(())
}

async fn clean_documents(store: &dyn DocumentStore, report: &mut CleanReport) {
    let collections = match store.list_collections().await {
        Ok(collections) => collections,
        Err(e) => {
            log::warn!("Could not list {} collections: {}", store.store_type(), e);
            report.document_errors.push(e.to_string());
            return;
        }
    };
    for collection in collections {
        match store.drop_collection(&collection).await {
            Ok(()) => {
                log::warn!("Dropped collection {}", collection);
                report.dropped_collections.push(collection);
            }
            Err(e) => {
                log::warn!("Could not drop collection {}: {}", collection, e);
                report
                    .document_errors
                    .push(format!("{}: {}", collection, e));
            }
        }
    }
}

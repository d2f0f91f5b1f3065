//! SQL text helpers shared by the relational backends.

use crate::traits::{SqlRow, SqlValue};

/// Quote each dot-separated part of a relation name.
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Split `schema.table` into its parts; bare names have no schema.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rfind('.') {
        Some(pos) => (Some(&name[..pos]), &name[pos + 1..]),
        None => (None, name),
    }
}

/// First column of the first row as a count, 0 when absent.
pub fn first_count(rows: &[SqlRow]) -> i64 {
    rows.first()
        .and_then(|row| row.first())
        .and_then(SqlValue::as_i64)
        .unwrap_or(0)
}

//! Shared helpers for reading typed columns out of [`SqlRow`]s.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use dm_core::serde_helpers::parse_sql_timestamp;
use dm_db::{SqlRow, SqlValue};

fn cell<'a>(row: &'a SqlRow, idx: usize, column: &str) -> EngineResult<&'a SqlValue> {
    row.get(idx)
        .ok_or_else(|| EngineError::InvalidRecord(format!("missing column {}", column)))
}

/// Non-null column as text.
pub(crate) fn text(row: &SqlRow, idx: usize, column: &str) -> EngineResult<String> {
    opt_text(row, idx, column)?
        .ok_or_else(|| EngineError::InvalidRecord(format!("{} is NULL", column)))
}

pub(crate) fn opt_text(row: &SqlRow, idx: usize, column: &str) -> EngineResult<Option<String>> {
    Ok(cell(row, idx, column)?.to_text())
}

pub(crate) fn int(row: &SqlRow, idx: usize, column: &str) -> EngineResult<i64> {
    opt_int(row, idx, column)?
        .ok_or_else(|| EngineError::InvalidRecord(format!("{} is not an integer", column)))
}

pub(crate) fn opt_int(row: &SqlRow, idx: usize, column: &str) -> EngineResult<Option<i64>> {
    let value = cell(row, idx, column)?;
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_i64()
        .map(Some)
        .ok_or_else(|| EngineError::InvalidRecord(format!("{} is not an integer", column)))
}

pub(crate) fn boolean(row: &SqlRow, idx: usize, column: &str) -> EngineResult<bool> {
    cell(row, idx, column)?
        .as_bool()
        .ok_or_else(|| EngineError::InvalidRecord(format!("{} is not a boolean", column)))
}

/// Timestamp column selected as `CAST(col AS VARCHAR)`.
pub(crate) fn opt_timestamp(
    row: &SqlRow,
    idx: usize,
    column: &str,
) -> EngineResult<Option<DateTime<Utc>>> {
    match opt_text(row, idx, column)? {
        None => Ok(None),
        Some(raw) => parse_sql_timestamp(&raw).map(Some).ok_or_else(|| {
            EngineError::InvalidRecord(format!("{} has an unreadable timestamp '{}'", column, raw))
        }),
    }
}

pub(crate) fn timestamp(row: &SqlRow, idx: usize, column: &str) -> EngineResult<DateTime<Utc>> {
    opt_timestamp(row, idx, column)?
        .ok_or_else(|| EngineError::InvalidRecord(format!("{} is NULL", column)))
}

/// Table name without its schema, for index names.
pub(crate) fn bare_name(table: &str) -> &str {
    dm_db::sql::split_qualified(table).1
}

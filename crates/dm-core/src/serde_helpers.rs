//! Shared serde helper functions used across multiple modules.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Serde default function that returns `true`.
///
/// Used for boolean fields that should default to enabled/active.
pub fn default_true() -> bool {
    true
}

/// Deserialize a string, accepting a bare JSON integer as its decimal text.
///
/// Migration authors frequently write `"version": 3` instead of `"3"`.
/// Fractional numbers are rejected: `1.10` would read back as `1.1`.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => Ok(s),
        Raw::Number(n) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        Raw::Number(n) => Err(serde::de::Error::custom(format!(
            "numeric value {n} is not an integer; write dotted versions as strings"
        ))),
    }
}

/// Timestamp format used for text storage: fixed-width microseconds so that
/// lexicographic order equals chronological order.
pub const TIMESTAMP_TEXT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// SQL literal format accepted by `CAST(... AS TIMESTAMP)` in both
/// PostgreSQL and DuckDB.
pub const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render a UTC timestamp for a SQL `CAST(... AS TIMESTAMP)` parameter.
pub fn to_sql_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(SQL_TIMESTAMP_FORMAT).to_string()
}

/// Parse the text form of a SQL `TIMESTAMP` column (`CAST(col AS VARCHAR)`).
///
/// Both PostgreSQL and DuckDB render `YYYY-MM-DD HH:MM:SS[.ffffff]`; an
/// RFC 3339 string is accepted as well.
pub fn parse_sql_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Serialize `DateTime<Utc>` with [`TIMESTAMP_TEXT_FORMAT`].
pub mod sortable_timestamp {
    use super::TIMESTAMP_TEXT_FORMAT;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_TEXT_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_sql_timestamp(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{text}'")))
    }
}

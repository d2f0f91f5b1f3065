//! Migration version tokens and their ordering.
//!
//! A version is a dot-separated list of non-negative integers (`1.2.10`).
//! Ordering is component-wise numeric, so `1.10` sorts after `1.2`. Tokens
//! that do not parse keep their raw text but sort below every numeric
//! version instead of failing discovery.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Parsed sort key for a version token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionKey {
    /// Token did not parse as dot-separated integers
    Malformed,
    /// Parsed numeric components
    Numeric(Vec<u64>),
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VersionKey::Malformed, VersionKey::Malformed) => Ordering::Equal,
            (VersionKey::Malformed, VersionKey::Numeric(_)) => Ordering::Less,
            (VersionKey::Numeric(_), VersionKey::Malformed) => Ordering::Greater,
            // Slice ordering is lexicographic over components, which gives
            // the shorter-prefix-first behaviour ("1.2" < "1.2.1").
            (VersionKey::Numeric(a), VersionKey::Numeric(b)) => a.cmp(b),
        }
    }
}

/// A migration version token.
///
/// Equality is raw-token equality (what history tables store); ordering
/// uses the parsed [`VersionKey`] and falls back to the raw token so the
/// order is total.
#[derive(Debug, Clone, Eq, Hash)]
pub struct MigrationVersion {
    raw: String,
    key: VersionKey,
}

impl MigrationVersion {
    /// Parse a version token. Never fails; see [`VersionKey::Malformed`].
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let key = parse_key(&raw);
        Self { raw, key }
    }

    /// The token exactly as written in the migration source.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Sort key for this version.
    pub fn key(&self) -> &VersionKey {
        &self.key
    }

    /// Returns `true` if the token did not parse as dot-separated integers.
    pub fn is_malformed(&self) -> bool {
        self.key == VersionKey::Malformed
    }
}

fn parse_key(raw: &str) -> VersionKey {
    if raw.is_empty() {
        return VersionKey::Malformed;
    }
    let parts: Result<Vec<u64>, _> = raw.split('.').map(str::parse::<u64>).collect();
    match parts {
        Ok(parts) => VersionKey::Numeric(parts),
        Err(_) => VersionKey::Malformed,
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq<str> for MigrationVersion {
    fn eq(&self, other: &str) -> bool {
        self.raw == other
    }
}

impl PartialEq<&str> for MigrationVersion {
    fn eq(&self, other: &&str) -> bool {
        self.raw == *other
    }
}

impl From<&str> for MigrationVersion {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for MigrationVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(tokens: &[&str]) -> Vec<String> {
        let mut versions: Vec<MigrationVersion> =
            tokens.iter().map(|t| MigrationVersion::parse(*t)).collect();
        versions.sort();
        versions.into_iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert!(MigrationVersion::parse("1.10") > MigrationVersion::parse("1.2"));
        assert!(MigrationVersion::parse("10") > MigrationVersion::parse("9"));
    }

    #[test]
    fn test_mixed_depth_ordering() {
        assert_eq!(
            sorted(&["2.0", "1.10", "1.2.1", "1.2"]),
            vec!["1.2", "1.2.1", "1.10", "2.0"]
        );
    }

    #[test]
    fn test_malformed_sorts_lowest() {
        let bad = MigrationVersion::parse("1.x");
        assert!(bad.is_malformed());
        assert!(bad < MigrationVersion::parse("0"));
        assert_eq!(sorted(&["1", "abc", "0.1"]), vec!["abc", "0.1", "1"]);
    }

    #[test]
    fn test_empty_and_trailing_dot_are_malformed() {
        assert!(MigrationVersion::parse("").is_malformed());
        assert!(MigrationVersion::parse("1.").is_malformed());
        assert!(MigrationVersion::parse("-1").is_malformed());
    }

    #[test]
    fn test_equality_is_raw_token() {
        // "1.0" and "1.00" share a key but are different history entries
        let a = MigrationVersion::parse("1.0");
        let b = MigrationVersion::parse("1.00");
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
        assert_eq!(a, "1.0");
    }

    #[test]
    fn test_serde_round_trips_raw_token() {
        let v: MigrationVersion = serde_json::from_str("\"1.2.10\"").unwrap();
        assert_eq!(v.key(), &VersionKey::Numeric(vec![1, 2, 10]));
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.2.10\"");
    }
}

//! Pending-migration planning and status reporting.
//!
//! Both functions are pure: the result depends only on the discovered
//! descriptors and the applied history passed in.

use crate::descriptor::{MigrationDescriptor, MigrationKind};
use crate::record::{AppliedMigrationRecord, MigrationState};
use crate::scanner::SkippedFile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Descriptors that still need to be applied, in discovery order.
///
/// A descriptor is pending when no history record (successful or not)
/// carries its version. Checksums are not consulted. When several files
/// claim the same version only the first one can be pending.
pub fn plan<'a, P>(
    discovered: &'a [MigrationDescriptor<P>],
    applied: &[AppliedMigrationRecord],
) -> Vec<&'a MigrationDescriptor<P>> {
    let mut claimed: HashSet<&str> = applied.iter().map(|r| r.version.as_str()).collect();
    discovered
        .iter()
        .filter(|d| claimed.insert(d.version().as_str()))
        .collect()
}

/// One row of `info` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationInfo {
    pub version: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: MigrationKind,
    pub script: String,
    pub state: MigrationState,
    pub installed_on: Option<DateTime<Utc>>,
    pub execution_time_ms: i64,
    pub operations_count: Option<u64>,
}

/// `info` rows for one engine plus the files discovery left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InfoReport {
    pub migrations: Vec<MigrationInfo>,
    pub skipped: Vec<SkippedFile>,
}

/// Status of every discovered migration against history.
///
/// When a version has several history records the latest one wins.
pub fn info<P>(
    discovered: &[MigrationDescriptor<P>],
    applied: &[AppliedMigrationRecord],
    kind: MigrationKind,
) -> Vec<MigrationInfo> {
    let latest: HashMap<&str, &AppliedMigrationRecord> =
        applied.iter().map(|r| (r.version.as_str(), r)).collect();

    discovered
        .iter()
        .map(|d| {
            let record = latest.get(d.version().as_str());
            MigrationInfo {
                version: d.version().to_string(),
                description: d.description().to_string(),
                kind,
                script: d.source_identifier().to_string(),
                state: match record {
                    Some(r) if r.success => MigrationState::Success,
                    Some(_) => MigrationState::Failed,
                    None => MigrationState::Pending,
                },
                installed_on: record.map(|r| r.installed_on),
                execution_time_ms: record.map_or(0, |r| r.execution_time_ms),
                operations_count: record.and_then(|r| r.operations_count),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::descriptor::SqlScript;
    use crate::version::MigrationVersion;

    fn descriptor(version: &str) -> MigrationDescriptor<SqlScript> {
        let file = format!("V{}__m.sql", version);
        MigrationDescriptor::new(
            MigrationVersion::parse(version),
            "m",
            file.clone(),
            file,
            Checksum::for_sql(version),
            SqlScript {
                sql: String::new(),
            },
        )
    }

    fn record(version: &str, success: bool) -> AppliedMigrationRecord {
        AppliedMigrationRecord {
            installed_rank: Some(1),
            version: version.to_string(),
            description: "m".to_string(),
            kind: MigrationKind::Sql,
            script: format!("V{}__m.sql", version),
            checksum: "0".to_string(),
            installed_by: "test".to_string(),
            installed_on: Utc::now(),
            execution_time_ms: 3,
            success,
            error_message: None,
            operations_count: None,
        }
    }

    fn versions(pending: &[&MigrationDescriptor<SqlScript>]) -> Vec<String> {
        pending.iter().map(|d| d.version().to_string()).collect()
    }

    #[test]
    fn test_plan_excludes_applied_versions() {
        let discovered = vec![descriptor("1"), descriptor("2"), descriptor("3")];
        let applied = vec![record("1", true), record("2", false)];
        // A failed record still claims its version
        assert_eq!(versions(&plan(&discovered, &applied)), vec!["3"]);
    }

    #[test]
    fn test_plan_is_idempotent() {
        let discovered = vec![descriptor("1.2"), descriptor("1.10")];
        let applied = vec![];
        let first = versions(&plan(&discovered, &applied));
        let second = versions(&plan(&discovered, &applied));
        assert_eq!(first, second);
        assert_eq!(first, vec!["1.2", "1.10"]);
    }

    #[test]
    fn test_plan_keeps_malformed_versions() {
        let discovered = vec![descriptor("draft"), descriptor("1")];
        assert_eq!(versions(&plan(&discovered, &[])), vec!["draft", "1"]);
    }

    #[test]
    fn test_plan_ignores_history_of_deleted_files() {
        let discovered = vec![descriptor("2")];
        let applied = vec![record("1", true)];
        assert_eq!(versions(&plan(&discovered, &applied)), vec!["2"]);
    }

    #[test]
    fn test_plan_duplicate_version_pending_once() {
        let discovered = vec![descriptor("1"), descriptor("1")];
        assert_eq!(plan(&discovered, &[]).len(), 1);
    }

    #[test]
    fn test_info_states() {
        let discovered = vec![descriptor("1"), descriptor("2"), descriptor("3")];
        let applied = vec![record("1", true), record("2", false)];
        let rows = info(&discovered, &applied, MigrationKind::Sql);
        let states: Vec<MigrationState> = rows.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                MigrationState::Success,
                MigrationState::Failed,
                MigrationState::Pending
            ]
        );
        assert_eq!(rows[0].execution_time_ms, 3);
        assert!(rows[2].installed_on.is_none());
    }
}

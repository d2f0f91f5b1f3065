//! Checksum drift detection.

use crate::descriptor::MigrationDescriptor;
use crate::record::AppliedMigrationRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// An applied migration whose file has changed since it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumMismatch {
    pub version: String,
    pub script: String,
    /// Checksum recorded in history
    pub applied: String,
    /// Checksum of the file on disk now
    pub current: String,
}

/// A version claimed by more than one migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateVersion {
    pub version: String,
    pub files: Vec<String>,
}

/// Result of validating one engine's history against its files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub mismatches: Vec<ChecksumMismatch>,
    /// Reported as warnings; they do not fail validation
    pub duplicate_versions: Vec<DuplicateVersion>,
    /// Number of history records compared against a file
    pub checked: usize,
}

impl ValidationReport {
    /// `true` when no checksum drift was found.
    pub fn is_valid(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare every applied record that still has a file against that file's
/// current checksum.
///
/// Records without a matching file are ignored. When several files claim a
/// version the first in discovery order is the one compared.
pub fn validate<P>(
    discovered: &[MigrationDescriptor<P>],
    applied: &[AppliedMigrationRecord],
) -> ValidationReport {
    let mut current: HashMap<&str, &MigrationDescriptor<P>> = HashMap::new();
    for d in discovered {
        current.entry(d.version().as_str()).or_insert(d);
    }

    let mut report = ValidationReport {
        duplicate_versions: duplicate_versions(discovered),
        ..Default::default()
    };

    for dup in &report.duplicate_versions {
        log::warn!(
            "Version {} is claimed by several files: {}",
            dup.version,
            dup.files.join(", ")
        );
    }

    for record in applied {
        let Some(descriptor) = current.get(record.version.as_str()) else {
            continue;
        };
        report.checked += 1;
        let now = descriptor.checksum().as_stored();
        if now != record.checksum {
            log::error!(
                "Checksum mismatch for migration {}: applied={}, current={}",
                record.version,
                record.checksum,
                now
            );
            report.mismatches.push(ChecksumMismatch {
                version: record.version.clone(),
                script: descriptor.source_identifier().to_string(),
                applied: record.checksum.clone(),
                current: now,
            });
        }
    }

    if report.is_valid() {
        log::info!("All {} applied migration(s) validated", report.checked);
    }
    report
}

/// Versions claimed by more than one descriptor, with every claiming file.
pub fn duplicate_versions<P>(discovered: &[MigrationDescriptor<P>]) -> Vec<DuplicateVersion> {
    let mut by_version: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for d in discovered {
        by_version
            .entry(d.version().as_str())
            .or_default()
            .push(d.source_identifier().to_string());
    }
    by_version
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(version, files)| DuplicateVersion {
            version: version.to_string(),
            files,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::descriptor::{MigrationKind, SqlScript};
    use crate::version::MigrationVersion;
    use chrono::Utc;

    fn descriptor(version: &str, file: &str, sql: &str) -> MigrationDescriptor<SqlScript> {
        MigrationDescriptor::new(
            MigrationVersion::parse(version),
            "m",
            file,
            file,
            Checksum::for_sql(sql),
            SqlScript {
                sql: sql.to_string(),
            },
        )
    }

    fn record(version: &str, checksum: String) -> AppliedMigrationRecord {
        AppliedMigrationRecord {
            installed_rank: Some(1),
            version: version.to_string(),
            description: "m".to_string(),
            kind: MigrationKind::Sql,
            script: "V1.0__m.sql".to_string(),
            checksum,
            installed_by: "test".to_string(),
            installed_on: Utc::now(),
            execution_time_ms: 0,
            success: true,
            error_message: None,
            operations_count: None,
        }
    }

    #[test]
    fn test_matching_checksum_is_valid() {
        let discovered = vec![descriptor("1.0", "V1.0__m.sql", "SELECT 1;")];
        let applied = vec![record("1.0", Checksum::for_sql("SELECT 1;").as_stored())];
        let report = validate(&discovered, &applied);
        assert!(report.is_valid());
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn test_drift_is_reported_with_both_values() {
        let discovered = vec![descriptor("1.0", "V1.0__m.sql", "SELECT 2;")];
        let applied_sum = Checksum::for_sql("SELECT 1;").as_stored();
        let applied = vec![record("1.0", applied_sum.clone())];

        let report = validate(&discovered, &applied);
        assert!(!report.is_valid());
        assert_eq!(
            report.mismatches,
            vec![ChecksumMismatch {
                version: "1.0".to_string(),
                script: "V1.0__m.sql".to_string(),
                applied: applied_sum,
                current: Checksum::for_sql("SELECT 2;").as_stored(),
            }]
        );
    }

    #[test]
    fn test_line_ending_change_is_not_drift() {
        let discovered = vec![descriptor("1", "V1__m.sql", "SELECT 1;\r\nSELECT 2;")];
        let applied = vec![record("1", Checksum::for_sql("SELECT 1;\nSELECT 2;").as_stored())];
        assert!(validate(&discovered, &applied).is_valid());
    }

    #[test]
    fn test_deleted_file_is_not_an_error() {
        let applied = vec![record("9", "123".to_string())];
        let report = validate::<SqlScript>(&[], &applied);
        assert!(report.is_valid());
        assert_eq!(report.checked, 0);
    }

    #[test]
    fn test_duplicates_warn_but_stay_valid() {
        let discovered = vec![
            descriptor("1", "V1__a.sql", "SELECT 1;"),
            descriptor("1", "V1__b.sql", "SELECT 2;"),
        ];
        let applied = vec![record("1", Checksum::for_sql("SELECT 1;").as_stored())];
        let report = validate(&discovered, &applied);
        assert!(report.is_valid());
        assert_eq!(report.duplicate_versions.len(), 1);
        assert_eq!(report.duplicate_versions[0].files, vec!["V1__a.sql", "V1__b.sql"]);
    }
}

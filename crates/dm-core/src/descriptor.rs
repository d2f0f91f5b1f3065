//! Discovered migration units.

use crate::checksum::Checksum;
use crate::version::MigrationVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which engine a migration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationKind {
    /// Relational SQL script
    #[serde(rename = "SQL")]
    Sql,
    /// Document-store operation set
    #[serde(rename = "NoSQL")]
    NoSql,
}

impl MigrationKind {
    /// The value written to the `type` column of history.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationKind::Sql => "SQL",
            MigrationKind::NoSql => "NoSQL",
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a relational migration: the full script text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScript {
    /// Script content, exactly as read from disk
    pub sql: String,
}

/// One discovered, checksummed migration unit.
///
/// Fields are private; a descriptor cannot change after the scanner
/// builds it.
#[derive(Debug, Clone)]
pub struct MigrationDescriptor<P> {
    version: MigrationVersion,
    description: String,
    source_identifier: String,
    path: PathBuf,
    checksum: Checksum,
    payload: P,
}

impl<P> MigrationDescriptor<P> {
    /// Build a descriptor.
    pub fn new(
        version: MigrationVersion,
        description: impl Into<String>,
        source_identifier: impl Into<String>,
        path: impl Into<PathBuf>,
        checksum: Checksum,
        payload: P,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            source_identifier: source_identifier.into(),
            path: path.into(),
            checksum,
            payload,
        }
    }

    pub fn version(&self) -> &MigrationVersion {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// File name the migration was read from
    pub fn source_identifier(&self) -> &str {
        &self.source_identifier
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// `"<version> - <description>"`, used in log lines.
    pub fn label(&self) -> String {
        format!("{} - {}", self.version, self.description)
    }
}

/// Relational migration descriptor.
pub type SqlMigration = MigrationDescriptor<SqlScript>;

//! History and execution record types
//!
//! These are the values that cross the persistence boundary: one
//! [`AppliedMigrationRecord`] per migration attempt, one
//! [`MigrationResult`] per attempt returned to the caller, and one
//! [`ExecutionRecord`] per CLI invocation.

use crate::descriptor::{MigrationDescriptor, MigrationKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One row of migration history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigrationRecord {
    /// Relational history only: monotonic insert order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_rank: Option<i32>,

    pub version: String,

    pub description: String,

    #[serde(rename = "type")]
    pub kind: MigrationKind,

    /// Source file name
    pub script: String,

    /// Stored checksum representation, compared by exact string equality
    pub checksum: String,

    pub installed_by: String,

    pub installed_on: DateTime<Utc>,

    pub execution_time_ms: i64,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations_count: Option<u64>,
}

impl AppliedMigrationRecord {
    /// Build the history row for one attempt at `descriptor`.
    ///
    /// `installed_rank` is left unset; the repository assigns it on insert.
    pub fn for_attempt<P>(
        descriptor: &MigrationDescriptor<P>,
        kind: MigrationKind,
        installed_by: &str,
        result: &MigrationResult,
    ) -> Self {
        Self {
            installed_rank: None,
            version: descriptor.version().to_string(),
            description: descriptor.description().to_string(),
            kind,
            script: descriptor.source_identifier().to_string(),
            checksum: descriptor.checksum().as_stored(),
            installed_by: installed_by.to_string(),
            installed_on: Utc::now(),
            execution_time_ms: result.execution_time_ms,
            success: result.state == MigrationState::Success,
            error_message: result.error_details.clone(),
            operations_count: match kind {
                MigrationKind::NoSql => Some(result.operations_count),
                MigrationKind::Sql => None,
            },
        }
    }
}

/// State of a migration as seen by `info` and in executor results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MigrationState {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Success => write!(f, "SUCCESS"),
            MigrationState::Failed => write!(f, "FAILED"),
            MigrationState::Pending => write!(f, "PENDING"),
        }
    }
}

/// Outcome of applying one descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub version: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: MigrationKind,
    pub script: String,
    pub checksum: String,
    pub state: MigrationState,
    pub execution_time_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// Records or operations affected (document engine), 0 for SQL
    #[serde(default)]
    pub operations_count: u64,
}

impl MigrationResult {
    /// Successful application.
    pub fn success<P>(
        descriptor: &MigrationDescriptor<P>,
        kind: MigrationKind,
        execution_time_ms: i64,
        operations_count: u64,
    ) -> Self {
        Self::from_descriptor(descriptor, kind, MigrationState::Success, execution_time_ms)
            .with_operations(operations_count)
    }

    /// Failed application.
    pub fn failure<P>(
        descriptor: &MigrationDescriptor<P>,
        kind: MigrationKind,
        execution_time_ms: i64,
        operations_count: u64,
        error: impl Into<String>,
    ) -> Self {
        let mut result =
            Self::from_descriptor(descriptor, kind, MigrationState::Failed, execution_time_ms)
                .with_operations(operations_count);
        result.error_details = Some(error.into());
        result
    }

    fn from_descriptor<P>(
        descriptor: &MigrationDescriptor<P>,
        kind: MigrationKind,
        state: MigrationState,
        execution_time_ms: i64,
    ) -> Self {
        Self {
            version: descriptor.version().to_string(),
            description: descriptor.description().to_string(),
            kind,
            script: descriptor.source_identifier().to_string(),
            checksum: descriptor.checksum().as_stored(),
            state,
            execution_time_ms: execution_time_ms.max(0),
            error_details: None,
            operations_count: 0,
        }
    }

    fn with_operations(mut self, operations_count: u64) -> Self {
        self.operations_count = operations_count;
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == MigrationState::Success
    }
}

/// Status of a CLI invocation in the control table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Started,
    InProgress,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Started => "STARTED",
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
        }
    }

    /// `SUCCESS`, `FAILED` and `CANCELLED` end the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `STARTED -> IN_PROGRESS -> {SUCCESS, FAILED}`. Commands that never
    /// report counts complete straight from `STARTED`, progress may be
    /// reported more than once, and `CANCELLED` is reachable from either
    /// non-terminal state.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        !self.is_terminal() && next != ExecutionStatus::Started
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STARTED" => Ok(ExecutionStatus::Started),
            "IN_PROGRESS" => Ok(ExecutionStatus::InProgress),
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "CANCELLED" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

/// One row of the control table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub command: String,
    pub environment: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub executed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub postgres_migrations_count: i64,
    #[serde(default)]
    pub mongodb_migrations_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

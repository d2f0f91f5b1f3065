//! Per-invocation JSON report and console summary.

use anyhow::Result;
use chrono::{DateTime, Utc};
use dm_core::identity;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::commands::common::write_json_results;

/// Host facts recorded with every report
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub hostname: Option<String>,
    pub working_directory: Option<String>,
    pub tool_version: &'static str,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            hostname: identity::hostname(),
            working_directory: std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string()),
            tool_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Everything known about one invocation once it has finished
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MigrationReport {
    pub execution_id: String,
    pub command: String,
    pub environment: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub duration_seconds: i64,
    pub error_message: Option<String>,
    pub postgres_results: Vec<Value>,
    pub mongodb_results: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<Value>,
    pub executed_by: String,
    pub generated_at: DateTime<Utc>,
    pub system_info: SystemInfo,
}

impl MigrationReport {
    /// `migration-report-<YYYYMMDD-HHMMSS>-<execution id>.json`
    pub fn file_name(&self) -> String {
        format!(
            "migration-report-{}-{}.json",
            self.start_time.format("%Y%m%d-%H%M%S"),
            self.execution_id
        )
    }

    /// Write the report into `reports_dir` and return its path.
    pub fn write(&self, reports_dir: &Path) -> Result<PathBuf> {
        let path = reports_dir.join(self.file_name());
        write_json_results(&path, self)?;
        log::info!("Report written to {}", path.display());
        Ok(path)
    }

    /// Print the human-readable summary to stdout.
    pub fn print_summary(&self, report_path: Option<&Path>) {
        let rule = "=".repeat(60);
        println!();
        println!("{}", rule);
        println!("MIGRATION EXECUTION REPORT");
        println!("{}", rule);
        println!("Execution ID: {}", self.execution_id);
        println!("Command:      {}", self.command);
        println!("Environment:  {}", self.environment);
        println!("Status:       {}", self.status);
        println!("Duration:     {} seconds", self.duration_seconds);
        println!("Executed by:  {}", self.executed_by);

        for (label, results) in [
            ("PostgreSQL", &self.postgres_results),
            ("MongoDB", &self.mongodb_results),
        ] {
            if results.is_empty() {
                continue;
            }
            let tally = tally(results);
            let verb = if self.command == "migrate" { "executed" } else { "listed" };
            println!("{}", rule);
            println!("{} migrations: {} {}", label, results.len(), verb);
            println!("  Successful: {}", tally.successful);
            println!("  Failed:     {}", tally.failed);
            if tally.pending > 0 {
                println!("  Pending:    {}", tally.pending);
            }
        }

        if let Some(error) = &self.error_message {
            println!("{}", rule);
            println!("ERROR DETAILS:");
            println!("  {}", error);
        }
        if let Some(path) = report_path {
            println!("{}", rule);
            println!("Report saved to: {}", path.display());
        }
        println!("{}", rule);
    }
}

/// Per-state counts of serialized results.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Count results by their `state` field (`SUCCESS`, `FAILED` or `PENDING`).
pub(crate) fn tally(results: &[Value]) -> Tally {
    let mut tally = Tally::default();
    for state in results.iter().filter_map(|r| r.get("state").and_then(Value::as_str)) {
        match state {
            "SUCCESS" => tally.successful += 1,
            "FAILED" => tally.failed += 1,
            "PENDING" => tally.pending += 1,
            _ => {}
        }
    }
    tally
}

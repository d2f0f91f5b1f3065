//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};

/// Dualmig - versioned migrations for a relational and a document store
#[derive(Parser, Debug)]
#[command(name = "dm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Environment to run against (falls back to DM_ENVIRONMENT, then "local")
    #[arg(short, long, global = true)]
    pub environment: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply all pending migrations to both stores
    Migrate,

    /// Show the status of every discovered migration
    Info,

    /// Compare applied checksums with the migration files
    Validate,

    /// Show recent runner executions
    History(HistoryArgs),

    /// Drop every table and collection (destructive)
    Clean(CleanArgs),
}

impl Commands {
    /// Name recorded in the control table and the report.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Migrate => "migrate",
            Commands::Info => "info",
            Commands::Validate => "validate",
            Commands::History(_) => "history",
            Commands::Clean(_) => "clean",
        }
    }
}

/// Arguments for the history command
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Number of executions to show
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Show a single execution by id
    #[arg(long = "id", value_name = "EXECUTION_ID")]
    pub execution_id: Option<String>,
}

/// Arguments for the clean command
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Skip the interactive confirmation
    #[arg(long)]
    pub yes: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

//! Configuration types and parsing for dualmig.yml
//!
//! Resolution order for every setting: built-in default, then the file's
//! top-level section, then the selected environment's overlay, then
//! environment variables.

use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::default_true;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Config file names looked up in the project directory, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["dualmig.yml", "dualmig.yaml"];

/// Environment used when neither `--environment` nor `DM_ENVIRONMENT` is set.
pub const DEFAULT_ENVIRONMENT: &str = "local";

/// Environment variable selecting the environment.
pub const ENVIRONMENT_VAR: &str = "DM_ENVIRONMENT";

/// Main configuration from dualmig.yml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub relational: RelationalConfig,

    #[serde(default)]
    pub document: DocumentConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Named environment overlays (e.g. local, staging, prod)
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,
}

/// Relational store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelationalBackend {
    /// PostgreSQL (default)
    #[default]
    Postgres,
    /// DuckDB file or `:memory:`
    DuckDb,
}

impl std::fmt::Display for RelationalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationalBackend::Postgres => write!(f, "postgres"),
            RelationalBackend::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Relational store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationalConfig {
    #[serde(default)]
    pub backend: RelationalBackend,

    /// Connection URL; for DuckDB a file path or `:memory:`
    #[serde(default = "default_relational_url")]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default = "default_history_table")]
    pub history_table: String,

    #[serde(default = "default_sql_migrations_path")]
    pub migrations_path: String,

    /// Wrap each script in `BEGIN`/`COMMIT`
    #[serde(default = "default_true")]
    pub transactional: bool,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            backend: RelationalBackend::default(),
            url: default_relational_url(),
            username: None,
            password: None,
            schema: default_schema(),
            history_table: default_history_table(),
            migrations_path: default_sql_migrations_path(),
            transactional: true,
        }
    }
}

/// Document store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_document_url")]
    pub url: String,

    #[serde(default = "default_document_database")]
    pub database: String,

    #[serde(default = "default_history_collection")]
    pub history_collection: String,

    #[serde(default = "default_document_migrations_path")]
    pub migrations_path: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_document_url(),
            database: default_document_database(),
            history_collection: default_history_collection(),
            migrations_path: default_document_migrations_path(),
        }
    }
}

/// Execution-tracking (control table) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_control_table")]
    pub table_name: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table_name: default_control_table(),
        }
    }
}

/// Report and log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default = "default_true")]
    pub generate_report: bool,

    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            generate_report: true,
            reports_dir: default_reports_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

/// Per-environment overrides. Only the fields present replace the base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub relational: Option<RelationalOverride>,

    #[serde(default)]
    pub document: Option<DocumentOverride>,
}

/// Relational fields an environment may override
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationalOverride {
    pub backend: Option<RelationalBackend>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
}

/// Document fields an environment may override
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentOverride {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    pub database: Option<String>,
}

fn default_relational_url() -> String {
    "postgresql://localhost:5432/postgres".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_history_table() -> String {
    "flyway_schema_history".to_string()
}

fn default_sql_migrations_path() -> String {
    "migrations/postgresql".to_string()
}

fn default_document_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_document_database() -> String {
    "dualmig".to_string()
}

fn default_history_collection() -> String {
    "migration_history".to_string()
}

fn default_document_migrations_path() -> String {
    "migrations/mongodb".to_string()
}

fn default_control_table() -> String {
    "migration_execution_history".to_string()
}

fn default_reports_dir() -> String {
    "logs/migration-reports".to_string()
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory.
    ///
    /// Looks for dualmig.yml or dualmig.yaml; when neither exists the
    /// built-in defaults are used.
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        match CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
        {
            Some(path) => Self::load(&path),
            None => {
                log::debug!(
                    "No {} in {}, using defaults",
                    CONFIG_FILE_NAMES[0],
                    dir.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Resolve the environment name: CLI flag > `DM_ENVIRONMENT` > `local`.
    pub fn resolve_environment(cli_environment: Option<&str>) -> String {
        cli_environment
            .map(String::from)
            .or_else(|| std::env::var(ENVIRONMENT_VAR).ok())
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    /// Names of the configured environments, sorted.
    pub fn available_environments(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.environments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Apply the named environment's overlay and the process environment
    /// variables, then validate.
    ///
    /// An environment with no overlay only labels the run.
    pub fn resolve(self, environment: &str) -> CoreResult<Self> {
        self.resolve_with(environment, |key| std::env::var(key).ok())
    }

    /// [`Config::resolve`] with an explicit variable lookup.
    pub fn resolve_with<F>(mut self, environment: &str, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(overlay) = self.environments.get(environment).cloned() {
            log::debug!("Applying overrides for environment '{}'", environment);
            self.apply_overlay(overlay);
        } else if !self.environments.is_empty() {
            log::warn!(
                "No overrides for environment '{}' (configured: {})",
                environment,
                self.available_environments().join(", ")
            );
        }
        self.apply_env_overrides(lookup)?;
        self.validate()?;
        Ok(self)
    }

    fn apply_overlay(&mut self, overlay: EnvironmentConfig) {
        if let Some(r) = overlay.relational {
            let rel = &mut self.relational;
            rel.backend = r.backend.unwrap_or(rel.backend);
            if let Some(url) = r.url {
                rel.url = url;
            }
            if r.username.is_some() {
                rel.username = r.username;
            }
            if r.password.is_some() {
                rel.password = r.password;
            }
            if let Some(schema) = r.schema {
                rel.schema = schema;
            }
        }
        if let Some(d) = overlay.document {
            let doc = &mut self.document;
            doc.enabled = d.enabled.unwrap_or(doc.enabled);
            if let Some(url) = d.url {
                doc.url = url;
            }
            if let Some(database) = d.database {
                doc.database = database;
            }
        }
    }

    fn apply_env_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("POSTGRES_URL") {
            self.relational.url = v;
        }
        if let Some(v) = lookup("POSTGRES_USERNAME") {
            self.relational.username = Some(v);
        }
        if let Some(v) = lookup("POSTGRES_PASSWORD") {
            self.relational.password = Some(v);
        }
        if let Some(v) = lookup("POSTGRES_SCHEMA") {
            self.relational.schema = v;
        }
        if let Some(v) = lookup("MONGODB_URL") {
            self.document.url = v;
        }
        if let Some(v) = lookup("MONGODB_DATABASE") {
            self.document.database = v;
        }
        if let Some(v) = lookup("MIGRATION_CONTROL_ENABLED") {
            self.control.enabled = parse_flag("MIGRATION_CONTROL_ENABLED", &v)?;
        }
        if let Some(v) = lookup("MIGRATION_CONTROL_TABLE") {
            self.control.table_name = v;
        }
        if let Some(v) = lookup("MIGRATION_GENERATE_REPORT") {
            self.execution.generate_report = parse_flag("MIGRATION_GENERATE_REPORT", &v)?;
        }
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        for (what, name) in [
            ("relational.schema", &self.relational.schema),
            ("relational.history_table", &self.relational.history_table),
            ("control.table_name", &self.control.table_name),
            ("document.history_collection", &self.document.history_collection),
        ] {
            if !is_identifier(name) {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "{} '{}' must be a plain identifier (letters, digits, underscore)",
                        what, name
                    ),
                });
            }
        }

        if self.relational.url.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "relational.url cannot be empty".to_string(),
            });
        }

        if self.document.enabled && self.document.database.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "document.database cannot be empty when the document engine is enabled"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Relational URL in the form the driver accepts.
    ///
    /// `jdbc:postgresql://host:port/db` is reduced to
    /// `postgresql://host:port/db`.
    pub fn relational_connection_url(&self) -> String {
        normalize_jdbc_url(&self.relational.url)
    }

    pub fn sql_migrations_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.relational.migrations_path)
    }

    pub fn document_migrations_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.document.migrations_path)
    }

    pub fn reports_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.execution.reports_dir)
    }

    pub fn logs_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.execution.logs_dir)
    }
}

/// Strip a leading `jdbc:` from a connection URL.
pub fn normalize_jdbc_url(url: &str) -> String {
    url.trim()
        .strip_prefix("jdbc:")
        .unwrap_or(url.trim())
        .to_string()
}

/// `true` if `name` is a plain SQL identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_flag(var: &str, value: &str) -> CoreResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CoreError::ConfigInvalid {
            message: format!("{} must be true or false, got '{}'", var, other),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

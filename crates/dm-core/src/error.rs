//! Error types for dm-core

use thiserror::Error;

/// Core error type for Dualmig
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// C003: Invalid configuration value
    #[error("[C003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C004: Migration file could not be parsed into a descriptor
    #[error("[C004] Invalid migration file {path}: {reason}")]
    InvalidMigration { path: String, reason: String },

    /// C005: Migration file is missing a required field
    #[error("[C005] Migration file {path} is missing required field '{field}'")]
    MissingField { path: String, field: String },

    /// C006: IO error
    #[error("[C006] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// C007: IO error with file path context
    #[error("[C007] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// C008: YAML parse error
    #[error("[C008] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

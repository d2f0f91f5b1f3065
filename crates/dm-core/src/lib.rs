//! dm-core - Core library for Dualmig
//!
//! This crate provides the store-independent parts of the migration runner:
//! version ordering, checksums, migration discovery, pending-migration
//! planning, drift validation, history record types, and configuration.

pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod identity;
pub mod planner;
pub mod record;
pub mod scanner;
pub mod serde_helpers;
pub mod validator;
pub mod version;

pub use checksum::{flyway_crc32, md5_hex, Checksum};
pub use config::{Config, RelationalBackend};
pub use descriptor::{MigrationDescriptor, MigrationKind, SqlMigration, SqlScript};
pub use document::{DocumentMigration, DocumentOperation, JsonObject};
pub use error::{CoreError, CoreResult};
pub use planner::{info, plan, InfoReport, MigrationInfo};
pub use record::{
    AppliedMigrationRecord, ExecutionRecord, ExecutionStatus, MigrationResult, MigrationState,
};
pub use scanner::{DocumentScanner, MigrationScanner, Scan, SkippedFile, SqlScanner};
pub use validator::{validate, ChecksumMismatch, ValidationReport};
pub use version::MigrationVersion;

/// Descriptor of a document migration.
pub type DocumentMigrationDescriptor = MigrationDescriptor<DocumentMigration>;

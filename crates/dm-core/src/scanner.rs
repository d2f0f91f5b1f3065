//! Migration source discovery.
//!
//! Scanners read one flat directory and turn each migration file into an
//! immutable, checksummed [`MigrationDescriptor`]. Discovery never fails as a
//! whole: a missing directory yields an empty set and a bad file is skipped
//! and reported in [`Scan::skipped`].

use crate::checksum::Checksum;
use crate::descriptor::{MigrationDescriptor, MigrationKind, SqlScript};
use crate::document::DocumentMigration;
use crate::error::{CoreError, CoreResult};
use crate::validator::{duplicate_versions, DuplicateVersion};
use crate::version::MigrationVersion;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A migration file that was looked at and left out of discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

/// Outcome of one directory scan.
#[derive(Debug, Clone)]
pub struct Scan<P> {
    /// Descriptors in version-ascending order
    pub descriptors: Vec<MigrationDescriptor<P>>,
    /// Files that were skipped, with the reason
    pub skipped: Vec<SkippedFile>,
}

impl<P> Default for Scan<P> {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<P> Scan<P> {
    /// Versions claimed by more than one file.
    pub fn duplicate_versions(&self) -> Vec<DuplicateVersion> {
        duplicate_versions(&self.descriptors)
    }
}

/// A source of migration descriptors for one engine.
pub trait MigrationScanner: Send + Sync {
    /// Parsed payload carried by each descriptor
    type Payload: Send + Sync;

    /// Engine the scanned migrations belong to
    fn kind(&self) -> MigrationKind;

    /// Directory being scanned
    fn dir(&self) -> &Path;

    /// Discover every migration in [`Self::dir`].
    fn scan(&self) -> Scan<Self::Payload>;
}

/// `V<version>__<description>` without the extension.
fn sql_stem_pattern() -> &'static Regex {
    static SQL_STEM_RE: OnceLock<Regex> = OnceLock::new();
    SQL_STEM_RE.get_or_init(|| Regex::new(r"^V(\d+(?:\.\d+)*)__(.+)$").expect("valid regex"))
}

/// Scanner for `V<version>__<description>.sql` scripts.
#[derive(Debug, Clone)]
pub struct SqlScanner {
    dir: PathBuf,
    extension: String,
}

impl SqlScanner {
    /// Scanner for `.sql` files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_extension(dir, "sql")
    }

    /// Scanner for files with a custom extension.
    pub fn with_extension(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Split a file name into `(version, description)`, or `None` if the
    /// name does not follow the naming convention.
    pub fn parse_file_name(&self, file_name: &str) -> Option<(MigrationVersion, String)> {
        let stem = file_name.strip_suffix(self.extension.as_str())?.strip_suffix('.')?;
        let caps = sql_stem_pattern().captures(stem)?;
        let version = MigrationVersion::parse(&caps[1]);
        let description = caps[2].replace('_', " ");
        Some((version, description))
    }
}

impl MigrationScanner for SqlScanner {
    type Payload = SqlScript;

    fn kind(&self) -> MigrationKind {
        MigrationKind::Sql
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn scan(&self) -> Scan<SqlScript> {
        let mut scan = Scan::default();
        for path in list_files(&self.dir) {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((version, description)) = self.parse_file_name(file_name) else {
                log::debug!("Ignoring {} (not a versioned migration)", file_name);
                if path.extension().is_some_and(|e| e == self.extension.as_str()) {
                    scan.skipped.push(SkippedFile {
                        file: file_name.to_string(),
                        reason: format!(
                            "name does not match V<version>__<description>.{}",
                            self.extension
                        ),
                    });
                }
                continue;
            };
            let sql = match std::fs::read_to_string(&path) {
                Ok(sql) => sql,
                Err(e) => {
                    log::error!("Cannot read migration {}: {}", path.display(), e);
                    scan.skipped.push(SkippedFile {
                        file: file_name.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let checksum = Checksum::for_sql(&sql);
            scan.descriptors.push(MigrationDescriptor::new(
                version,
                description,
                file_name,
                path.clone(),
                checksum,
                SqlScript { sql },
            ));
        }
        sort_descriptors(&mut scan.descriptors);
        log::info!(
            "Discovered {} SQL migration(s) in {}",
            scan.descriptors.len(),
            self.dir.display()
        );
        scan
    }
}

/// Scanner for `*.json` document migrations.
#[derive(Debug, Clone)]
pub struct DocumentScanner {
    dir: PathBuf,
}

impl DocumentScanner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load(path: &Path, file_name: &str) -> CoreResult<MigrationDescriptor<DocumentMigration>> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let migration = DocumentMigration::parse(&content, path)?;
        Ok(MigrationDescriptor::new(
            MigrationVersion::parse(migration.version.trim()),
            migration.description.clone(),
            file_name,
            path,
            Checksum::for_document(&content),
            migration,
        ))
    }
}

impl MigrationScanner for DocumentScanner {
    type Payload = DocumentMigration;

    fn kind(&self) -> MigrationKind {
        MigrationKind::NoSql
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn scan(&self) -> Scan<DocumentMigration> {
        let mut scan = Scan::default();
        for path in list_files(&self.dir) {
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match Self::load(&path, file_name) {
                Ok(descriptor) => scan.descriptors.push(descriptor),
                Err(e) => {
                    match &e {
                        CoreError::MissingField { .. } => {
                            log::warn!("Skipping {}: {}", file_name, e)
                        }
                        _ => log::error!("Skipping {}: {}", file_name, e),
                    }
                    scan.skipped.push(SkippedFile {
                        file: file_name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        sort_descriptors(&mut scan.descriptors);
        log::info!(
            "Discovered {} document migration(s) in {}",
            scan.descriptors.len(),
            self.dir.display()
        );
        scan
    }
}

/// Regular files directly inside `dir`. Missing or unreadable directories
/// produce an empty list and a log line.
fn list_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("Migrations directory not found: {}", dir.display());
            return Vec::new();
        }
        Err(e) => {
            log::error!("Cannot read migrations directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                log::warn!("Cannot read entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

/// Version ascending; ties (malformed or duplicate versions) by file name.
fn sort_descriptors<P>(descriptors: &mut [MigrationDescriptor<P>]) {
    for d in descriptors.iter().filter(|d| d.version().is_malformed()) {
        log::warn!(
            "{} has malformed version '{}'; it sorts before every other version",
            d.source_identifier(),
            d.version()
        );
    }
    descriptors.sort_by(|a, b| {
        a.version()
            .key()
            .cmp(b.version().key())
            .then_with(|| a.source_identifier().cmp(b.source_identifier()))
    });
}

#[cfg(test)]
#[path = "scanner_test.rs"]
mod tests;

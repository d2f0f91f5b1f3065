use super::*;
use std::fs;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn versions<P>(scan: &Scan<P>) -> Vec<String> {
    scan.descriptors
        .iter()
        .map(|d| d.version().to_string())
        .collect()
}

#[test]
fn test_sql_file_name_parsing() {
    let scanner = SqlScanner::new("unused");
    let (v, d) = scanner.parse_file_name("V1.2__add_user_table.sql").unwrap();
    assert_eq!(v, "1.2");
    assert_eq!(d, "add user table");

    assert!(scanner.parse_file_name("V1__.sql").is_none());
    assert!(scanner.parse_file_name("V1_missing_separator.sql").is_none());
    assert!(scanner.parse_file_name("v1__lowercase.sql").is_none());
    assert!(scanner.parse_file_name("V1.__trailing_dot.sql").is_none());
    assert!(scanner.parse_file_name("V1__wrong_ext.txt").is_none());
    assert!(scanner.parse_file_name("R__repeatable.sql").is_none());
}

#[test]
fn test_custom_extension() {
    let scanner = SqlScanner::with_extension("unused", ".psql");
    assert!(scanner.parse_file_name("V3__x.psql").is_some());
    assert!(scanner.parse_file_name("V3__x.sql").is_none());
}

#[test]
fn test_sql_scan_orders_numerically() {
    let tmp = TempDir::new().unwrap();
    for v in ["2.0", "1.10", "1.2.1", "1.2"] {
        write(tmp.path(), &format!("V{}__m.sql", v), "SELECT 1;");
    }
    write(tmp.path(), "README.md", "not a migration");
    write(tmp.path(), "notes.sql", "-- not versioned");

    let scan = SqlScanner::new(tmp.path()).scan();
    assert_eq!(versions(&scan), vec!["1.2", "1.2.1", "1.10", "2.0"]);
    // Only files with the migration extension are reported
    assert_eq!(scan.skipped.len(), 1);
    assert_eq!(scan.skipped[0].file, "notes.sql");
    assert!(scan.skipped[0].reason.contains("V<version>__<description>.sql"));
}

#[test]
fn test_sql_checksum_uses_original_content() {
    let tmp = TempDir::new().unwrap();
    let sql = "CREATE TABLE t (id INT);\r\n";
    write(tmp.path(), "V1__create_t.sql", sql);

    let scan = SqlScanner::new(tmp.path()).scan();
    let d = &scan.descriptors[0];
    assert_eq!(d.checksum(), &Checksum::for_sql(sql));
    assert_eq!(d.payload().sql, sql);
    assert_eq!(d.source_identifier(), "V1__create_t.sql");
    assert_eq!(d.description(), "create t");
}

#[test]
fn test_rescan_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "V1__a.sql", "SELECT 1;");
    write(tmp.path(), "V2__b.sql", "SELECT 2;");

    let scanner = SqlScanner::new(tmp.path());
    let first = scanner.scan();
    let second = scanner.scan();
    let sums = |s: &Scan<SqlScript>| -> Vec<String> {
        s.descriptors.iter().map(|d| d.checksum().as_stored()).collect()
    };
    assert_eq!(sums(&first), sums(&second));
}

#[test]
fn test_missing_directory_is_empty() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");
    assert!(SqlScanner::new(&missing).scan().descriptors.is_empty());
    assert!(DocumentScanner::new(&missing).scan().descriptors.is_empty());
}

#[test]
fn test_document_scan_skips_bad_files() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "V1_1__events.json",
        r#"{"version": "1.1", "description": "Events", "collections": [{"name": "events"}]}"#,
    );
    write(
        tmp.path(),
        "V1_0__init.json",
        r#"{"version": "1.0", "description": "Init"}"#,
    );
    write(tmp.path(), "broken.json", "{oops");
    write(tmp.path(), "no_version.json", r#"{"description": "x"}"#);
    write(tmp.path(), "ignored.txt", "whatever");

    let scan = DocumentScanner::new(tmp.path()).scan();
    assert_eq!(versions(&scan), vec!["1.0", "1.1"]);
    assert_eq!(scan.descriptors[1].description(), "Events");

    let mut skipped: Vec<&str> = scan.skipped.iter().map(|s| s.file.as_str()).collect();
    skipped.sort();
    assert_eq!(skipped, vec!["broken.json", "no_version.json"]);
}

#[test]
fn test_document_checksum_is_md5_of_raw_content() {
    let tmp = TempDir::new().unwrap();
    let content = r#"{"version": "1", "description": "d"}"#;
    write(tmp.path(), "m.json", content);

    let scan = DocumentScanner::new(tmp.path()).scan();
    assert_eq!(
        scan.descriptors[0].checksum(),
        &Checksum::Md5(crate::checksum::md5_hex(content))
    );
}

#[test]
fn test_malformed_version_sorts_first() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.json", r#"{"version": "2", "description": "two"}"#);
    write(tmp.path(), "b.json", r#"{"version": "next", "description": "bad"}"#);

    let scan = DocumentScanner::new(tmp.path()).scan();
    assert_eq!(versions(&scan), vec!["next", "2"]);
    assert!(scan.descriptors[0].version().is_malformed());
}

#[test]
fn test_duplicate_versions_are_kept_and_reported() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "V1__first.sql", "SELECT 1;");
    write(tmp.path(), "V1__second.sql", "SELECT 2;");
    write(tmp.path(), "V2__other.sql", "SELECT 3;");

    let scan = SqlScanner::new(tmp.path()).scan();
    assert_eq!(scan.descriptors.len(), 3);
    let dups = scan.duplicate_versions();
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].version, "1");
    assert_eq!(dups[0].files, vec!["V1__first.sql", "V1__second.sql"]);
}

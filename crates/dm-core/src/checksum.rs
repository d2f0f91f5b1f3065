//! Content checksums for drift detection.
//!
//! The relational engine uses the Flyway-compatible signed CRC-32 so that
//! history tables shared with an existing Flyway deployment validate
//! bit-for-bit. The document engine has no such constraint and uses MD5.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalize `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Compute the Flyway-compatible checksum of a SQL script.
///
/// CRC-32 (IEEE polynomial) over the UTF-8 bytes of the line-ending
/// normalized content, reinterpreted as a signed 32-bit integer.
pub fn flyway_crc32(content: &str) -> i32 {
    let normalized = normalize_line_endings(content);
    crc32fast::hash(normalized.as_bytes()) as i32
}

/// Compute the lowercase MD5 hex digest of raw content.
pub fn md5_hex(content: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A checksum as produced by one of the engines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "value", rename_all = "lowercase")]
pub enum Checksum {
    /// Signed CRC-32 (relational engine)
    Crc32(i32),
    /// MD5 hex digest (document engine)
    Md5(String),
}

impl Checksum {
    /// Checksum of a SQL script.
    pub fn for_sql(content: &str) -> Self {
        Checksum::Crc32(flyway_crc32(content))
    }

    /// Checksum of a document migration file.
    pub fn for_document(content: &str) -> Self {
        Checksum::Md5(md5_hex(content))
    }

    /// The representation stored in history and used for comparison.
    ///
    /// CRC-32 values are stored as decimal integers, so they compare as
    /// their decimal string.
    pub fn as_stored(&self) -> String {
        match self {
            Checksum::Crc32(value) => value.to_string(),
            Checksum::Md5(hex) => hex.clone(),
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_stored())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_values() {
        assert_eq!(flyway_crc32("hello world"), 0x0d4a_1185);
        // 0xCBF43926 reinterpreted as signed
        assert_eq!(flyway_crc32("123456789"), -873_187_034);
    }

    #[test]
    fn test_crc32_line_ending_normalization() {
        let unix = "CREATE TABLE a (id INT);\nINSERT INTO a VALUES (1);\n";
        let windows = "CREATE TABLE a (id INT);\r\nINSERT INTO a VALUES (1);\r\n";
        let classic_mac = "CREATE TABLE a (id INT);\rINSERT INTO a VALUES (1);\r";
        assert_eq!(flyway_crc32(unix), flyway_crc32(windows));
        assert_eq!(flyway_crc32(unix), flyway_crc32(classic_mac));
    }

    #[test]
    fn test_crc32_deterministic() {
        let sql = "SELECT 1;";
        assert_eq!(flyway_crc32(sql), flyway_crc32(sql));
        assert_ne!(flyway_crc32(sql), flyway_crc32("SELECT 2;"));
    }

    #[test]
    fn test_md5_known_values() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_stored_representation() {
        assert_eq!(Checksum::for_sql("123456789").as_stored(), "-873187034");
        assert_eq!(
            Checksum::for_document("hello world").as_stored(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(Checksum::for_sql("x"), Checksum::Crc32(flyway_crc32("x")));
    }
}

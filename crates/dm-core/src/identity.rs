//! Who is running the migration, for audit columns.

use uuid::Uuid;

/// Fallback used when neither user nor host can be determined.
pub const UNKNOWN_USER: &str = "system";

/// Current OS user name (`USER`, then `USERNAME`).
pub fn current_user() -> Option<String> {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
}

/// Host name (`HOSTNAME`, then `/etc/hostname`).
pub fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// `user@host`, or just the part that is known, or [`UNKNOWN_USER`].
pub fn executed_by() -> String {
    match (current_user(), hostname()) {
        (Some(user), Some(host)) => format!("{}@{}", user, host),
        (Some(user), None) => user,
        (None, Some(host)) => host,
        (None, None) => UNKNOWN_USER.to_string(),
    }
}

/// Value for the `installed_by` history column.
pub fn installed_by(configured_username: Option<&str>) -> String {
    configured_username
        .filter(|u| !u.trim().is_empty())
        .map(String::from)
        .or_else(current_user)
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

/// A fresh execution identifier (UUID v4).
pub fn new_execution_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installed_by_prefers_configured_user() {
        assert_eq!(installed_by(Some("flyway")), "flyway");
        assert!(!installed_by(Some("  ")).trim().is_empty());
    }

    #[test]
    fn test_executed_by_is_never_empty() {
        assert!(!executed_by().is_empty());
    }

    #[test]
    fn test_execution_ids_are_unique_uuids() {
        let a = new_execution_id();
        let b = new_execution_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}

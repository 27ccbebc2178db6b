//! Utility functions and helpers.

pub mod fs;

/// Host identity used as the default worker id.
pub fn host_identity() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown-worker".to_string())
}

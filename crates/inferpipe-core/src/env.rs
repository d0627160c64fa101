//! Environment variable helpers for configuration overrides
//!
//! All inferpipe variables share the `INFERPIPE_` prefix. Values that fail
//! to parse fall back to the default rather than erroring; configuration
//! validation happens later on the assembled config.
//!
//! ```ignore
//! use inferpipe_core::env::{env_get, env_get_opt};
//!
//! let slots: usize = env_get("INFERPIPE_MAX_CONCURRENCY", 4);
//! let output: Option<String> = env_get_opt("INFERPIPE_OUTPUT");
//! ```

use std::str::FromStr;

/// Prefix shared by every variable read through this module
pub const PREFIX: &str = "INFERPIPE_";

/// Parse `key` as `T`, or return `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T` when set and valid.
///
/// Surrounding whitespace is ignored and empty values count as unset.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Build a full variable name from a suffix, e.g. `key("OUTPUT")`.
pub fn key(suffix: &str) -> String {
    format!("{PREFIX}{suffix}")
}

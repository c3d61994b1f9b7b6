//! Environment variable helpers
//!
//! Typed lookups used by `EngineConfig::from_env()`.
//!
//! # Usage
//!
//! ```ignore
//! use ktrace_core::env::{env_get, env_get_opt};
//!
//! let ring_size: usize = env_get("KTRACE_RING_BUF_SIZE", 8 * 1024 * 1024);
//! let rings: Option<usize> = env_get_opt("KTRACE_NUM_RINGS");
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T`. `None` when unset or unparsable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse `key` as `T` and surface the parse error.
///
/// `Ok(None)` when unset. Used where a bad value must be reported instead
/// of silently replaced by a default (e.g. an unknown admission policy).
pub fn env_try_get<T>(key: &str) -> Result<Option<T>, T::Err>
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map(Some),
        Err(_) => Ok(None),
    }
}

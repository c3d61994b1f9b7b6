//! Engine configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use ktrace_module::config::{AdmissionPolicy, EngineConfig};
//!
//! let config = EngineConfig::from_env()?
//!     .ring_size(1 << 20)
//!     .admission(AdmissionPolicy::FirstOpen);
//! ```

pub mod defaults;

use core::fmt;
use std::str::FromStr;

use ktrace_core::constants::MAX_RINGS;
use ktrace_core::env::{env_get, env_try_get};
use ktrace_core::ring::validate_ring_size;
use ktrace_core::ConfigError;

/// When the engine installs its hooks.
///
/// Both policies remove the hooks when the last ring closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Install once every ring is open.
    #[default]
    AllRings,
    /// Install when the first ring opens.
    FirstOpen,
}

impl AdmissionPolicy {
    /// Whether reaching `open_count` open rings (out of `n_rings`) must
    /// install the hooks.
    #[inline]
    pub fn should_register(self, open_count: usize, n_rings: usize) -> bool {
        match self {
            AdmissionPolicy::AllRings => open_count == n_rings,
            AdmissionPolicy::FirstOpen => open_count == 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AdmissionPolicy::AllRings => "all-rings",
            AdmissionPolicy::FirstOpen => "first-open",
        }
    }
}

impl FromStr for AdmissionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all-rings" | "all" => Ok(AdmissionPolicy::AllRings),
            "first-open" | "first" => Ok(AdmissionPolicy::FirstOpen),
            _ => Err(ConfigError::UnknownAdmission(s.to_string())),
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bytes of ring per CPU. At least two pages, a page multiple.
    pub ring_size: usize,
    /// Number of per-CPU rings.
    pub num_rings: usize,
    pub admission: AdmissionPolicy,
    /// Bytes snapshotted from data buffers.
    pub snaplen: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Library defaults, no environment lookups.
    pub fn new() -> Self {
        Self {
            ring_size: defaults::RING_BUF_SIZE,
            num_rings: defaults::num_rings(),
            admission: defaults::ADMISSION,
            snaplen: defaults::SNAPLEN,
        }
    }

    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `KTRACE_RING_BUF_SIZE` - bytes per ring
    /// - `KTRACE_NUM_RINGS` - number of rings
    /// - `KTRACE_ADMISSION` - `all-rings` or `first-open`
    /// - `KTRACE_SNAPLEN` - data snapshot length
    ///
    /// Unparsable numbers fall back to the default. An unknown admission
    /// policy is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ring_size: env_get("KTRACE_RING_BUF_SIZE", defaults::RING_BUF_SIZE),
            num_rings: env_get("KTRACE_NUM_RINGS", defaults::num_rings()),
            admission: env_try_get::<AdmissionPolicy>("KTRACE_ADMISSION")?.unwrap_or(defaults::ADMISSION),
            snaplen: env_get("KTRACE_SNAPLEN", defaults::SNAPLEN),
        })
    }

    pub fn ring_size(mut self, bytes: usize) -> Self {
        self.ring_size = bytes;
        self
    }

    pub fn num_rings(mut self, n: usize) -> Self {
        self.num_rings = n;
        self
    }

    pub fn admission(mut self, policy: AdmissionPolicy) -> Self {
        self.admission = policy;
        self
    }

    pub fn snaplen(mut self, bytes: usize) -> Self {
        self.snaplen = bytes;
        self
    }

    pub fn validate(&self, page_size: usize) -> Result<(), ConfigError> {
        validate_ring_size(self.ring_size, page_size)?;
        if self.num_rings == 0 {
            return Err(ConfigError::NoRings);
        }
        if self.num_rings > MAX_RINGS {
            return Err(ConfigError::TooManyRings {
                requested: self.num_rings,
                max: MAX_RINGS,
            });
        }
        Ok(())
    }
}

//! Configuration errors.
//!
//! These are fatal at engine initialization: no partial engine is left
//! behind when one is returned.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("ring buffer size too small ({size} bytes, must be at least {min} bytes)")]
    RingTooSmall { size: usize, min: usize },

    #[error("ring buffer size {size} is not a multiple of the page size {page_size}")]
    NotPageMultiple { size: usize, page_size: usize },

    #[error("ring buffer size {size} does not fit 32-bit ring offsets")]
    TooLarge { size: usize },

    #[error("at least one ring is required")]
    NoRings,

    #[error("{requested} rings requested, but the table holds at most {max}")]
    TooManyRings { requested: usize, max: usize },

    #[error("unknown admission policy {0:?} (expected \"all-rings\" or \"first-open\")")]
    UnknownAdmission(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

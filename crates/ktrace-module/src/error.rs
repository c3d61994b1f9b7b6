//! Engine error types.

use ktrace_core::{ConfigError, HookError, HookKind};
use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by the control and mapping surfaces of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("shared memory allocation failed: {0}")]
    Alloc(Errno),

    #[error("ring {ring} does not exist (engine has {n_rings} rings)")]
    InvalidRing { ring: usize, n_rings: usize },

    #[error("ring {0} is already open")]
    AlreadyOpen(usize),

    #[error("ring {0} is not open")]
    NotOpen(usize),

    #[error("registering hook {kind} failed: {source}")]
    Hook {
        kind: HookKind,
        #[source]
        source: HookError,
    },

    #[error("unsupported control request {0:#x}")]
    UnsupportedControl(u64),

    #[error(transparent)]
    Map(#[from] MapError),
}

/// A mapping request was refused. Engine state is never changed by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("invalid page offset {0}, must be 0")]
    InvalidOffset(u64),

    #[error("invalid mapping length {length} (control block is {page} bytes, buffer view is {view} bytes)")]
    InvalidLength { length: usize, page: usize, view: usize },

    #[error("the ring buffer view can only be mapped read-only")]
    WritableBuffer,

    #[error("mmap failed: {0}")]
    Mmap(Errno),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A record in a mapped ring failed validation on the consumer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("{used} committed bytes cannot hold an event header")]
    Truncated { used: u32 },

    #[error("record length {len} is invalid ({used} bytes committed, at least {min} required)")]
    BadLength { len: u32, used: u32, min: u32 },

    #[error("unknown event type {0}")]
    UnknownEvent(u16),

    #[error("consume of {len} bytes exceeds the {used} committed")]
    Overrun { len: u32, used: u32 },
}

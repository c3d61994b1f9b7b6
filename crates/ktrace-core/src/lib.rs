//! # ktrace-core: Type and trait definitions for ktrace
//!
//! This crate defines the vocabulary shared by the capture engine and the
//! consumers of its rings: capture states, the binary event record layout,
//! the event schema types, the filler contract, and the trait seams to the
//! interception subsystem (`HookRegistry`) and to the executing task
//! (`TaskContext`).
//!
//! ## Design principle
//!
//! > "The engine owns the rings. Everything that decides *when* to record
//! >  or *what* goes into a record sits behind a trait or a static table."
//!
//! Default implementations of every seam live in `ktrace-module`.

pub mod state;
pub mod event;
pub mod ring;
pub mod schema;
pub mod filler;
pub mod task;
pub mod hook;
pub mod error;
pub mod env;

pub use env::{env_get, env_get_opt, env_try_get};
pub use error::ConfigError;
pub use event::{EventHeader, EventType, HEADER_SIZE};
pub use filler::{CallContext, FillError, Filler, FillerArgs, PacketInfo, Regs};
pub use hook::{HookError, HookKind, HookRegistry};
pub use schema::{AutoArg, EventInfo, FillStrategy, ParamInfo, ParamType, SyscallEvtPair};
pub use state::CaptureState;
pub use task::{Fault, TaskContext, UserMemory};

/// Layout constants shared by the engine and its consumers.
pub mod constants {
    /// Number of entries in the syscall → event table.
    pub const SYSCALL_TABLE_SIZE: usize = 512;

    /// Default number of bytes snapshotted from read/write style buffers.
    pub const RW_SNAPLEN: usize = 80;

    /// Number of pages appended to each ring as write-through cushion.
    /// Also bounds the filler scratch window.
    pub const CUSHION_PAGES: usize = 2;

    /// Upper bound on the number of rings one engine manages.
    pub const MAX_RINGS: usize = 1024;
}

//! # ktrace-module: Default implementations
//!
//! This crate owns the per-CPU rings and provides the default
//! implementation for every ktrace-core seam.
//!
//! ## Default stack
//!
//! | Seam / surface  | Default Impl        | Notes                              |
//! |-----------------|---------------------|------------------------------------|
//! | HookRegistry    | HookTable           | in-process flags, no real hooks    |
//! | TaskContext     | CurrentThread       | sched_getcpu + process_vm_readv    |
//! | Filler          | fillers::*          | selected by `EVENT_TABLE` lookup   |
//! | Shared memory   | SharedMem / Mapping | memfd, doubled read-only view      |
//! | Consumer        | RingReader          | control page + buffer view         |
//!
//! ## Layout
//!
//! - `engine`: ring table, hook lifecycle, builder
//! - `capture`: open / close / pause / resume / control codes
//! - `recorder`: the hot path
//! - `probes`: hook callbacks feeding the recorder
//! - `mapping`: control page and buffer view for consumers
//! - `reader`: consumer-side record parsing

pub mod config;
pub mod error;
pub mod shm;
pub mod ring;
pub mod hooks;
pub mod syscall_table;
pub mod socketcall;
pub mod fillers;
pub mod event_table;
pub mod engine;
pub mod capture;
pub mod recorder;
pub mod probes;
pub mod mapping;
pub mod task;
pub mod reader;

#[cfg(test)]
pub mod testing;

pub use capture::{DISABLE_CAPTURE, ENABLE_CAPTURE};
pub use config::{AdmissionPolicy, EngineConfig};
pub use engine::{DefaultEngine, Engine, EngineBuilder};
pub use error::{EngineError, MapError, ReadError, Result};
pub use event_table::{Schema, EVENT_TABLE};
pub use hooks::HookTable;
pub use mapping::{MapRequest, MappedRegion, RegionKind};
pub use reader::{merge_by_timestamp, EventView, RingReader};
pub use ring::{RingContext, RingInfo, RingStats};
pub use task::CurrentThread;

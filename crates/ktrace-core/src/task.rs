//! Execution context of a hook callback.
//!
//! A `TaskContext` describes "whoever is running right now" when a hook
//! fires: which CPU (and therefore which ring), which thread, what time it
//! is, and how to read that task's memory.
//!
//! # Implementors
//!
//! - `CurrentThread` (default, in ktrace-module): the calling OS thread.
//!   CPU from `sched_getcpu`, tid from `gettid`, time from
//!   `CLOCK_MONOTONIC`, user memory through `process_vm_readv` on the own
//!   process so bad pointers fault cleanly instead of crashing.
//!
//! - Test doubles: a fixed CPU and a sparse address → bytes map.

use thiserror::Error;

/// A user-memory access touched an unmapped or unreadable address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid user memory access at {addr:#x}")]
pub struct Fault {
    pub addr: u64,
}

/// Fault-tolerant reads of the traced task's memory.
///
/// **Contract:**
/// - Must NEVER block or allocate.
/// - On failure nothing useful may be assumed about `dst`.
pub trait UserMemory {
    /// Fill all of `dst` from `addr`.
    fn copy_from_user(&self, addr: u64, dst: &mut [u8]) -> Result<(), Fault>;

    /// Copy a NUL-terminated string starting at `addr` into `dst`.
    ///
    /// Returns the string length without the terminator. If no terminator
    /// is found within `dst.len()` bytes, returns `dst.len()` (truncated).
    fn strncpy_from_user(&self, addr: u64, dst: &mut [u8]) -> Result<usize, Fault>;
}

/// The task on whose behalf a hook fired.
pub trait TaskContext: UserMemory {
    /// CPU the callback runs on. Selects the ring.
    fn cpu(&self) -> usize;

    /// Thread id of the task.
    fn tid(&self) -> u64;

    /// Monotonic timestamp in nanoseconds.
    fn now_ns(&self) -> u64;

    /// 32-bit task running on a 64-bit kernel. Its events are skipped.
    fn is_compat(&self) -> bool {
        false
    }

    /// Kernel thread. Process-exit events for these are skipped.
    fn is_kernel_thread(&self) -> bool {
        false
    }
}

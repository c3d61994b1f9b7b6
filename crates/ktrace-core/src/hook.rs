//! Interception hook abstraction.
//!
//! The engine never intercepts anything itself. It asks a `HookRegistry`
//! to install its four callbacks while at least one consumer needs them,
//! and the interception layer calls back into the engine's probe methods
//! (`syscall_enter_probe`, `syscall_exit_probe`, `procexit_probe`,
//! `netif_rx_probe`) while a hook is installed.
//!
//! # Implementors
//!
//! - `HookTable` (default, in ktrace-module): an in-process table of
//!   installed hooks that a dispatcher consults before invoking a probe.
//!
//! - Tracepoint/kprobe backends (external): register the probe methods
//!   with the platform's tracing facility.

use core::fmt;

use thiserror::Error;

/// The four interception points the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HookKind {
    SyscallExit = 0,
    SyscallEnter = 1,
    ProcessExit = 2,
    NetifRx = 3,
}

impl HookKind {
    /// Registration order. Rollback and teardown walk it backwards.
    pub const ALL: [HookKind; 4] = [
        HookKind::SyscallExit,
        HookKind::SyscallEnter,
        HookKind::ProcessExit,
        HookKind::NetifRx,
    ];

    /// Tracepoint name of the hook.
    pub const fn name(self) -> &'static str {
        match self {
            HookKind::SyscallExit => "sys_exit",
            HookKind::SyscallEnter => "sys_enter",
            HookKind::ProcessExit => "sched_process_exit",
            HookKind::NetifRx => "netif_rx",
        }
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("hook {0} is already registered")]
    AlreadyRegistered(HookKind),

    #[error("hook {0} is not available on this system")]
    Unavailable(HookKind),

    #[error("hook registration failed: errno {0}")]
    Os(i32),
}

/// Installs and removes interception hooks.
///
/// **Contract:**
/// - `register()` reports failure synchronously; on error the hook is
///   not installed.
/// - `unregister()` is idempotent: removing a hook that is not installed
///   is a no-op.
pub trait HookRegistry: Send + Sync {
    fn register(&self, hook: HookKind) -> Result<(), HookError>;

    fn unregister(&self, hook: HookKind);
}

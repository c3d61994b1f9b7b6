//! `HookTable`: default `HookRegistry` implementation.
//!
//! An in-process table of installed hooks. Whatever intercepts calls (a
//! seccomp/ptrace supervisor, an LD_PRELOAD shim, a test harness) asks
//! `is_installed()` before invoking the matching probe on the engine.
//! Lookup is one relaxed atomic load.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ktrace_core::{HookError, HookKind, HookRegistry};

pub struct HookTable {
    installed: [AtomicBool; 4],
    /// Number of successful registrations over the table's lifetime.
    registrations: AtomicU64,
}

impl Default for HookTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HookTable {
    pub fn new() -> Self {
        Self {
            installed: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
            registrations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_installed(&self, hook: HookKind) -> bool {
        self.installed[hook.as_index()].load(Ordering::Relaxed)
    }

    /// Whether any hook is installed.
    pub fn any_installed(&self) -> bool {
        HookKind::ALL.iter().any(|h| self.is_installed(*h))
    }

    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }
}

impl HookRegistry for HookTable {
    fn register(&self, hook: HookKind) -> Result<(), HookError> {
        self.installed[hook.as_index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HookError::AlreadyRegistered(hook))?;
        self.registrations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn unregister(&self, hook: HookKind) {
        self.installed[hook.as_index()].store(false, Ordering::Release);
    }
}

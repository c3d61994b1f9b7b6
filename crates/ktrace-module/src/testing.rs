//! Test doubles for the engine's seams.

use std::cell::Cell;
use std::sync::Mutex;

use ktrace_core::{Fault, HookError, HookKind, HookRegistry, TaskContext, UserMemory};

/// A task with a fixed CPU and a sparse user address space.
///
/// `on_user_read` runs before every user-memory access, which is where a
/// nested callback (an interrupt on the same CPU) would hit in practice.
pub struct FakeTask<'a> {
    pub cpu: usize,
    pub tid: u64,
    pub compat: bool,
    pub kernel_thread: bool,
    clock: Cell<u64>,
    regions: Vec<(u64, Vec<u8>)>,
    on_user_read: Option<Box<dyn Fn() + 'a>>,
}

impl<'a> FakeTask<'a> {
    pub fn new(cpu: usize) -> Self {
        Self {
            cpu,
            tid: 1000 + cpu as u64,
            compat: false,
            kernel_thread: false,
            clock: Cell::new(1_000),
            regions: Vec::new(),
            on_user_read: None,
        }
    }

    pub fn with_region(mut self, addr: u64, bytes: &[u8]) -> Self {
        self.regions.push((addr, bytes.to_vec()));
        self
    }

    pub fn with_clock(self, ns: u64) -> Self {
        self.clock.set(ns);
        self
    }

    pub fn on_user_read(mut self, f: impl Fn() + 'a) -> Self {
        self.on_user_read = Some(Box::new(f));
        self
    }

    fn find(&self, addr: u64, len: usize) -> Result<&[u8], Fault> {
        if let Some(f) = &self.on_user_read {
            f();
        }
        for (base, bytes) in &self.regions {
            if addr >= *base && addr - base < bytes.len() as u64 {
                let off = (addr - base) as usize;
                let avail = &bytes[off..];
                if len <= avail.len() {
                    return Ok(avail);
                }
            }
        }
        Err(Fault { addr })
    }
}

impl UserMemory for FakeTask<'_> {
    fn copy_from_user(&self, addr: u64, dst: &mut [u8]) -> Result<(), Fault> {
        let src = self.find(addr, dst.len())?;
        dst.copy_from_slice(&src[..dst.len()]);
        Ok(())
    }

    fn strncpy_from_user(&self, addr: u64, dst: &mut [u8]) -> Result<usize, Fault> {
        let src = self.find(addr, 1)?;
        for (i, d) in dst.iter_mut().enumerate() {
            let b = *src.get(i).ok_or(Fault { addr: addr + i as u64 })?;
            if b == 0 {
                return Ok(i);
            }
            *d = b;
        }
        Ok(dst.len())
    }
}

impl TaskContext for FakeTask<'_> {
    fn cpu(&self) -> usize {
        self.cpu
    }

    fn tid(&self) -> u64 {
        self.tid
    }

    /// Advances by one microsecond per call.
    fn now_ns(&self) -> u64 {
        let now = self.clock.get();
        self.clock.set(now + 1_000);
        now
    }

    fn is_compat(&self) -> bool {
        self.compat
    }

    fn is_kernel_thread(&self) -> bool {
        self.kernel_thread
    }
}

/// A registry that logs every call and can refuse one hook kind.
#[derive(Default)]
pub struct RecordingHooks {
    fail_on: Option<HookKind>,
    log: Mutex<Vec<(bool, HookKind)>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(hook: HookKind) -> Self {
        Self {
            fail_on: Some(hook),
            ..Self::default()
        }
    }

    /// `(registered?, kind)` in call order.
    pub fn calls(&self) -> Vec<(bool, HookKind)> {
        self.log.lock().unwrap().clone()
    }

    pub fn registered(&self) -> usize {
        self.calls().iter().filter(|(reg, _)| *reg).count()
    }

    pub fn unregistered(&self) -> usize {
        self.calls().iter().filter(|(reg, _)| !*reg).count()
    }
}

impl HookRegistry for RecordingHooks {
    fn register(&self, hook: HookKind) -> Result<(), HookError> {
        if self.fail_on == Some(hook) {
            return Err(HookError::Unavailable(hook));
        }
        self.log.lock().unwrap().push((true, hook));
        Ok(())
    }

    fn unregister(&self, hook: HookKind) {
        self.log.lock().unwrap().push((false, hook));
    }
}

//! `CurrentThread`: the calling OS thread as a `TaskContext`.
//!
//! User-memory reads go through `process_vm_readv` on our own pid, so a
//! bad pointer comes back as `EFAULT` instead of a segfault.

use std::mem::MaybeUninit;

use ktrace_core::{Fault, TaskContext, UserMemory};

use crate::shm::page_size;

/// The thread the probe runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentThread {
    compat: bool,
}

impl CurrentThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this thread as a 32-bit compat task.
    pub fn compat(mut self, compat: bool) -> Self {
        self.compat = compat;
        self
    }
}

/// Copy `dst.len()` bytes from `addr` in our own address space.
/// Returns the number of bytes read, which may be short at a page boundary.
fn vm_read(addr: u64, dst: &mut [u8]) -> Result<usize, Fault> {
    if dst.is_empty() {
        return Ok(0);
    }
    let local = libc::iovec {
        iov_base: dst.as_mut_ptr() as *mut libc::c_void,
        iov_len: dst.len(),
    };
    let remote = libc::iovec {
        iov_base: addr as usize as *mut libc::c_void,
        iov_len: dst.len(),
    };
    let n = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
    if n <= 0 {
        return Err(Fault { addr });
    }
    Ok(n as usize)
}

impl UserMemory for CurrentThread {
    fn copy_from_user(&self, addr: u64, dst: &mut [u8]) -> Result<(), Fault> {
        let mut done = 0;
        while done < dst.len() {
            let at = addr + done as u64;
            done += vm_read(at, &mut dst[done..]).map_err(|_| Fault { addr: at })?;
        }
        Ok(())
    }

    fn strncpy_from_user(&self, addr: u64, dst: &mut [u8]) -> Result<usize, Fault> {
        let page = page_size();
        let mut done = 0;
        while done < dst.len() {
            let at = addr + done as u64;
            // The string may end just before an unmapped page.
            let to_page = page - (at as usize % page);
            let end = (done + to_page).min(dst.len());
            let n = vm_read(at, &mut dst[done..end])?;
            if let Some(nul) = dst[done..done + n].iter().position(|&b| b == 0) {
                return Ok(done + nul);
            }
            done += n;
        }
        Ok(dst.len())
    }
}

impl TaskContext for CurrentThread {
    fn cpu(&self) -> usize {
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            0
        } else {
            cpu as usize
        }
    }

    fn tid(&self) -> u64 {
        unsafe { libc::syscall(libc::SYS_gettid) as u64 }
    }

    fn now_ns(&self) -> u64 {
        let mut ts = MaybeUninit::<libc::timespec>::uninit();
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, ts.as_mut_ptr()) };
        if rc != 0 {
            return 0;
        }
        let ts = unsafe { ts.assume_init() };
        ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
    }

    fn is_compat(&self) -> bool {
        self.compat
    }
}

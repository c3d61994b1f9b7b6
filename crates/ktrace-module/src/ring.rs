//! `RingContext`: one per-CPU ring and its control block.
//!
//! # Memory layout
//!
//! ```text
//! control memfd (1 page):   RingInfo { head, tail, n_evts, n_drops_buffer,
//!                                      n_drops_pf, n_preemptions }
//! buffer memfd:             [0 .. capacity)  ring bytes
//!                           [capacity .. +2 pages)  cushion
//! ```
//!
//! head and tail are byte offsets in `[0, capacity)`. The producer owns
//! head and the counters; the consumer owns tail. The cushion lets the
//! producer write a record past the logical end without wrap checks; the
//! spill is folded back to offset 0 before head is published.

use std::cell::UnsafeCell;
use std::ffi::CString;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use ktrace_core::ring::{free_space, storage_size, used_space};
use ktrace_core::CaptureState;
use nix::errno::Errno;
use nix::sys::mman::ProtFlags;

use crate::shm::{Mapping, SharedMem};

/// Control block shared with the consumer. Lives at offset 0 of the
/// control page.
#[repr(C)]
pub struct RingInfo {
    pub head: AtomicU32,
    pub tail: AtomicU32,
    /// Committed records.
    pub n_evts: AtomicU64,
    /// Drops because the ring or the scratch window was full, or the
    /// filler failed.
    pub n_drops_buffer: AtomicU64,
    /// Drops because reading user memory faulted.
    pub n_drops_pf: AtomicU64,
    /// Drops because the ring was already being written on this CPU.
    pub n_preemptions: AtomicU64,
}

impl RingInfo {
    pub fn reset(&self) {
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
        self.n_evts.store(0, Ordering::Relaxed);
        self.n_drops_buffer.store(0, Ordering::Relaxed);
        self.n_drops_pf.store(0, Ordering::Relaxed);
        self.n_preemptions.store(0, Ordering::Release);
    }

    /// Snapshot of the counters and offsets.
    pub fn snapshot(&self, capacity: u32) -> RingStats {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        RingStats {
            head,
            tail,
            used: used_space(head, tail, capacity),
            capacity,
            events: self.n_evts.load(Ordering::Relaxed),
            drops_buffer_full: self.n_drops_buffer.load(Ordering::Relaxed),
            drops_invalid_memory: self.n_drops_pf.load(Ordering::Relaxed),
            drops_preemption: self.n_preemptions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub head: u32,
    pub tail: u32,
    pub used: u32,
    pub capacity: u32,
    pub events: u64,
    pub drops_buffer_full: u64,
    pub drops_invalid_memory: u64,
    pub drops_preemption: u64,
}

impl RingStats {
    pub fn drops(&self) -> u64 {
        self.drops_buffer_full + self.drops_invalid_memory + self.drops_preemption
    }

    /// Fill level in percent.
    pub fn used_pct(&self) -> u32 {
        if self.capacity == 0 {
            return 0;
        }
        ((self.used as u64 * 100) / self.capacity as u64) as u32
    }
}

/// Exclusive write access to a ring for the current callback.
pub(crate) struct WriteGate<'a> {
    count: &'a AtomicU32,
}

impl Drop for WriteGate<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Release);
    }
}

pub struct RingContext {
    cpu: usize,
    capacity: u32,
    state: AtomicU8,
    preempt_count: AtomicU32,
    /// Sequence number of the next record.
    pub(crate) nevents: AtomicU32,
    /// Timestamp of the last utilisation log line.
    pub(crate) last_print_ns: AtomicU64,
    str_storage: UnsafeCell<Box<[u8]>>,
    info_map: Mapping,
    buf_map: Mapping,
    info_mem: SharedMem,
    buf_mem: SharedMem,
}

// Safety: everything shared is atomic except `str_storage` and the bytes
// behind `buf_map`, which are only touched by the holder of the write gate.
unsafe impl Sync for RingContext {}
unsafe impl Send for RingContext {}

impl RingContext {
    /// Allocate the control page and `capacity` bytes plus cushion.
    pub fn new(cpu: usize, capacity: u32, page_size: usize) -> Result<Self, Errno> {
        let rw = ProtFlags::PROT_READ | ProtFlags::PROT_WRITE;

        let name = CString::new(format!("ktrace-info-{}", cpu)).map_err(|_| Errno::EINVAL)?;
        let info_mem = SharedMem::create(&name, page_size)?;
        let info_map = info_mem.map(page_size, rw)?;

        let name = CString::new(format!("ktrace-ring-{}", cpu)).map_err(|_| Errno::EINVAL)?;
        let buf_mem = SharedMem::create(&name, storage_size(capacity as usize, page_size))?;
        let buf_map = buf_mem.map(buf_mem.len(), rw)?;

        let ring = Self {
            cpu,
            capacity,
            state: AtomicU8::new(CaptureState::Stopped as u8),
            preempt_count: AtomicU32::new(0),
            nevents: AtomicU32::new(0),
            last_print_ns: AtomicU64::new(0),
            str_storage: UnsafeCell::new(vec![0u8; page_size].into_boxed_slice()),
            info_map,
            buf_map,
            info_mem,
            buf_mem,
        };
        ring.reset();
        Ok(ring)
    }

    #[inline]
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn info(&self) -> &RingInfo {
        // Safety: the control mapping is page-aligned, at least one page
        // long, and lives as long as `self`.
        unsafe { &*(self.info_map.as_ptr() as *const RingInfo) }
    }

    #[inline]
    pub fn state(&self) -> CaptureState {
        CaptureState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn state_cell(&self) -> &AtomicU8 {
        &self.state
    }

    pub fn stats(&self) -> RingStats {
        self.info().snapshot(self.capacity)
    }

    /// Free bytes as seen by the producer.
    #[inline]
    pub fn free_space(&self) -> u32 {
        let info = self.info();
        free_space(
            info.head.load(Ordering::Relaxed),
            info.tail.load(Ordering::Acquire),
            self.capacity,
        )
    }

    /// Empty the ring and zero the counters.
    pub fn reset(&self) {
        self.info().reset();
        self.nevents.store(0, Ordering::Relaxed);
        self.last_print_ns.store(0, Ordering::Relaxed);
    }

    /// Take the write gate. `None` if this ring is already being written,
    /// i.e. the current callback interrupted another one on the same CPU.
    #[inline]
    pub(crate) fn try_enter(&self) -> Option<WriteGate<'_>> {
        if self.preempt_count.fetch_add(1, Ordering::Acquire) != 0 {
            self.preempt_count.fetch_sub(1, Ordering::Release);
            return None;
        }
        Some(WriteGate {
            count: &self.preempt_count,
        })
    }

    /// Start of the producer mapping (ring bytes followed by the cushion).
    #[inline]
    pub(crate) fn buf_ptr(&self) -> *mut u8 {
        self.buf_map.as_ptr()
    }

    /// Bytes in the producer mapping.
    #[inline]
    pub(crate) fn buf_len(&self) -> usize {
        self.buf_map.len()
    }

    /// The string scratch page.
    ///
    /// # Safety
    ///
    /// The caller must hold the write gate and must not call this again
    /// while the returned slice is alive.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub(crate) unsafe fn str_storage(&self, _gate: &WriteGate<'_>) -> &mut [u8] {
        &mut *self.str_storage.get()
    }

    /// A new read-write mapping of the control page.
    pub(crate) fn map_control(&self, prot: ProtFlags) -> Result<Mapping, Errno> {
        self.info_mem.map(self.info_mem.len(), prot)
    }

    /// A new read-only doubled mapping of the ring bytes.
    pub(crate) fn map_buffer_view(&self) -> Result<Mapping, Errno> {
        self.buf_mem.map_doubled(self.capacity as usize)
    }
}

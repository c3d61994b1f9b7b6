//! Mapping bridge: hands a consumer its own view of one ring.
//!
//! The request mirrors an `mmap` on a per-CPU device:
//!
//! | offset | length            | result                                  |
//! |--------|-------------------|-----------------------------------------|
//! | 0      | one page          | control block, requested protection     |
//! | 0      | 2 × ring size     | ring bytes mapped twice, read-only      |
//! | other  | any               | `InvalidOffset`                         |
//! | 0      | anything else     | `InvalidLength`                         |
//!
//! Rejections never change engine state.

use std::slice;
use std::sync::atomic::Ordering;

use ktrace_core::HookRegistry;
use nix::sys::mman::ProtFlags;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::{MapError, Result};
use crate::ring::{RingInfo, RingStats};
use crate::shm::Mapping;

/// What a consumer asks to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    /// Offset in pages. Only 0 is valid.
    pub pgoff: u64,
    pub length: usize,
    pub prot: ProtFlags,
}

impl MapRequest {
    /// Read-write request for the control page.
    pub fn control(page_size: usize) -> Self {
        Self {
            pgoff: 0,
            length: page_size,
            prot: ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
        }
    }

    /// Read-only request for the doubled buffer view.
    pub fn buffer(ring_size: usize) -> Self {
        Self {
            pgoff: 0,
            length: 2 * ring_size,
            prot: ProtFlags::PROT_READ,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Control,
    Buffer,
}

/// A consumer-owned mapping. Stays valid after the engine is dropped.
#[derive(Debug)]
pub struct MappedRegion {
    kind: RegionKind,
    prot: ProtFlags,
    /// Ring capacity, the bound on head and tail.
    capacity: u32,
    map: Mapping,
}

impl MappedRegion {
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The control block, if this is a control mapping.
    pub fn ring_info(&self) -> Option<&RingInfo> {
        match self.kind {
            // Safety: page-aligned and one page long; all fields are atomics.
            RegionKind::Control => Some(unsafe { &*(self.map.as_ptr() as *const RingInfo) }),
            RegionKind::Buffer => None,
        }
    }

    /// The mapped bytes, if this is a buffer view.
    ///
    /// The producer keeps writing past head while this slice is alive;
    /// only bytes between tail and a head loaded with acquire ordering
    /// are stable.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self.kind {
            // Safety: the mapping is readable for `len` bytes for our lifetime.
            RegionKind::Buffer => Some(unsafe { slice::from_raw_parts(self.map.as_ptr(), self.map.len()) }),
            RegionKind::Control => None,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Counters from a control mapping.
    pub fn stats(&self) -> Option<RingStats> {
        self.ring_info().map(|info| info.snapshot(self.capacity))
    }

    /// Publish a new tail through a writable control mapping. Offsets
    /// outside the ring are refused.
    pub fn set_tail(&self, tail: u32) -> bool {
        if !self.prot.contains(ProtFlags::PROT_WRITE) || tail >= self.capacity {
            return false;
        }
        match self.ring_info() {
            Some(info) => {
                info.tail.store(tail, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

impl<H: HookRegistry> Engine<H> {
    /// Map the control block or the buffer of `ring`.
    pub fn mmap(&self, ring: usize, req: MapRequest) -> Result<MappedRegion> {
        let ctx = self.ring(ring)?;
        let region = self.check_request(&req).and_then(|kind| {
            let (map, prot) = match kind {
                RegionKind::Control => (ctx.map_control(req.prot), req.prot),
                RegionKind::Buffer => (ctx.map_buffer_view(), ProtFlags::PROT_READ),
            };
            let map = map.map_err(MapError::Mmap)?;
            Ok(MappedRegion {
                kind,
                prot,
                capacity: ctx.capacity(),
                map,
            })
        });

        match region {
            Ok(region) => {
                debug!(ring, kind = ?region.kind, len = region.len(), "ring mapped");
                Ok(region)
            }
            Err(e) => {
                warn!(ring, pgoff = req.pgoff, length = req.length, error = %e, "mapping rejected");
                Err(e.into())
            }
        }
    }

    fn check_request(&self, req: &MapRequest) -> std::result::Result<RegionKind, MapError> {
        if req.pgoff != 0 {
            return Err(MapError::InvalidOffset(req.pgoff));
        }
        if req.length == self.page_size {
            return Ok(RegionKind::Control);
        }
        if req.length == 2 * self.ring_size() {
            if req.prot.intersects(ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC) {
                return Err(MapError::WritableBuffer);
            }
            return Ok(RegionKind::Buffer);
        }
        Err(MapError::InvalidLength {
            length: req.length,
            page: self.page_size,
            view: 2 * self.ring_size(),
        })
    }
}

//! Shared memory backing the rings.
//!
//! Each ring owns two anonymous memory files (`memfd_create`): a one-page
//! control block and the byte buffer plus its cushion. The engine maps them
//! read-write for the producer side; consumers get additional mappings of
//! the same files, so a consumer mapping stays valid after the engine is
//! gone (the kernel keeps the pages alive while any mapping exists).
//!
//! # Doubled view
//!
//! ```text
//! reserve 2*len PROT_NONE        [..............................]
//! MAP_FIXED file [0, len) at +0   [ ring bytes  ]
//! MAP_FIXED file [0, len) at +len                [ ring bytes  ]
//! ```
//!
//! A record that wraps around the physical end of the ring reads as one
//! contiguous slice in the doubled view.

use std::ffi::CStr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};

use nix::errno::Errno;
use nix::sys::mman::ProtFlags;

/// A memory file of fixed size.
pub struct SharedMem {
    fd: OwnedFd,
    len: usize,
}

impl SharedMem {
    /// Create a zero-filled memory file of `len` bytes.
    pub fn create(name: &CStr, len: usize) -> Result<Self, Errno> {
        let raw = Errno::result(unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) })?;
        // Safety: memfd_create returned a fresh descriptor we now own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Errno::result(unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) })?;
        Ok(Self { fd, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Map `len` bytes from the start of the file, shared.
    pub fn map(&self, len: usize, prot: ProtFlags) -> Result<Mapping, Errno> {
        debug_assert!(len <= self.len);
        let addr = Errno::result(unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                prot.bits(),
                libc::MAP_SHARED,
                self.fd.as_raw_fd(),
                0,
            )
        })?;
        // Safety: a successful mmap of `len` bytes.
        Ok(unsafe { Mapping::from_raw(addr as *mut u8, len) })
    }

    /// Map the first `len` bytes twice, back to back, read-only.
    pub fn map_doubled(&self, len: usize) -> Result<Mapping, Errno> {
        debug_assert!(len <= self.len);
        let total = len.checked_mul(2).ok_or(Errno::EINVAL)?;
        let base = Errno::result(unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        })?;
        // Owns the whole range from here on, so a failed second half
        // unmaps the first one too.
        let view = unsafe { Mapping::from_raw(base as *mut u8, total) };

        for half in 0..2 {
            let at = unsafe { view.as_ptr().add(half * len) };
            Errno::result(unsafe {
                libc::mmap(
                    at as *mut libc::c_void,
                    len,
                    libc::PROT_READ,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    self.fd.as_raw_fd(),
                    0,
                )
            })?;
        }
        Ok(view)
    }
}

/// An owned memory mapping, unmapped on drop.
#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: the mapping is plain shared memory; synchronization of its
// contents is up to the users (atomics in the control block, the head
// release store for buffer bytes).
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    /// # Safety
    ///
    /// `ptr` must be the start of a live mapping of exactly `len` bytes
    /// that nothing else unmaps.
    pub(crate) unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        Self {
            ptr: NonNull::new_unchecked(ptr),
            len,
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

/// System page size.
pub fn page_size() -> usize {
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz > 0 {
        sz as usize
    } else {
        4096
    }
}

//! Filler contract and argument encoder.
//!
//! A filler serializes the parameters of one event into the scratch window
//! that follows the header. The window starts with a table of `nargs` u16
//! lengths; parameter bytes are appended after it:
//!
//! ```text
//! window: [len0][len1]..[len(n-1)] [arg0 bytes][arg1 bytes]..
//!         ^0                       ^nargs*2 = initial arg_data_offset
//! ```
//!
//! Each `push_*` fills slot `curarg`, appends the bytes, and advances both
//! cursors. The recorder commits only if the filler succeeded AND pushed
//! exactly `nargs` parameters.

use core::mem;

use crate::event::EventType;
use crate::schema::ParamType;
use crate::task::{Fault, UserMemory};

/// Why a filler gave up. Every variant ends as a counted drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillError {
    /// Reading the traced task's memory faulted.
    InvalidUserMemory,
    /// The scratch window cannot hold the next parameter.
    BufferFull,
    /// Anything else: too many parameters, malformed input.
    Failure,
}

impl From<Fault> for FillError {
    fn from(_: Fault) -> Self {
        FillError::InvalidUserMemory
    }
}

/// Serializes the parameters of one event type.
pub trait Filler: Sync {
    fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError>;
}

/// Register snapshot of the intercepted call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Regs {
    /// Syscall arguments in ABI order.
    pub args: [u64; 6],
    /// Return value (exit events). Exit status for process-exit.
    pub ret: i64,
    pub syscall_nr: i64,
}

/// A received packet, as seen by the network-receive hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketInfo {
    pub len: u32,
    pub ifindex: i32,
}

/// Raw call context handed to the recorder by a probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    pub regs: Regs,
    /// Syscall number as seen by the hook; may be negative or out of range.
    pub syscall_id: i64,
    pub packet: Option<PacketInfo>,
}

impl CallContext {
    pub fn syscall(regs: Regs, syscall_id: i64) -> Self {
        Self {
            regs,
            syscall_id,
            packet: None,
        }
    }

    pub fn packet(packet: PacketInfo) -> Self {
        Self {
            packet: Some(packet),
            ..Self::default()
        }
    }
}

/// State passed to a `Filler`.
pub struct FillerArgs<'a> {
    buf: &'a mut [u8],
    nargs: u32,
    curarg: u32,
    arg_data_offset: usize,
    event_type: EventType,
    call: &'a CallContext,
    user: &'a dyn UserMemory,
    str_storage: &'a mut [u8],
    nevents: u32,
    socketcall_args: Option<[u64; 6]>,
    snaplen: usize,
}

impl<'a> FillerArgs<'a> {
    /// `window` must hold at least the `nargs` length slots.
    pub fn new(
        window: &'a mut [u8],
        nargs: u32,
        call: &'a CallContext,
        user: &'a dyn UserMemory,
    ) -> Self {
        debug_assert!(window.len() >= nargs as usize * 2);
        Self {
            buf: window,
            nargs,
            curarg: 0,
            arg_data_offset: nargs as usize * 2,
            event_type: EventType::GENERIC_E,
            call,
            user,
            str_storage: Default::default(),
            nevents: 0,
            socketcall_args: None,
            snaplen: crate::constants::RW_SNAPLEN,
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// Scratch page used by `push_user_str`.
    pub fn with_str_storage(mut self, storage: &'a mut [u8]) -> Self {
        self.str_storage = storage;
        self
    }

    pub fn with_sequence(mut self, nevents: u32) -> Self {
        self.nevents = nevents;
        self
    }

    /// Argument block copied from a multiplexed socket call. Overrides the
    /// register arguments for `syscall_arg`.
    pub fn with_socketcall_args(mut self, args: Option<[u64; 6]>) -> Self {
        self.socketcall_args = args;
        self
    }

    pub fn with_snaplen(mut self, snaplen: usize) -> Self {
        self.snaplen = snaplen;
        self
    }

    #[inline]
    pub fn nargs(&self) -> u32 {
        self.nargs
    }

    /// Parameters pushed so far.
    #[inline]
    pub fn written(&self) -> u32 {
        self.curarg
    }

    /// Bytes used in the window, length table included.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.arg_data_offset
    }

    #[inline]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    #[inline]
    pub fn call(&self) -> &CallContext {
        self.call
    }

    /// Syscall argument `n`. Reads the socketcall block when present.
    #[inline]
    pub fn syscall_arg(&self, n: usize) -> u64 {
        if n >= 6 {
            return 0;
        }
        match &self.socketcall_args {
            Some(args) => args[n],
            None => self.call.regs.args[n],
        }
    }

    #[inline]
    pub fn retval(&self) -> i64 {
        self.call.regs.ret
    }

    #[inline]
    pub fn snaplen(&self) -> usize {
        self.snaplen
    }

    /// Number of records this ring committed before the current one.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.nevents
    }

    #[inline]
    pub fn user(&self) -> &dyn UserMemory {
        self.user
    }

    /// Reserve `len` bytes for the next parameter. Nothing is written on
    /// error.
    fn reserve(&self, len: usize) -> Result<usize, FillError> {
        if self.curarg >= self.nargs {
            return Err(FillError::Failure);
        }
        if len > u16::MAX as usize {
            return Err(FillError::BufferFull);
        }
        let end = self.arg_data_offset + len;
        if end > self.buf.len() {
            return Err(FillError::BufferFull);
        }
        Ok(end)
    }

    /// Fill the length slot of the current parameter and move on.
    fn advance(&mut self, end: usize) {
        let len = (end - self.arg_data_offset) as u16;
        let slot = self.curarg as usize * 2;
        self.buf[slot..slot + 2].copy_from_slice(&len.to_ne_bytes());
        self.arg_data_offset = end;
        self.curarg += 1;
    }

    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), FillError> {
        let end = self.reserve(data.len())?;
        self.buf[self.arg_data_offset..end].copy_from_slice(data);
        self.advance(end);
        Ok(())
    }

    /// Push `s` followed by a NUL terminator.
    pub fn push_str(&mut self, s: &str) -> Result<(), FillError> {
        let end = self.reserve(s.len() + 1)?;
        let start = self.arg_data_offset;
        self.buf[start..end - 1].copy_from_slice(s.as_bytes());
        self.buf[end - 1] = 0;
        self.advance(end);
        Ok(())
    }

    /// A zero-length parameter.
    pub fn push_empty(&mut self) -> Result<(), FillError> {
        self.push_bytes(&[])
    }

    pub fn push_i64(&mut self, v: i64) -> Result<(), FillError> {
        self.push_bytes(&v.to_ne_bytes())
    }

    pub fn push_u64(&mut self, v: u64) -> Result<(), FillError> {
        self.push_bytes(&v.to_ne_bytes())
    }

    pub fn push_u32(&mut self, v: u32) -> Result<(), FillError> {
        self.push_bytes(&v.to_ne_bytes())
    }

    pub fn push_u16(&mut self, v: u16) -> Result<(), FillError> {
        self.push_bytes(&v.to_ne_bytes())
    }

    /// Copy `len` bytes of user memory at `addr` straight into the window.
    pub fn push_user_bytes(&mut self, addr: u64, len: usize) -> Result<(), FillError> {
        let end = self.reserve(len)?;
        if len > 0 {
            let start = self.arg_data_offset;
            self.user.copy_from_user(addr, &mut self.buf[start..end])?;
        }
        self.advance(end);
        Ok(())
    }

    /// Copy a NUL-terminated user string (terminator included). Strings
    /// longer than the scratch page are truncated.
    pub fn push_user_str(&mut self, addr: u64) -> Result<(), FillError> {
        let storage = mem::take(&mut self.str_storage);
        let res = self.push_user_str_with(addr, storage);
        self.str_storage = storage;
        res
    }

    fn push_user_str_with(&mut self, addr: u64, storage: &mut [u8]) -> Result<(), FillError> {
        if storage.is_empty() {
            return Err(FillError::Failure);
        }
        let cap = storage.len() - 1;
        let n = self.user.strncpy_from_user(addr, &mut storage[..cap])?;
        storage[n] = 0;
        self.push_bytes(&storage[..n + 1])
    }

    /// Encode `val` as `ty`. Used by table-driven fillers.
    pub fn push_value(&mut self, ty: ParamType, val: u64) -> Result<(), FillError> {
        match ty {
            ParamType::Int64 | ParamType::Uint64 | ParamType::Fd | ParamType::Errno => {
                self.push_u64(val)
            }
            ParamType::Int32 | ParamType::Uint32 | ParamType::Flags32 | ParamType::Mode => {
                self.push_u32(val as u32)
            }
            ParamType::Uint16 | ParamType::SyscallId => self.push_u16(val as u16),
            ParamType::CharBuf => self.push_user_str(val),
            // A raw buffer needs a length no table entry can express.
            ParamType::ByteBuf => Err(FillError::Failure),
        }
    }
}

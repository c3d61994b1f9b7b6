//! Event schema types.
//!
//! The schema registry is a static table indexed by `EventType`. Each entry
//! says how many parameters a record of that type carries, what they are,
//! and how they get filled: either automatically from syscall arguments /
//! the return value, or by a type-specific `Filler`.

use core::fmt;

use crate::event::EventType;
use crate::filler::Filler;

/// Encoding of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int64,
    Uint64,
    Int32,
    Uint32,
    Uint16,
    /// File descriptor, encoded as i64.
    Fd,
    /// Return value that is an fd/count on success, -errno on failure (i64).
    Errno,
    /// Syscall number (u16).
    SyscallId,
    Flags32,
    Mode,
    /// NUL-terminated string, terminator included.
    CharBuf,
    /// Raw bytes.
    ByteBuf,
}

impl ParamType {
    /// Encoded width of fixed-size types; `None` for buffers.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            ParamType::Int64 | ParamType::Uint64 | ParamType::Fd | ParamType::Errno => Some(8),
            ParamType::Int32 | ParamType::Uint32 | ParamType::Flags32 | ParamType::Mode => Some(4),
            ParamType::Uint16 | ParamType::SyscallId => Some(2),
            ParamType::CharBuf | ParamType::ByteBuf => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamInfo {
    pub name: &'static str,
    pub ty: ParamType,
}

impl ParamInfo {
    pub const fn new(name: &'static str, ty: ParamType) -> Self {
        Self { name, ty }
    }
}

/// Source of one automatically filled parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoArg {
    /// Syscall argument by position.
    Arg(u8),
    /// The syscall return value.
    RetVal,
}

/// How the parameters of an event get serialized.
#[derive(Clone, Copy)]
pub enum FillStrategy {
    /// One `AutoArg` per parameter, encoded by the parameter's type.
    Auto(&'static [AutoArg]),
    /// A dedicated filler.
    Custom(&'static dyn Filler),
}

impl fmt::Debug for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillStrategy::Auto(args) => f.debug_tuple("Auto").field(args).finish(),
            FillStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One row of the schema registry.
#[derive(Debug, Clone, Copy)]
pub struct EventInfo {
    pub name: &'static str,
    pub params: &'static [ParamInfo],
    pub fill: FillStrategy,
}

impl EventInfo {
    /// Number of parameters a committed record of this type carries.
    #[inline]
    pub const fn nparams(&self) -> u32 {
        self.params.len() as u32
    }
}

/// Syscall number → enter/exit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallEvtPair {
    /// Unused entries record as the generic enter/exit types.
    pub used: bool,
    pub enter: EventType,
    pub exit: EventType,
}

impl SyscallEvtPair {
    pub const UNUSED: Self = Self {
        used: false,
        enter: EventType::GENERIC_E,
        exit: EventType::GENERIC_X,
    };

    /// A used pair whose exit type is `enter.exit()`.
    pub const fn pair(enter: EventType) -> Self {
        Self {
            used: true,
            enter,
            exit: enter.exit(),
        }
    }
}

//! Event record layout.
//!
//! Every record in a ring starts with a packed, native-endian header
//! followed by a table of `nargs` u16 parameter lengths and the
//! concatenated parameter bytes:
//!
//! ```text
//! [sentinel: u32]   (only with the `sentinel` feature)
//! ts:   u64         monotonic timestamp, nanoseconds
//! tid:  u64         originating thread id
//! len:  u32         total record length, header included
//! type: u16         EventType
//! lens: [u16; nargs]
//! data: ...
//! ```

/// Event type identifier.
///
/// Syscall events come in enter/exit pairs: the exit type is always the
/// enter type plus one, and enter types are even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EventType(pub u16);

impl EventType {
    pub const GENERIC_E: Self = Self(0);
    pub const GENERIC_X: Self = Self(1);
    pub const SYSCALL_OPEN_E: Self = Self(2);
    pub const SYSCALL_OPEN_X: Self = Self(3);
    pub const SYSCALL_CLOSE_E: Self = Self(4);
    pub const SYSCALL_CLOSE_X: Self = Self(5);
    pub const SYSCALL_READ_E: Self = Self(6);
    pub const SYSCALL_READ_X: Self = Self(7);
    pub const SYSCALL_WRITE_E: Self = Self(8);
    pub const SYSCALL_WRITE_X: Self = Self(9);
    pub const SOCKET_SOCKET_E: Self = Self(10);
    pub const SOCKET_SOCKET_X: Self = Self(11);
    pub const SOCKET_BIND_E: Self = Self(12);
    pub const SOCKET_BIND_X: Self = Self(13);
    pub const SOCKET_CONNECT_E: Self = Self(14);
    pub const SOCKET_CONNECT_X: Self = Self(15);
    pub const SOCKET_LISTEN_E: Self = Self(16);
    pub const SOCKET_LISTEN_X: Self = Self(17);
    pub const SOCKET_ACCEPT_E: Self = Self(18);
    pub const SOCKET_ACCEPT_X: Self = Self(19);
    pub const SOCKET_SEND_E: Self = Self(20);
    pub const SOCKET_SEND_X: Self = Self(21);
    pub const SOCKET_SENDTO_E: Self = Self(22);
    pub const SOCKET_SENDTO_X: Self = Self(23);
    pub const SOCKET_RECV_E: Self = Self(24);
    pub const SOCKET_RECV_X: Self = Self(25);
    pub const SOCKET_RECVFROM_E: Self = Self(26);
    pub const SOCKET_RECVFROM_X: Self = Self(27);
    pub const SOCKET_SHUTDOWN_E: Self = Self(28);
    pub const SOCKET_SHUTDOWN_X: Self = Self(29);
    pub const SOCKET_GETSOCKNAME_E: Self = Self(30);
    pub const SOCKET_GETSOCKNAME_X: Self = Self(31);
    pub const SOCKET_GETPEERNAME_E: Self = Self(32);
    pub const SOCKET_GETPEERNAME_X: Self = Self(33);
    pub const SOCKET_SOCKETPAIR_E: Self = Self(34);
    pub const SOCKET_SOCKETPAIR_X: Self = Self(35);
    pub const SOCKET_SETSOCKOPT_E: Self = Self(36);
    pub const SOCKET_SETSOCKOPT_X: Self = Self(37);
    pub const SOCKET_GETSOCKOPT_E: Self = Self(38);
    pub const SOCKET_GETSOCKOPT_X: Self = Self(39);
    pub const SOCKET_SENDMSG_E: Self = Self(40);
    pub const SOCKET_SENDMSG_X: Self = Self(41);
    pub const SOCKET_SENDMMSG_E: Self = Self(42);
    pub const SOCKET_SENDMMSG_X: Self = Self(43);
    pub const SOCKET_RECVMSG_E: Self = Self(44);
    pub const SOCKET_RECVMSG_X: Self = Self(45);
    pub const SOCKET_RECVMMSG_E: Self = Self(46);
    pub const SOCKET_RECVMMSG_X: Self = Self(47);
    pub const SOCKET_ACCEPT4_E: Self = Self(48);
    pub const SOCKET_ACCEPT4_X: Self = Self(49);
    pub const SYSCALL_EXECVE_E: Self = Self(50);
    pub const SYSCALL_EXECVE_X: Self = Self(51);
    pub const SYSCALL_CLONE_E: Self = Self(52);
    pub const SYSCALL_CLONE_X: Self = Self(53);
    pub const PROCEXIT_E: Self = Self(54);
    pub const PROCEXIT_X: Self = Self(55);
    pub const NETIF_RX_E: Self = Self(56);
    pub const NETIF_RX_X: Self = Self(57);

    /// One past the largest builtin event type.
    pub const MAX: u16 = 58;

    /// The exit event paired with this enter event.
    #[inline]
    pub const fn exit(self) -> Self {
        Self(self.0 + 1)
    }

    #[inline]
    pub const fn is_enter(self) -> bool {
        self.0 & 1 == 0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "sentinel")]
const BASE: usize = 4;
#[cfg(not(feature = "sentinel"))]
const BASE: usize = 0;

const TS_OFF: usize = BASE;
const TID_OFF: usize = BASE + 8;
const LEN_OFF: usize = BASE + 16;
const TYPE_OFF: usize = BASE + 20;

/// Size of the packed event header in bytes.
pub const HEADER_SIZE: usize = BASE + 22;

/// Decoded event header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Per-ring sequence number of the record.
    #[cfg(feature = "sentinel")]
    pub sentinel: u32,
    pub ts: u64,
    pub tid: u64,
    pub len: u32,
    pub event_type: EventType,
}

impl EventHeader {
    /// Build a header whose length is not known yet. `seq` is only kept
    /// when the `sentinel` feature is enabled.
    #[inline]
    #[allow(unused_variables)]
    pub fn new(ts: u64, tid: u64, event_type: EventType, seq: u32) -> Self {
        Self {
            #[cfg(feature = "sentinel")]
            sentinel: seq,
            ts,
            tid,
            len: 0,
            event_type,
        }
    }

    /// Encode into the first `HEADER_SIZE` bytes of `dst`.
    ///
    /// Panics if `dst` is shorter than `HEADER_SIZE`.
    #[inline]
    pub fn write_to(&self, dst: &mut [u8]) {
        #[cfg(feature = "sentinel")]
        dst[0..4].copy_from_slice(&self.sentinel.to_ne_bytes());
        dst[TS_OFF..TS_OFF + 8].copy_from_slice(&self.ts.to_ne_bytes());
        dst[TID_OFF..TID_OFF + 8].copy_from_slice(&self.tid.to_ne_bytes());
        dst[LEN_OFF..LEN_OFF + 4].copy_from_slice(&self.len.to_ne_bytes());
        dst[TYPE_OFF..TYPE_OFF + 2].copy_from_slice(&self.event_type.0.to_ne_bytes());
    }

    /// Patch only the length field of an encoded header.
    #[inline]
    pub fn set_len(dst: &mut [u8], len: u32) {
        dst[LEN_OFF..LEN_OFF + 4].copy_from_slice(&len.to_ne_bytes());
    }

    /// Decode from the start of `src`. Returns `None` if `src` is too short.
    pub fn read_from(src: &[u8]) -> Option<Self> {
        if src.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            #[cfg(feature = "sentinel")]
            sentinel: u32::from_ne_bytes(src[0..4].try_into().ok()?),
            ts: u64::from_ne_bytes(src[TS_OFF..TS_OFF + 8].try_into().ok()?),
            tid: u64::from_ne_bytes(src[TID_OFF..TID_OFF + 8].try_into().ok()?),
            len: u32::from_ne_bytes(src[LEN_OFF..LEN_OFF + 4].try_into().ok()?),
            event_type: EventType(u16::from_ne_bytes(src[TYPE_OFF..TYPE_OFF + 2].try_into().ok()?)),
        })
    }
}

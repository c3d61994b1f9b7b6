//! Socket multiplexing on 32-bit x86.
//!
//! There, every socket operation enters through one `socketcall(call, args)`
//! syscall: `call` names the operation and `args` points to an array of
//! `unsigned long` arguments in user memory. The recorder rewrites the
//! generic event into the matching socket event and hands the copied
//! arguments to the filler.
//!
//! Only wired into the recorder on `target_arch = "x86"`.

use std::mem::size_of;

use ktrace_core::{CallContext, EventType, TaskContext, UserMemory};
use libc::c_ulong;

/// `__NR_socketcall` on i386.
pub const SOCKETCALL_NR: i64 = 102;

/// Highest call id we decode (`SYS_SENDMMSG`).
pub const MAX_CALL: u64 = 20;

/// Number of argument words per call id.
const NAS: [u8; MAX_CALL as usize + 1] = [
    0, 3, 3, 3, 2, 3, //
    3, 3, 4, 4, 4, 6, //
    6, 2, 5, 5, 3, 3, //
    4, 5, 4,
];

/// Enter event per call id. Index 0 is unused.
const CALL_EVENTS: [EventType; MAX_CALL as usize + 1] = [
    EventType::GENERIC_E,
    EventType::SOCKET_SOCKET_E,
    EventType::SOCKET_BIND_E,
    EventType::SOCKET_CONNECT_E,
    EventType::SOCKET_LISTEN_E,
    EventType::SOCKET_ACCEPT_E,
    EventType::SOCKET_GETSOCKNAME_E,
    EventType::SOCKET_GETPEERNAME_E,
    EventType::SOCKET_SOCKETPAIR_E,
    EventType::SOCKET_SEND_E,
    EventType::SOCKET_RECV_E,
    EventType::SOCKET_SENDTO_E,
    EventType::SOCKET_RECVFROM_E,
    EventType::SOCKET_SHUTDOWN_E,
    EventType::SOCKET_SETSOCKOPT_E,
    EventType::SOCKET_GETSOCKOPT_E,
    EventType::SOCKET_SENDMSG_E,
    EventType::SOCKET_RECVMSG_E,
    EventType::SOCKET_ACCEPT4_E,
    EventType::SOCKET_RECVMMSG_E,
    EventType::SOCKET_SENDMMSG_E,
];

/// Decode one socketcall.
///
/// Returns the event type for the enter or exit side and the argument
/// block widened to u64. An unknown call id or an unreadable argument
/// block decodes to the generic event with no arguments.
pub fn decode(
    user: &dyn UserMemory,
    is_enter: bool,
    call_id: u64,
    argp: u64,
) -> (EventType, Option<[u64; 6]>) {
    let generic = if is_enter {
        EventType::GENERIC_E
    } else {
        EventType::GENERIC_X
    };
    if call_id == 0 || call_id > MAX_CALL {
        return (generic, None);
    }

    const WORD: usize = size_of::<c_ulong>();
    let nwords = NAS[call_id as usize] as usize;
    let mut raw = [0u8; 6 * WORD];
    if user.copy_from_user(argp, &mut raw[..nwords * WORD]).is_err() {
        return (generic, None);
    }

    let mut args = [0u64; 6];
    for (dst, word) in args.iter_mut().zip(raw.chunks_exact(WORD)).take(nwords) {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(word);
        *dst = c_ulong::from_ne_bytes(bytes) as u64;
    }

    let enter = CALL_EVENTS[call_id as usize];
    let ty = if is_enter { enter } else { enter.exit() };
    (ty, Some(args))
}

/// Rewrite `event_type` if `call` is a socketcall; otherwise pass through.
pub fn adjust<T: TaskContext>(
    task: &T,
    event_type: EventType,
    call: &CallContext,
) -> (EventType, Option<[u64; 6]>) {
    if call.syscall_id != SOCKETCALL_NR || call.packet.is_some() {
        return (event_type, None);
    }
    let is_enter = event_type == EventType::GENERIC_E;
    decode(task, is_enter, call.regs.args[0], call.regs.args[1])
}

//! Builtin event schema.
//!
//! `EVENT_TABLE` is indexed by `EventType`. Every enter type is followed by
//! its exit type, so row `2k` and `2k + 1` always describe one pair.

use ktrace_core::{
    AutoArg, EventInfo, EventType, FillStrategy, ParamInfo, ParamType, SyscallEvtPair,
};

use crate::fillers::{DataExit, GenericSyscall, NetifRx, OpenExit, SockaddrExit, SocketpairExit};
use crate::syscall_table::{self, SYSCALL_TABLE};

use AutoArg::{Arg, RetVal};
use ParamType as T;

const fn p(name: &'static str, ty: ParamType) -> ParamInfo {
    ParamInfo::new(name, ty)
}

const fn auto(name: &'static str, params: &'static [ParamInfo], args: &'static [AutoArg]) -> EventInfo {
    EventInfo {
        name,
        params,
        fill: FillStrategy::Auto(args),
    }
}

const FD: &[ParamInfo] = &[p("fd", T::Fd)];
const RES: &[ParamInfo] = &[p("res", T::Errno)];
const FD_SIZE: &[ParamInfo] = &[p("fd", T::Fd), p("size", T::Uint32)];
const RES_DATA: &[ParamInfo] = &[p("res", T::Errno), p("data", T::ByteBuf)];
const RES_ADDR: &[ParamInfo] = &[p("res", T::Errno), p("addr", T::ByteBuf)];
const DOMAIN_TYPE_PROTO: &[ParamInfo] = &[
    p("domain", T::Uint32),
    p("type", T::Uint32),
    p("proto", T::Uint32),
];
const SOCKOPT: &[ParamInfo] = &[p("fd", T::Fd), p("level", T::Uint32), p("optname", T::Uint32)];

const ARG0: &[AutoArg] = &[Arg(0)];
const ARG0_ARG2: &[AutoArg] = &[Arg(0), Arg(2)];
const ARG012: &[AutoArg] = &[Arg(0), Arg(1), Arg(2)];
const RET: &[AutoArg] = &[RetVal];

const fn fd_enter(name: &'static str) -> EventInfo {
    auto(name, FD, ARG0)
}

const fn res_exit(name: &'static str) -> EventInfo {
    auto(name, RES, RET)
}

const fn data_enter(name: &'static str) -> EventInfo {
    auto(name, FD_SIZE, ARG0_ARG2)
}

const fn data_exit(name: &'static str) -> EventInfo {
    EventInfo {
        name,
        params: RES_DATA,
        fill: FillStrategy::Custom(&DataExit),
    }
}

/// The builtin events, indexed by `EventType`.
pub static EVENT_TABLE: [EventInfo; EventType::MAX as usize] = [
    // GENERIC
    EventInfo { name: "syscall", params: &[p("id", T::SyscallId)], fill: FillStrategy::Custom(&GenericSyscall) },
    EventInfo { name: "syscall", params: &[p("id", T::SyscallId)], fill: FillStrategy::Custom(&GenericSyscall) },
    // OPEN
    auto("open", &[], &[]),
    EventInfo {
        name: "open",
        params: &[p("fd", T::Fd), p("name", T::CharBuf), p("flags", T::Flags32), p("mode", T::Mode)],
        fill: FillStrategy::Custom(&OpenExit),
    },
    // CLOSE
    fd_enter("close"),
    res_exit("close"),
    // READ
    data_enter("read"),
    data_exit("read"),
    // WRITE
    data_enter("write"),
    data_exit("write"),
    // SOCKET
    auto("socket", DOMAIN_TYPE_PROTO, ARG012),
    auto("socket", FD, RET),
    // BIND
    fd_enter("bind"),
    EventInfo { name: "bind", params: RES_ADDR, fill: FillStrategy::Custom(&SockaddrExit) },
    // CONNECT
    fd_enter("connect"),
    EventInfo { name: "connect", params: RES_ADDR, fill: FillStrategy::Custom(&SockaddrExit) },
    // LISTEN
    auto("listen", &[p("fd", T::Fd), p("backlog", T::Uint32)], &[Arg(0), Arg(1)]),
    res_exit("listen"),
    // ACCEPT
    auto("accept", &[], &[]),
    auto("accept", FD, RET),
    // SEND
    data_enter("send"),
    data_exit("send"),
    // SENDTO
    data_enter("sendto"),
    data_exit("sendto"),
    // RECV
    data_enter("recv"),
    data_exit("recv"),
    // RECVFROM
    data_enter("recvfrom"),
    data_exit("recvfrom"),
    // SHUTDOWN
    auto("shutdown", &[p("fd", T::Fd), p("how", T::Flags32)], &[Arg(0), Arg(1)]),
    res_exit("shutdown"),
    // GETSOCKNAME
    fd_enter("getsockname"),
    res_exit("getsockname"),
    // GETPEERNAME
    fd_enter("getpeername"),
    res_exit("getpeername"),
    // SOCKETPAIR
    auto("socketpair", DOMAIN_TYPE_PROTO, ARG012),
    EventInfo {
        name: "socketpair",
        params: &[p("res", T::Errno), p("fd1", T::Fd), p("fd2", T::Fd)],
        fill: FillStrategy::Custom(&SocketpairExit),
    },
    // SETSOCKOPT
    auto("setsockopt", SOCKOPT, ARG012),
    res_exit("setsockopt"),
    // GETSOCKOPT
    auto("getsockopt", SOCKOPT, ARG012),
    res_exit("getsockopt"),
    // SENDMSG
    fd_enter("sendmsg"),
    res_exit("sendmsg"),
    // SENDMMSG
    fd_enter("sendmmsg"),
    res_exit("sendmmsg"),
    // RECVMSG
    fd_enter("recvmsg"),
    res_exit("recvmsg"),
    // RECVMMSG
    fd_enter("recvmmsg"),
    res_exit("recvmmsg"),
    // ACCEPT4
    auto("accept4", &[p("flags", T::Flags32)], &[Arg(3)]),
    auto("accept4", FD, RET),
    // EXECVE
    auto("execve", &[p("filename", T::CharBuf)], ARG0),
    res_exit("execve"),
    // CLONE
    auto("clone", &[p("flags", T::Uint64)], ARG0),
    auto("clone", &[p("res", T::Int64)], RET),
    // PROCEXIT
    auto("procexit", &[p("status", T::Int64)], RET),
    auto("procexit", &[], &[]),
    // NETIF_RX
    EventInfo {
        name: "netif_rx",
        params: &[p("len", T::Uint32), p("ifindex", T::Int32)],
        fill: FillStrategy::Custom(&NetifRx),
    },
    auto("netif_rx", &[], &[]),
];

/// The static tables the recorder consults.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub events: &'static [EventInfo],
    pub syscalls: &'static [SyscallEvtPair],
}

impl Default for Schema {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Schema {
    pub fn builtin() -> Self {
        Self {
            events: &EVENT_TABLE,
            syscalls: &SYSCALL_TABLE,
        }
    }

    /// Row for `ty`. `None` outside the table.
    #[inline]
    pub fn event(&self, ty: EventType) -> Option<&'static EventInfo> {
        self.events.get(ty.as_index())
    }

    #[inline]
    pub fn syscall(&self, id: i64) -> SyscallEvtPair {
        syscall_table::lookup(self.syscalls, id)
    }
}

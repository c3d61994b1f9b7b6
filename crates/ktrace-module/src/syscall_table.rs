//! Syscall number → event pair table.
//!
//! A flat array indexed by `__NR_*` syscall number of the build target.
//! Lookup is O(1): one bounds check, one array index. Numbers that are out
//! of range, negative, or not traced map to the generic enter/exit pair.

use cfg_if::cfg_if;
use ktrace_core::constants::SYSCALL_TABLE_SIZE;
use ktrace_core::{EventType, SyscallEvtPair};

cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Linux x86_64 syscall numbers (asm/unistd_64.h).
        pub mod nr {
            use ktrace_core::EventType as E;

            pub const READ: u32 = 0;
            pub const WRITE: u32 = 1;
            pub const OPEN: u32 = 2;
            pub const CLOSE: u32 = 3;
            pub const SOCKET: u32 = 41;
            pub const CONNECT: u32 = 42;
            pub const ACCEPT: u32 = 43;
            pub const SENDTO: u32 = 44;
            pub const RECVFROM: u32 = 45;
            pub const SENDMSG: u32 = 46;
            pub const RECVMSG: u32 = 47;
            pub const SHUTDOWN: u32 = 48;
            pub const BIND: u32 = 49;
            pub const LISTEN: u32 = 50;
            pub const GETSOCKNAME: u32 = 51;
            pub const GETPEERNAME: u32 = 52;
            pub const SOCKETPAIR: u32 = 53;
            pub const SETSOCKOPT: u32 = 54;
            pub const GETSOCKOPT: u32 = 55;
            pub const CLONE: u32 = 56;
            pub const EXECVE: u32 = 59;
            pub const OPENAT: u32 = 257;
            pub const ACCEPT4: u32 = 288;
            pub const RECVMMSG: u32 = 299;
            pub const SENDMMSG: u32 = 307;

            pub(super) const TRACED: &[(u32, E)] = &[
                (OPEN, E::SYSCALL_OPEN_E),
                (OPENAT, E::SYSCALL_OPEN_E),
                (CLOSE, E::SYSCALL_CLOSE_E),
                (READ, E::SYSCALL_READ_E),
                (WRITE, E::SYSCALL_WRITE_E),
                (SOCKET, E::SOCKET_SOCKET_E),
                (BIND, E::SOCKET_BIND_E),
                (CONNECT, E::SOCKET_CONNECT_E),
                (LISTEN, E::SOCKET_LISTEN_E),
                (ACCEPT, E::SOCKET_ACCEPT_E),
                (SENDTO, E::SOCKET_SENDTO_E),
                (RECVFROM, E::SOCKET_RECVFROM_E),
                (SHUTDOWN, E::SOCKET_SHUTDOWN_E),
                (GETSOCKNAME, E::SOCKET_GETSOCKNAME_E),
                (GETPEERNAME, E::SOCKET_GETPEERNAME_E),
                (SOCKETPAIR, E::SOCKET_SOCKETPAIR_E),
                (SETSOCKOPT, E::SOCKET_SETSOCKOPT_E),
                (GETSOCKOPT, E::SOCKET_GETSOCKOPT_E),
                (SENDMSG, E::SOCKET_SENDMSG_E),
                (SENDMMSG, E::SOCKET_SENDMMSG_E),
                (RECVMSG, E::SOCKET_RECVMSG_E),
                (RECVMMSG, E::SOCKET_RECVMMSG_E),
                (ACCEPT4, E::SOCKET_ACCEPT4_E),
                (EXECVE, E::SYSCALL_EXECVE_E),
                (CLONE, E::SYSCALL_CLONE_E),
            ];
        }
    } else if #[cfg(target_arch = "x86")] {
        /// Linux i386 syscall numbers (asm/unistd_32.h).
        ///
        /// `socketcall` is deliberately untraced here: the recorder decodes
        /// it into the specific socket event.
        pub mod nr {
            use ktrace_core::EventType as E;

            pub const READ: u32 = 3;
            pub const WRITE: u32 = 4;
            pub const OPEN: u32 = 5;
            pub const CLOSE: u32 = 6;
            pub const EXECVE: u32 = 11;
            pub const SOCKETCALL: u32 = 102;
            pub const CLONE: u32 = 120;
            pub const OPENAT: u32 = 295;
            pub const RECVMMSG: u32 = 337;
            pub const SENDMMSG: u32 = 345;
            pub const SOCKET: u32 = 359;
            pub const SOCKETPAIR: u32 = 360;
            pub const BIND: u32 = 361;
            pub const CONNECT: u32 = 362;
            pub const LISTEN: u32 = 363;
            pub const ACCEPT4: u32 = 364;
            pub const GETSOCKOPT: u32 = 365;
            pub const SETSOCKOPT: u32 = 366;
            pub const GETSOCKNAME: u32 = 367;
            pub const GETPEERNAME: u32 = 368;
            pub const SENDTO: u32 = 369;
            pub const SENDMSG: u32 = 370;
            pub const RECVFROM: u32 = 371;
            pub const RECVMSG: u32 = 372;
            pub const SHUTDOWN: u32 = 373;

            pub(super) const TRACED: &[(u32, E)] = &[
                (OPEN, E::SYSCALL_OPEN_E),
                (OPENAT, E::SYSCALL_OPEN_E),
                (CLOSE, E::SYSCALL_CLOSE_E),
                (READ, E::SYSCALL_READ_E),
                (WRITE, E::SYSCALL_WRITE_E),
                (SOCKET, E::SOCKET_SOCKET_E),
                (BIND, E::SOCKET_BIND_E),
                (CONNECT, E::SOCKET_CONNECT_E),
                (LISTEN, E::SOCKET_LISTEN_E),
                (SENDTO, E::SOCKET_SENDTO_E),
                (RECVFROM, E::SOCKET_RECVFROM_E),
                (SHUTDOWN, E::SOCKET_SHUTDOWN_E),
                (GETSOCKNAME, E::SOCKET_GETSOCKNAME_E),
                (GETPEERNAME, E::SOCKET_GETPEERNAME_E),
                (SOCKETPAIR, E::SOCKET_SOCKETPAIR_E),
                (SETSOCKOPT, E::SOCKET_SETSOCKOPT_E),
                (GETSOCKOPT, E::SOCKET_GETSOCKOPT_E),
                (SENDMSG, E::SOCKET_SENDMSG_E),
                (SENDMMSG, E::SOCKET_SENDMMSG_E),
                (RECVMSG, E::SOCKET_RECVMSG_E),
                (RECVMMSG, E::SOCKET_RECVMMSG_E),
                (ACCEPT4, E::SOCKET_ACCEPT4_E),
                (EXECVE, E::SYSCALL_EXECVE_E),
                (CLONE, E::SYSCALL_CLONE_E),
            ];
        }
    } else {
        /// asm-generic syscall numbers (aarch64, riscv64, loongarch64).
        pub mod nr {
            use ktrace_core::EventType as E;

            pub const OPENAT: u32 = 56;
            pub const CLOSE: u32 = 57;
            pub const READ: u32 = 63;
            pub const WRITE: u32 = 64;
            pub const SOCKET: u32 = 198;
            pub const SOCKETPAIR: u32 = 199;
            pub const BIND: u32 = 200;
            pub const LISTEN: u32 = 201;
            pub const ACCEPT: u32 = 202;
            pub const CONNECT: u32 = 203;
            pub const GETSOCKNAME: u32 = 204;
            pub const GETPEERNAME: u32 = 205;
            pub const SENDTO: u32 = 206;
            pub const RECVFROM: u32 = 207;
            pub const SETSOCKOPT: u32 = 208;
            pub const GETSOCKOPT: u32 = 209;
            pub const SHUTDOWN: u32 = 210;
            pub const SENDMSG: u32 = 211;
            pub const RECVMSG: u32 = 212;
            pub const CLONE: u32 = 220;
            pub const EXECVE: u32 = 221;
            pub const ACCEPT4: u32 = 242;
            pub const RECVMMSG: u32 = 243;
            pub const SENDMMSG: u32 = 269;

            pub(super) const TRACED: &[(u32, E)] = &[
                (OPENAT, E::SYSCALL_OPEN_E),
                (CLOSE, E::SYSCALL_CLOSE_E),
                (READ, E::SYSCALL_READ_E),
                (WRITE, E::SYSCALL_WRITE_E),
                (SOCKET, E::SOCKET_SOCKET_E),
                (BIND, E::SOCKET_BIND_E),
                (CONNECT, E::SOCKET_CONNECT_E),
                (LISTEN, E::SOCKET_LISTEN_E),
                (ACCEPT, E::SOCKET_ACCEPT_E),
                (SENDTO, E::SOCKET_SENDTO_E),
                (RECVFROM, E::SOCKET_RECVFROM_E),
                (SHUTDOWN, E::SOCKET_SHUTDOWN_E),
                (GETSOCKNAME, E::SOCKET_GETSOCKNAME_E),
                (GETPEERNAME, E::SOCKET_GETPEERNAME_E),
                (SOCKETPAIR, E::SOCKET_SOCKETPAIR_E),
                (SETSOCKOPT, E::SOCKET_SETSOCKOPT_E),
                (GETSOCKOPT, E::SOCKET_GETSOCKOPT_E),
                (SENDMSG, E::SOCKET_SENDMSG_E),
                (SENDMMSG, E::SOCKET_SENDMMSG_E),
                (RECVMSG, E::SOCKET_RECVMSG_E),
                (RECVMMSG, E::SOCKET_RECVMMSG_E),
                (ACCEPT4, E::SOCKET_ACCEPT4_E),
                (EXECVE, E::SYSCALL_EXECVE_E),
                (CLONE, E::SYSCALL_CLONE_E),
            ];
        }
    }
}

const fn build(traced: &[(u32, EventType)]) -> [SyscallEvtPair; SYSCALL_TABLE_SIZE] {
    let mut table = [SyscallEvtPair::UNUSED; SYSCALL_TABLE_SIZE];
    let mut i = 0;
    while i < traced.len() {
        let (nr, enter) = traced[i];
        table[nr as usize] = SyscallEvtPair::pair(enter);
        i += 1;
    }
    table
}

/// The builtin table for the build target.
pub static SYSCALL_TABLE: [SyscallEvtPair; SYSCALL_TABLE_SIZE] = build(nr::TRACED);

/// Pair for `id`. Unused for negative and out-of-range numbers.
#[inline]
pub fn lookup(table: &[SyscallEvtPair], id: i64) -> SyscallEvtPair {
    if id < 0 {
        return SyscallEvtPair::UNUSED;
    }
    table.get(id as usize).copied().unwrap_or(SyscallEvtPair::UNUSED)
}

/// Number of traced entries.
pub fn traced_count(table: &[SyscallEvtPair]) -> usize {
    table.iter().filter(|p| p.used).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_used_entry_is_a_pair() {
        for (i, p) in SYSCALL_TABLE.iter().enumerate() {
            if p.used {
                assert!(p.enter.is_enter(), "nr {}", i);
                assert_eq!(p.exit, p.enter.exit(), "nr {}", i);
                assert!(p.exit.0 < EventType::MAX, "nr {}", i);
            } else {
                assert_eq!(*p, SyscallEvtPair::UNUSED);
            }
        }
        assert_eq!(traced_count(&SYSCALL_TABLE), nr::TRACED.len());
    }

    #[test]
    fn out_of_range_is_unused() {
        assert!(!lookup(&SYSCALL_TABLE, -1).used);
        assert!(!lookup(&SYSCALL_TABLE, SYSCALL_TABLE_SIZE as i64).used);
        assert!(!lookup(&SYSCALL_TABLE, i64::MAX).used);
    }

    #[test]
    fn read_write_close_traced() {
        assert_eq!(lookup(&SYSCALL_TABLE, nr::READ as i64).enter, EventType::SYSCALL_READ_E);
        assert_eq!(lookup(&SYSCALL_TABLE, nr::WRITE as i64).exit, EventType::SYSCALL_WRITE_X);
        assert_eq!(lookup(&SYSCALL_TABLE, nr::CLOSE as i64).enter, EventType::SYSCALL_CLOSE_E);
        assert_eq!(lookup(&SYSCALL_TABLE, nr::OPENAT as i64).enter, EventType::SYSCALL_OPEN_E);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn x86_64_numbering() {
        assert_eq!(lookup(&SYSCALL_TABLE, 0).enter, EventType::SYSCALL_READ_E);
        assert_eq!(lookup(&SYSCALL_TABLE, 42).enter, EventType::SOCKET_CONNECT_E);
        assert_eq!(lookup(&SYSCALL_TABLE, 288).enter, EventType::SOCKET_ACCEPT4_E);
        // getpid is not traced.
        assert!(!lookup(&SYSCALL_TABLE, 39).used);
    }

    #[cfg(target_arch = "x86")]
    #[test]
    fn socketcall_left_to_recorder() {
        assert!(!lookup(&SYSCALL_TABLE, nr::SOCKETCALL as i64).used);
    }
}

//! Builtin fillers.
//!
//! Most events are table-driven (`auto_fill`): each parameter is a syscall
//! argument or the return value, encoded by its declared type. The fillers
//! below cover the events whose parameters need more than that: user
//! buffers with a length taken from another register, strings at a
//! syscall-dependent position, or packet metadata.

use ktrace_core::{AutoArg, EventInfo, FillError, Filler, FillerArgs};

use crate::syscall_table::nr;

/// Bytes of a `sockaddr_storage`. Longer address lengths are clamped.
const SOCKADDR_MAX: u64 = 128;

/// Push one parameter per `(param, source)` pair.
pub fn auto_fill(
    info: &EventInfo,
    sources: &[AutoArg],
    args: &mut FillerArgs<'_>,
) -> Result<(), FillError> {
    for (param, src) in info.params.iter().zip(sources) {
        let val = match *src {
            AutoArg::Arg(n) => args.syscall_arg(n as usize),
            AutoArg::RetVal => args.retval() as u64,
        };
        args.push_value(param.ty, val)?;
    }
    Ok(())
}

/// Untraced syscalls: the raw syscall number.
pub struct GenericSyscall;

impl Filler for GenericSyscall {
    fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
        let id = args.call().syscall_id;
        args.push_u16(id as u16)
    }
}

/// open / openat exit: fd, path, flags, mode.
pub struct OpenExit;

impl Filler for OpenExit {
    fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
        // openat carries a dirfd in front of the open(2) arguments.
        let first = if args.call().syscall_id == nr::OPENAT as i64 { 1 } else { 0 };

        args.push_i64(args.retval())?;
        let path = args.syscall_arg(first);
        if path == 0 {
            args.push_empty()?;
        } else {
            args.push_user_str(path)?;
        }
        args.push_u32(args.syscall_arg(first + 1) as u32)?;
        args.push_u32(args.syscall_arg(first + 2) as u32)
    }
}

/// read / write / send / recv style exit: result and a data snapshot.
///
/// The snapshot covers the bytes the call actually transferred, capped at
/// the snap length. Failed calls carry an empty snapshot.
pub struct DataExit;

impl Filler for DataExit {
    fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
        let res = args.retval();
        args.push_i64(res)?;
        if res <= 0 {
            return args.push_empty();
        }
        let len = (res as u64).min(args.snaplen() as u64) as usize;
        args.push_user_bytes(args.syscall_arg(1), len)
    }
}

/// bind / connect exit: result and the raw socket address.
pub struct SockaddrExit;

impl Filler for SockaddrExit {
    fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
        args.push_i64(args.retval())?;
        let addr = args.syscall_arg(1);
        let len = args.syscall_arg(2).min(SOCKADDR_MAX) as usize;
        if addr == 0 || len == 0 {
            return args.push_empty();
        }
        args.push_user_bytes(addr, len)
    }
}

/// socketpair exit: result and the two descriptors.
pub struct SocketpairExit;

impl Filler for SocketpairExit {
    fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
        let res = args.retval();
        args.push_i64(res)?;
        let mut fds = [0u8; 8];
        if res == 0 {
            args.user().copy_from_user(args.syscall_arg(3), &mut fds)?;
        }
        let fd0 = i32::from_ne_bytes([fds[0], fds[1], fds[2], fds[3]]);
        let fd1 = i32::from_ne_bytes([fds[4], fds[5], fds[6], fds[7]]);
        args.push_i64(fd0 as i64)?;
        args.push_i64(fd1 as i64)
    }
}

/// Network receive: packet length and interface index.
pub struct NetifRx;

impl Filler for NetifRx {
    fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
        let pkt = args.call().packet.ok_or(FillError::Failure)?;
        args.push_u32(pkt.len)?;
        args.push_u32(pkt.ifindex as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_table::Schema;
    use crate::testing::FakeTask;
    use ktrace_core::{CallContext, EventType, FillStrategy, PacketInfo, Regs};

    fn regs(args: [u64; 6], ret: i64) -> Regs {
        Regs { args, ret, syscall_nr: 0 }
    }

    fn slot(buf: &[u8], i: usize) -> u16 {
        u16::from_ne_bytes([buf[i * 2], buf[i * 2 + 1]])
    }

    fn run(ty: EventType, call: &CallContext, task: &FakeTask<'_>, window: &mut [u8]) -> (Result<(), FillError>, u32, usize) {
        let info = Schema::builtin().event(ty).unwrap();
        let mut storage = vec![0u8; 4096];
        let mut args = FillerArgs::new(window, info.nparams(), call, task)
            .with_event_type(ty)
            .with_str_storage(&mut storage);
        let res = match info.fill {
            FillStrategy::Auto(src) => auto_fill(info, src, &mut args),
            FillStrategy::Custom(f) => f.fill(&mut args),
        };
        (res, args.written(), args.data_len())
    }

    #[test]
    fn test_auto_fill_close_enter() {
        let task = FakeTask::new(0);
        let call = CallContext::syscall(regs([7, 0, 0, 0, 0, 0], 0), nr::CLOSE as i64);
        let mut window = [0u8; 64];
        let (res, written, len) = run(EventType::SYSCALL_CLOSE_E, &call, &task, &mut window);
        assert_eq!(res, Ok(()));
        assert_eq!(written, 1);
        assert_eq!(len, 2 + 8);
        assert_eq!(&window[2..10], &7u64.to_ne_bytes());
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
    #[test]
    fn test_open_exit_reads_path() {
        let task = FakeTask::new(0).with_region(0x1000, b"/tmp/x\0");
        let call = CallContext::syscall(regs([0x1000, 0o2, 0o644, 0, 0, 0], 3), nr::OPEN as i64);
        let mut window = [0u8; 128];
        let (res, written, _) = run(EventType::SYSCALL_OPEN_X, &call, &task, &mut window);
        assert_eq!(res, Ok(()));
        assert_eq!(written, 4);
        assert_eq!(slot(&window, 1), 7);
        assert_eq!(&window[8 + 8..8 + 8 + 7], b"/tmp/x\0");
    }

    #[test]
    fn test_openat_shifts_arguments() {
        let task = FakeTask::new(0).with_region(0x2000, b"rel\0");
        let call = CallContext::syscall(regs([u64::MAX - 99, 0x2000, 0, 0, 0, 0], 4), nr::OPENAT as i64);
        let mut window = [0u8; 128];
        let (res, _, _) = run(EventType::SYSCALL_OPEN_X, &call, &task, &mut window);
        assert_eq!(res, Ok(()));
        assert_eq!(&window[16..20], b"rel\0");
    }

    #[test]
    fn test_read_exit_snaps_at_most_snaplen() {
        let data = vec![0xABu8; 200];
        let task = FakeTask::new(0).with_region(0x8000, &data);
        let call = CallContext::syscall(regs([3, 0x8000, 200, 0, 0, 0], 200), nr::READ as i64);
        let mut window = [0u8; 256];
        let (res, written, len) = run(EventType::SYSCALL_READ_X, &call, &task, &mut window);
        assert_eq!(res, Ok(()));
        assert_eq!(written, 2);
        assert_eq!(slot(&window, 1), 80);
        assert_eq!(len, 4 + 8 + 80);
    }

    #[test]
    fn test_read_exit_error_has_empty_data() {
        let task = FakeTask::new(0);
        let call = CallContext::syscall(regs([3, 0x8000, 200, 0, 0, 0], -9), nr::READ as i64);
        let mut window = [0u8; 64];
        let (res, written, _) = run(EventType::SYSCALL_READ_X, &call, &task, &mut window);
        assert_eq!(res, Ok(()));
        assert_eq!(written, 2);
        assert_eq!(slot(&window, 1), 0);
    }

    #[test]
    fn test_read_exit_bad_buffer_faults() {
        let task = FakeTask::new(0);
        let call = CallContext::syscall(regs([3, 0xdead_0000, 16, 0, 0, 0], 16), nr::READ as i64);
        let mut window = [0u8; 64];
        let (res, written, _) = run(EventType::SYSCALL_READ_X, &call, &task, &mut window);
        assert_eq!(res, Err(FillError::InvalidUserMemory));
        assert_eq!(written, 1);
    }

    #[test]
    fn test_connect_exit_clamps_sockaddr() {
        let sa = vec![2u8; 256];
        let task = FakeTask::new(0).with_region(0x3000, &sa);
        let call = CallContext::syscall(regs([5, 0x3000, 1000, 0, 0, 0], 0), nr::CONNECT as i64);
        let mut window = [0u8; 512];
        let (res, _, _) = run(EventType::SOCKET_CONNECT_X, &call, &task, &mut window);
        assert_eq!(res, Ok(()));
        assert_eq!(slot(&window, 1), 128);
    }

    #[test]
    fn test_netif_rx_needs_packet() {
        let task = FakeTask::new(0);
        let mut window = [0u8; 64];
        let call = CallContext::packet(PacketInfo { len: 1500, ifindex: 2 });
        let (res, written, _) = run(EventType::NETIF_RX_E, &call, &task, &mut window);
        assert_eq!(res, Ok(()));
        assert_eq!(written, 2);
        assert_eq!(&window[4..8], &1500u32.to_ne_bytes());

        let call = CallContext::default();
        let (res, _, _) = run(EventType::NETIF_RX_E, &call, &task, &mut window);
        assert_eq!(res, Err(FillError::Failure));
    }
}

//! Hook callbacks.
//!
//! What a `HookRegistry` calls when an installed hook fires. Each probe
//! turns the raw callback arguments into an event type plus a
//! `CallContext` and hands them to the recorder.

use ktrace_core::{CallContext, EventType, HookRegistry, PacketInfo, Regs, TaskContext};

use crate::engine::Engine;

impl<H: HookRegistry> Engine<H> {
    /// Syscall entry. `id` is the syscall number as the hook saw it.
    pub fn syscall_enter_probe<T: TaskContext>(&self, task: &T, regs: &Regs, id: i64) {
        if task.is_compat() {
            return;
        }
        let pair = self.schema.syscall(id);
        let ty = if pair.used { pair.enter } else { EventType::GENERIC_E };
        self.record_event(task, ty, &CallContext::syscall(*regs, id));
    }

    /// Syscall exit. The syscall number comes from the saved registers.
    pub fn syscall_exit_probe<T: TaskContext>(&self, task: &T, regs: &Regs) {
        if task.is_compat() {
            return;
        }
        let id = regs.syscall_nr;
        let pair = self.schema.syscall(id);
        let ty = if pair.used { pair.exit } else { EventType::GENERIC_X };
        self.record_event(task, ty, &CallContext::syscall(*regs, id));
    }

    /// Process exit with the task's exit status.
    pub fn procexit_probe<T: TaskContext>(&self, task: &T, exit_status: i64) {
        if task.is_kernel_thread() {
            return;
        }
        let regs = Regs {
            ret: exit_status,
            ..Regs::default()
        };
        self.record_event(task, EventType::PROCEXIT_E, &CallContext::syscall(regs, -1));
    }

    /// A packet handed to the network receive path.
    pub fn netif_rx_probe<T: TaskContext>(&self, task: &T, packet: PacketInfo) {
        self.record_event(task, EventType::NETIF_RX_E, &CallContext::packet(packet));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::shm::page_size;
    use crate::syscall_table::nr;
    use crate::testing::{FakeTask, RecordingHooks};
    use ktrace_core::{EventHeader, HEADER_SIZE};

    fn engine() -> Engine<RecordingHooks> {
        let config = EngineConfig::new().ring_size(2 * page_size()).num_rings(1);
        let e = Engine::new(config, RecordingHooks::new()).unwrap();
        e.open(0).unwrap();
        e
    }

    /// Event types of every committed record, in order.
    fn recorded(e: &Engine<RecordingHooks>) -> Vec<EventType> {
        let ring = &e.rings[0];
        let head = ring.stats().head as usize;
        let bytes = unsafe { std::slice::from_raw_parts(ring.buf_ptr(), head) };
        let mut out = Vec::new();
        let mut off = 0;
        while off < head {
            let hdr = EventHeader::read_from(&bytes[off..]).unwrap();
            out.push(hdr.event_type);
            off += hdr.len as usize;
        }
        out
    }

    fn regs(args: [u64; 6], ret: i64, nr: i64) -> Regs {
        Regs { args, ret, syscall_nr: nr }
    }

    #[test]
    fn test_traced_syscall_pair() {
        let e = engine();
        let task = FakeTask::new(0);
        let r = regs([4, 0, 0, 0, 0, 0], 0, nr::CLOSE as i64);
        e.syscall_enter_probe(&task, &r, nr::CLOSE as i64);
        e.syscall_exit_probe(&task, &r);
        assert_eq!(recorded(&e), vec![EventType::SYSCALL_CLOSE_E, EventType::SYSCALL_CLOSE_X]);
    }

    #[test]
    fn test_untraced_and_out_of_range_are_generic() {
        let e = engine();
        let task = FakeTask::new(0);
        for id in [-1i64, 100_000] {
            let r = regs([0; 6], 0, id);
            e.syscall_enter_probe(&task, &r, id);
            e.syscall_exit_probe(&task, &r);
        }
        assert_eq!(
            recorded(&e),
            vec![EventType::GENERIC_E, EventType::GENERIC_X, EventType::GENERIC_E, EventType::GENERIC_X]
        );
        // Generic records carry the syscall id as a u16.
        assert_eq!(e.stats(0).unwrap().head as usize, 4 * (HEADER_SIZE + 2 + 2));
    }

    #[test]
    fn test_compat_tasks_are_skipped() {
        let e = engine();
        let mut task = FakeTask::new(0);
        task.compat = true;
        let r = regs([4, 0, 0, 0, 0, 0], 0, nr::CLOSE as i64);
        e.syscall_enter_probe(&task, &r, nr::CLOSE as i64);
        e.syscall_exit_probe(&task, &r);
        assert!(recorded(&e).is_empty());
        assert_eq!(e.stats(0).unwrap().drops(), 0);
    }

    #[test]
    fn test_procexit_skips_kernel_threads() {
        let e = engine();
        let mut kthread = FakeTask::new(0);
        kthread.kernel_thread = true;
        e.procexit_probe(&kthread, 0);
        e.procexit_probe(&FakeTask::new(0), 3);
        assert_eq!(recorded(&e), vec![EventType::PROCEXIT_E]);

        let ring = &e.rings[0];
        let status = unsafe { std::slice::from_raw_parts(ring.buf_ptr().add(HEADER_SIZE + 2), 8) };
        assert_eq!(status, &3i64.to_ne_bytes());
    }

    #[test]
    fn test_netif_rx() {
        let e = engine();
        e.netif_rx_probe(&FakeTask::new(0), PacketInfo { len: 1500, ifindex: 2 });
        assert_eq!(recorded(&e), vec![EventType::NETIF_RX_E]);
        assert_eq!(e.stats(0).unwrap().head as usize, HEADER_SIZE + 4 + 4 + 4);
    }
}

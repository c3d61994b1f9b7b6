//! The recording hot path.
//!
//! Runs synchronously inside a hook callback. It never blocks, allocates,
//! or spins: every failure is a counted drop.
//!
//! ```text
//! take gate ─▶ Started? ─▶ free ≥ hdr + 2·nargs? ─▶ header ─▶ filler
//!     │            │                │                             │
//!  preempt       skip          drops_buffer          Ok && written == nargs
//!   drop                                                          │
//!                                          fold cushion spill ◀───┘
//!                                          store-release head
//! ```

use std::ptr;
use std::slice;
use std::sync::atomic::Ordering;

use ktrace_core::{
    CallContext, EventHeader, EventType, FillError, FillStrategy, FillerArgs, HookRegistry,
    TaskContext, HEADER_SIZE,
};
use tracing::warn;

use crate::engine::Engine;
use crate::fillers::auto_fill;
use crate::ring::RingContext;

impl<H: HookRegistry> Engine<H> {
    /// Append one record of `event_type` to the ring of `task.cpu()`.
    pub fn record_event<T: TaskContext>(&self, task: &T, event_type: EventType, call: &CallContext) {
        let Some(ring) = self.rings.get(task.cpu()) else {
            return;
        };

        let Some(gate) = ring.try_enter() else {
            ring.info().n_preemptions.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if !ring.state().accepts_records() {
            return;
        }

        #[cfg(target_arch = "x86")]
        let (event_type, socketcall_args) = crate::socketcall::adjust(task, event_type, call);
        #[cfg(not(target_arch = "x86"))]
        let socketcall_args: Option<[u64; 6]> = None;

        // Safety: we hold the gate, and the storage is only borrowed here.
        let str_storage = unsafe { ring.str_storage(&gate) };
        self.write_record(ring, task, event_type, call, socketcall_args, str_storage);
        drop(gate);
    }

    fn write_record<T: TaskContext>(
        &self,
        ring: &RingContext,
        task: &T,
        event_type: EventType,
        call: &CallContext,
        socketcall_args: Option<[u64; 6]>,
        str_storage: &mut [u8],
    ) {
        let info = ring.info();

        let Some(evt) = self.schema.event(event_type) else {
            if cfg!(debug_assertions) {
                warn!(event_type = event_type.0, "event type outside the schema");
            }
            info.n_drops_buffer.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let capacity = ring.capacity();
        let head = info.head.load(Ordering::Relaxed);
        let tail = info.tail.load(Ordering::Acquire);
        let free = ktrace_core::ring::free_space(head, tail, capacity) as usize;

        let nargs = evt.nparams();
        if free < HEADER_SIZE + nargs as usize * 2 {
            info.n_drops_buffer.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let record_len = free.min(2 * self.page_size);
        debug_assert!(head as usize + record_len <= ring.buf_len());
        let ts = task.now_ns();
        let seq = ring.nevents.load(Ordering::Relaxed);

        // Safety: head < capacity and record_len <= 2 pages, so the slice
        // lies within ring bytes + cushion. Only the gate holder writes
        // there, and the consumer never reads past head.
        let record = unsafe { slice::from_raw_parts_mut(ring.buf_ptr().add(head as usize), record_len) };
        let (hdr, window) = record.split_at_mut(HEADER_SIZE);
        EventHeader::new(ts, task.tid(), event_type, seq).write_to(hdr);

        let mut args = FillerArgs::new(window, nargs, call, task)
            .with_event_type(event_type)
            .with_str_storage(str_storage)
            .with_sequence(seq)
            .with_socketcall_args(socketcall_args)
            .with_snaplen(self.config.snaplen);

        let res = match evt.fill {
            FillStrategy::Auto(sources) => auto_fill(evt, sources, &mut args),
            FillStrategy::Custom(filler) => filler.fill(&mut args),
        };
        let written = args.written();
        let data_len = args.data_len();

        match res {
            Ok(()) if written == nargs => {
                let len = HEADER_SIZE + data_len;
                EventHeader::set_len(hdr, len as u32);
                self.commit(ring, head, len);
            }
            Ok(()) => {
                warn!(
                    event = evt.name,
                    event_type = event_type.0,
                    written,
                    expected = nargs,
                    "corrupted filler: wrong number of parameters"
                );
                info.n_drops_buffer.fetch_add(1, Ordering::Relaxed);
            }
            Err(FillError::InvalidUserMemory) => {
                info.n_drops_pf.fetch_add(1, Ordering::Relaxed);
            }
            Err(FillError::BufferFull) | Err(FillError::Failure) => {
                info.n_drops_buffer.fetch_add(1, Ordering::Relaxed);
            }
        }

        #[cfg(debug_assertions)]
        self.log_utilization(ring, ts);
    }

    /// Publish a fully written record of `len` bytes starting at `head`.
    fn commit(&self, ring: &RingContext, head: u32, len: usize) {
        let capacity = ring.capacity() as usize;
        let mut next = head as usize + len;

        if next >= capacity {
            let spill = next - capacity;
            if spill > 0 {
                // Safety: [capacity, capacity + spill) is cushion written by
                // this record; [0, spill) is free space (len <= free).
                unsafe {
                    let base = ring.buf_ptr();
                    ptr::copy_nonoverlapping(base.add(capacity), base, spill);
                }
            }
            next -= capacity;
        }

        let info = ring.info();
        info.head.store(next as u32, Ordering::Release);
        info.n_evts.fetch_add(1, Ordering::Relaxed);
        ring.nevents.fetch_add(1, Ordering::Relaxed);
    }

    /// At most once a second per ring.
    #[cfg(debug_assertions)]
    fn log_utilization(&self, ring: &RingContext, now: u64) {
        const INTERVAL_NS: u64 = 1_000_000_000;

        let last = ring.last_print_ns.load(Ordering::Relaxed);
        if now.saturating_sub(last) < INTERVAL_NS {
            return;
        }
        ring.last_print_ns.store(now, Ordering::Relaxed);

        let s = ring.stats();
        tracing::debug!(
            cpu = ring.cpu(),
            used_pct = s.used_pct(),
            events = s.events,
            drops_buffer_full = s.drops_buffer_full,
            drops_invalid_memory = s.drops_invalid_memory,
            drops_preemption = s.drops_preemption,
            "ring utilization"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::event_table::{Schema, EVENT_TABLE};
    use crate::shm::page_size;
    use crate::testing::{FakeTask, RecordingHooks};
    use ktrace_core::{EventInfo, Filler, ParamInfo, ParamType, Regs};

    fn engine(pages: usize) -> Engine<RecordingHooks> {
        let config = EngineConfig::new().ring_size(pages * page_size()).num_rings(2);
        Engine::new(config, RecordingHooks::new()).unwrap()
    }

    fn engine_with(schema: Schema) -> Engine<RecordingHooks> {
        let config = EngineConfig::new().ring_size(2 * page_size()).num_rings(1);
        Engine::with_schema(config, RecordingHooks::new(), schema).unwrap()
    }

    /// Bytes of ring 0, header at `offset`.
    fn header_at(e: &Engine<RecordingHooks>, offset: usize) -> EventHeader {
        let ring = &e.rings[0];
        let bytes = unsafe { slice::from_raw_parts(ring.buf_ptr().add(offset), HEADER_SIZE) };
        EventHeader::read_from(bytes).unwrap()
    }

    fn close_call(fd: u64) -> CallContext {
        CallContext::syscall(Regs { args: [fd, 0, 0, 0, 0, 0], ret: 0, syscall_nr: 0 }, 0)
    }

    /// One 40-byte parameter: records are HEADER_SIZE + 2 + 40 bytes.
    struct Fixed40;
    impl Filler for Fixed40 {
        fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
            args.push_bytes(&[0x11; 40])
        }
    }

    /// Declares two parameters, pushes one.
    struct ShortFiller;
    impl Filler for ShortFiller {
        fn fill(&self, args: &mut FillerArgs<'_>) -> Result<(), FillError> {
            args.push_u32(1)
        }
    }

    fn schema_with(slot: EventType, info: EventInfo) -> Schema {
        let mut events = EVENT_TABLE.to_vec();
        events[slot.as_index()] = info;
        Schema {
            events: Box::leak(events.into_boxed_slice()),
            ..Schema::builtin()
        }
    }

    #[test]
    fn test_commit_writes_header_and_advances_head() {
        let e = engine(2);
        e.open(0).unwrap();
        let task = FakeTask::new(0).with_clock(5_000);
        e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(9));

        let s = e.stats(0).unwrap();
        let expected = (HEADER_SIZE + 2 + 8) as u32;
        assert_eq!(s.head, expected);
        assert_eq!(s.events, 1);
        assert_eq!(s.drops(), 0);

        let hdr = header_at(&e, 0);
        assert_eq!(hdr.ts, 5_000);
        assert_eq!(hdr.tid, task.tid);
        assert_eq!(hdr.len, expected);
        assert_eq!(hdr.event_type, EventType::SYSCALL_CLOSE_E);

        // Ring 1 untouched.
        assert_eq!(e.stats(1).unwrap().head, 0);
    }

    #[test]
    fn test_fill_to_capacity_then_drop() {
        // HEADER_SIZE + 2 + 40 = 64 bytes without the sentinel.
        let schema = schema_with(
            EventType::SYSCALL_CLOSE_E,
            EventInfo {
                name: "fixed",
                params: &[ParamInfo { name: "blob", ty: ParamType::ByteBuf }],
                fill: FillStrategy::Custom(&Fixed40),
            },
        );
        let e = engine_with(schema);
        e.open(0).unwrap();
        let task = FakeTask::new(0);

        let rec = HEADER_SIZE + 2 + 40;
        let cap = e.ring_size();
        let fits = (cap - 1) / rec;
        for _ in 0..fits {
            e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(0));
        }
        let s = e.stats(0).unwrap();
        assert_eq!(s.events as usize, fits);
        assert_eq!(s.drops_buffer_full, 0);

        e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(0));
        let s = e.stats(0).unwrap();
        assert_eq!(s.events as usize, fits);
        assert_eq!(s.drops_buffer_full, 1);
        assert!(s.used as usize <= cap - 1);
    }

    #[cfg(not(feature = "sentinel"))]
    #[test]
    fn test_two_page_ring_holds_127_records() {
        if page_size() != 4096 {
            return;
        }
        let schema = schema_with(
            EventType::SYSCALL_CLOSE_E,
            EventInfo {
                name: "fixed",
                params: &[ParamInfo { name: "blob", ty: ParamType::ByteBuf }],
                fill: FillStrategy::Custom(&Fixed40),
            },
        );
        let e = engine_with(schema);
        e.open(0).unwrap();
        let task = FakeTask::new(0);
        for _ in 0..128 {
            e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(0));
        }
        let s = e.stats(0).unwrap();
        assert_eq!(s.events, 127);
        assert_eq!(s.drops_buffer_full, 1);
        assert_eq!(s.head, 127 * 64);
    }

    #[test]
    fn test_wrapping_record_is_folded() {
        let e = engine(2);
        e.open(0).unwrap();
        let cap = e.ring_size() as u32;
        let info = e.rings[0].info();

        // Pretend the consumer has drained up to near the end.
        let start = cap - 10;
        info.head.store(start, Ordering::Relaxed);
        info.tail.store(start, Ordering::Relaxed);

        let task = FakeTask::new(0);
        e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(0xABCD));

        let len = (HEADER_SIZE + 2 + 8) as u32;
        let s = e.stats(0).unwrap();
        assert_eq!(s.head, start + len - cap);
        assert_eq!(s.used, len);

        // The spilled tail of the record now sits at the physical start.
        let ring = &e.rings[0];
        let spill = (len - 10) as usize;
        unsafe {
            let base = ring.buf_ptr();
            let front = slice::from_raw_parts(base, spill);
            let cushion = slice::from_raw_parts(base.add(cap as usize), spill);
            assert_eq!(front, cushion);
            assert_eq!(&front[spill - 8..], &0xABCDu64.to_ne_bytes());
        }
    }

    #[test]
    fn test_varying_records_keep_offsets_in_range() {
        use crate::mapping::MapRequest;
        use ktrace_core::ring::{free_space, used_space};
        use std::collections::VecDeque;

        let e = engine(2);
        e.open(0).unwrap();
        let cap = e.ring_size() as u32;
        let ctl = e.mmap(0, MapRequest::control(e.page_size())).unwrap();
        let view = e.mmap(0, MapRequest::buffer(e.ring_size())).unwrap();
        let bytes = view.bytes().unwrap();
        let task = FakeTask::new(0).with_region(0x1000, &[0x5a; 128]);

        let mut pending = VecDeque::new();
        let mut committed = 0u64;
        let mut wrapped = 0;
        let mut last_head = 0;
        let mut i = 0u64;
        while wrapped < 3 {
            assert!(i < 1_000_000, "only {} wraps", wrapped);
            let n = (i * 13) % 81;
            i += 1;
            let call = CallContext::syscall(Regs { args: [3, 0x1000, 128, 0, 0, 0], ret: n as i64, syscall_nr: 0 }, 0);
            e.record_event(&task, EventType::SYSCALL_READ_X, &call);
            committed += 1;
            pending.push_back(HEADER_SIZE + 4 + 8 + n as usize);

            let s = ctl.stats().unwrap();
            assert_eq!(s.events, committed, "record {} dropped", i);
            assert!(s.head < cap && s.tail < cap);
            assert_eq!(s.used + free_space(s.head, s.tail, cap), cap - 1);
            assert_eq!(s.used, used_space(s.head, s.tail, cap));
            if s.head < last_head {
                wrapped += 1;
            }
            last_head = s.head;

            // Consume oldest records until a worst-case record fits again.
            let mut tail = s.tail;
            while free_space(s.head, tail, cap) < 256 {
                let len = pending.pop_front().unwrap();
                let hdr = EventHeader::read_from(&bytes[tail as usize..]).unwrap();
                assert_eq!(hdr.len as usize, len);
                assert_eq!(hdr.event_type, EventType::SYSCALL_READ_X);
                tail = ((tail as usize + len) % cap as usize) as u32;
                assert!(ctl.set_tail(tail));
            }
        }
        assert_eq!(e.stats(0).unwrap().drops(), 0);
    }

    #[test]
    fn test_nested_callback_is_dropped() {
        let e = engine(2);
        e.open(0).unwrap();
        let inner = FakeTask::new(0);
        let call = CallContext::syscall(Regs { args: [3, 0x1000, 4, 0, 0, 0], ret: 4, syscall_nr: 0 }, 0);
        let outer = FakeTask::new(0)
            .with_region(0x1000, b"data")
            .on_user_read(|| e.record_event(&inner, EventType::SYSCALL_CLOSE_E, &close_call(1)));

        e.record_event(&outer, EventType::SYSCALL_READ_X, &call);

        let s = e.stats(0).unwrap();
        assert_eq!(s.drops_preemption, 1);
        assert_eq!(s.events, 1);
        let hdr = header_at(&e, 0);
        assert_eq!(hdr.event_type, EventType::SYSCALL_READ_X);
        assert_eq!(hdr.len as usize, HEADER_SIZE + 4 + 8 + 4);
    }

    #[test]
    fn test_invalid_user_memory_counts_pf_drop() {
        let e = engine(2);
        e.open(0).unwrap();
        let task = FakeTask::new(0);
        let call = CallContext::syscall(Regs { args: [3, 0xbad0, 16, 0, 0, 0], ret: 16, syscall_nr: 0 }, 0);
        e.record_event(&task, EventType::SYSCALL_READ_X, &call);
        let s = e.stats(0).unwrap();
        assert_eq!(s.drops_invalid_memory, 1);
        assert_eq!(s.events, 0);
        assert_eq!(s.head, 0);
    }

    #[test]
    fn test_wrong_arity_is_dropped() {
        let schema = schema_with(
            EventType::SYSCALL_CLOSE_E,
            EventInfo {
                name: "short",
                params: &[
                    ParamInfo { name: "a", ty: ParamType::Uint32 },
                    ParamInfo { name: "b", ty: ParamType::Uint32 },
                ],
                fill: FillStrategy::Custom(&ShortFiller),
            },
        );
        let e = engine_with(schema);
        e.open(0).unwrap();
        e.record_event(&FakeTask::new(0), EventType::SYSCALL_CLOSE_E, &close_call(0));
        let s = e.stats(0).unwrap();
        assert_eq!(s.drops_buffer_full, 1);
        assert_eq!(s.events, 0);
        assert_eq!(s.head, 0);
    }

    #[test]
    fn test_paused_ring_keeps_data_and_rejects_writes() {
        let e = engine(2);
        e.open(0).unwrap();
        let task = FakeTask::new(0);
        e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(1));
        let before = e.stats(0).unwrap();

        e.pause(0).unwrap();
        e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(2));
        assert_eq!(e.stats(0).unwrap(), before);

        e.resume(0).unwrap();
        e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(3));
        assert_eq!(e.stats(0).unwrap().events, 2);
    }

    #[test]
    fn test_stopped_ring_and_bad_cpu_are_ignored() {
        let e = engine(2);
        e.record_event(&FakeTask::new(0), EventType::SYSCALL_CLOSE_E, &close_call(1));
        e.record_event(&FakeTask::new(7), EventType::SYSCALL_CLOSE_E, &close_call(1));
        assert_eq!(e.stats(0).unwrap(), crate::ring::RingStats {
            capacity: e.ring_size() as u32,
            ..Default::default()
        });
    }

    #[test]
    fn test_unknown_event_type_counts_drop() {
        let e = engine(2);
        e.open(0).unwrap();
        e.record_event(&FakeTask::new(0), EventType(EventType::MAX + 3), &close_call(1));
        assert_eq!(e.stats(0).unwrap().drops_buffer_full, 1);
    }

    #[test]
    fn test_sequence_numbers_follow_commits() {
        let e = engine(2);
        e.open(0).unwrap();
        let task = FakeTask::new(0);
        for fd in 0..3 {
            e.record_event(&task, EventType::SYSCALL_CLOSE_E, &close_call(fd));
        }
        assert_eq!(e.rings[0].nevents.load(Ordering::Relaxed), 3);
    }
}

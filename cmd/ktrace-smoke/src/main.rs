//! ktrace End-to-End Smoke Test
//!
//! Exercises the full ktrace stack in one process:
//!   Part A: Engine: config, ring allocation, control codes
//!   Part B: Admission: open/close drive hook registration
//!   Part C: Recorder: real syscalls replayed through the probes
//!   Part D: Consumer: control page, doubled view, reader, drop counters
//!
//! Run: RUST_LOG=ktrace_module=debug ./target/release/ktrace-smoke
//! No privileges needed.

use ktrace_core::{CaptureState, EventType, HookKind, PacketInfo, Regs, TaskContext};

use ktrace_module::config::defaults;
use ktrace_module::syscall_table::nr;
use ktrace_module::{
    merge_by_timestamp, CurrentThread, DefaultEngine, EngineBuilder, EngineError, MapError,
    MapRequest, RingReader, DISABLE_CAPTURE, ENABLE_CAPTURE,
};

use nix::sys::mman::ProtFlags;
use tracing_subscriber::EnvFilter;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

fn build_engine(page: usize) -> Result<DefaultEngine, EngineError> {
    // sched_getcpu can exceed the online count under a sparse cpuset.
    let rings = defaults::num_rings().max(CurrentThread::new().cpu() + 1);
    EngineBuilder::new()
        .ring_size(16 * page)
        .num_rings(rings)
        .build()
}

// ════════════════════════════════════════════════════════════
// Part A: Engine
// ════════════════════════════════════════════════════════════

fn test_engine(t: &mut TestRunner) -> Option<DefaultEngine> {
    t.section("Part A: Engine");

    let page = ktrace_module::shm::page_size();
    let bad = EngineBuilder::new().ring_size(page).num_rings(1).build();
    t.check(
        "ring smaller than two pages is rejected",
        matches!(bad, Err(EngineError::Config(_))),
        "engine was built",
    );

    let engine = match build_engine(page) {
        Ok(e) => {
            tracing::debug!(rings = e.n_rings(), ring_size = e.ring_size(), "smoke engine ready");
            t.pass(&format!("engine with {} rings of {} bytes", e.n_rings(), e.ring_size()));
            e
        }
        Err(e) => {
            t.fail("engine allocation", &e.to_string());
            return None;
        }
    };

    let all_stopped = (0..engine.n_rings()).all(|r| engine.state(r) == Ok(CaptureState::Stopped));
    t.check("all rings start Stopped", all_stopped, "ring not Stopped");

    t.check(
        "control codes are _IO('s', 0/1)",
        DISABLE_CAPTURE == 0x7300 && ENABLE_CAPTURE == 0x7301,
        &format!("{:#x} {:#x}", DISABLE_CAPTURE, ENABLE_CAPTURE),
    );

    Some(engine)
}

// ════════════════════════════════════════════════════════════
// Part B: Admission
// ════════════════════════════════════════════════════════════

fn test_admission(t: &mut TestRunner, e: &DefaultEngine) -> bool {
    t.section("Part B: Admission (all-rings policy)");

    let n = e.n_rings();
    for r in 0..n.saturating_sub(1) {
        if let Err(err) = e.open(r) {
            t.fail("open ring", &err.to_string());
            return false;
        }
    }
    t.check(
        "hooks not installed before last ring opens",
        n == 1 || !e.hooks().any_installed(),
        "hooks installed early",
    );

    if let Err(err) = e.open(n - 1) {
        t.fail("open last ring", &err.to_string());
        return false;
    }
    let all = HookKind::ALL.iter().all(|h| e.hooks().is_installed(*h));
    t.check("all four hooks installed", all, "missing hook");

    t.check(
        "second open is rejected",
        e.open(0) == Err(EngineError::AlreadyOpen(0)),
        "open succeeded",
    );

    let paused = e.ioctl(0, DISABLE_CAPTURE).is_ok() && e.state(0) == Ok(CaptureState::Inactive);
    let resumed = e.ioctl(0, ENABLE_CAPTURE).is_ok() && e.state(0) == Ok(CaptureState::Started);
    t.check("DISABLE / ENABLE capture", paused && resumed, "state did not follow");
    t.check(
        "unknown control code",
        matches!(e.ioctl(0, 0xdead), Err(EngineError::UnsupportedControl(0xdead))),
        "accepted",
    );
    true
}

// ════════════════════════════════════════════════════════════
// Part C: Recorder
// ════════════════════════════════════════════════════════════

/// Read from a pipe and replay the call through the syscall probes.
fn replay_read(e: &DefaultEngine, task: &CurrentThread, payload: &[u8]) -> Option<usize> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return None;
    }
    let mut buf = [0u8; 128];
    let n = unsafe {
        libc::write(fds[1], payload.as_ptr() as *const libc::c_void, payload.len());
        libc::read(fds[0], buf.as_mut_ptr() as *mut libc::c_void, buf.len())
    };

    let args = [fds[0] as u64, buf.as_ptr() as u64, buf.len() as u64, 0, 0, 0];
    let enter = Regs { args, ret: 0, syscall_nr: nr::READ as i64 };
    e.syscall_enter_probe(task, &enter, nr::READ as i64);
    let exit = Regs { ret: n as i64, ..enter };
    e.syscall_exit_probe(task, &exit);

    for fd in fds {
        let regs = Regs { args: [fd as u64, 0, 0, 0, 0, 0], ret: 0, syscall_nr: nr::CLOSE as i64 };
        e.syscall_enter_probe(task, &regs, nr::CLOSE as i64);
        let rc = unsafe { libc::close(fd) };
        e.syscall_exit_probe(task, &Regs { ret: rc as i64, ..regs });
    }
    (n >= 0).then_some(n as usize)
}

fn test_recorder(t: &mut TestRunner, e: &DefaultEngine) {
    t.section("Part C: Recorder");

    let task = CurrentThread::new();
    let payload = b"ktrace-smoke payload";
    let n = replay_read(e, &task, payload);
    t.check("pipe read replayed", n == Some(payload.len()), &format!("{:?}", n));

    e.procexit_probe(&task, 0);
    e.netif_rx_probe(&task, PacketInfo { len: 1500, ifindex: 1 });
    // Untraced: recorded as generic.
    let regs = Regs { syscall_nr: 100_000, ..Regs::default() };
    e.syscall_enter_probe(&task, &regs, 100_000);
    e.syscall_exit_probe(&task, &regs);

    let compat = CurrentThread::new().compat(true);
    e.syscall_enter_probe(&compat, &regs, 100_000);

    let events: u64 = (0..e.n_rings()).filter_map(|r| e.stats(r).ok()).map(|s| s.events).sum();
    t.check("10 records committed", events == 10, &format!("{} records", events));
}

// ════════════════════════════════════════════════════════════
// Part D: Consumer
// ════════════════════════════════════════════════════════════

fn test_consumer(t: &mut TestRunner, e: &DefaultEngine) {
    t.section("Part D: Consumer");

    let bad_len = e.mmap(0, MapRequest { pgoff: 0, length: 3 * e.page_size(), prot: ProtFlags::PROT_READ });
    t.check(
        "odd mapping length rejected",
        matches!(bad_len, Err(EngineError::Map(MapError::InvalidLength { .. }))),
        "mapped",
    );
    let mut rw = MapRequest::buffer(e.ring_size());
    rw.prot |= ProtFlags::PROT_WRITE;
    t.check(
        "writable buffer view rejected",
        e.mmap(0, rw).err() == Some(EngineError::Map(MapError::WritableBuffer)),
        "mapped",
    );

    let readers: Vec<RingReader> = match (0..e.n_rings()).map(|r| RingReader::open(e, r)).collect() {
        Ok(r) => r,
        Err(err) => {
            t.fail("map rings", &err.to_string());
            return;
        }
    };
    t.pass("control page and buffer view mapped");

    let mut types = Vec::new();
    let mut last_ts = 0;
    let mut ordered = true;
    let mut data_ok = false;
    let merged = merge_by_timestamp(&readers, |_, ev| {
        ordered &= ev.header.ts >= last_ts;
        last_ts = ev.header.ts;
        types.push(ev.header.event_type);
        if ev.header.event_type == EventType::SYSCALL_READ_X {
            data_ok = ev.param(1) == Some(&b"ktrace-smoke payload"[..]);
        }
    });
    t.check("merged drain", merged == Ok(10), &format!("{:?}", merged));
    t.check("timestamps non-decreasing", ordered, "out of order");
    t.check("read exit carries the payload", data_ok, "payload mismatch");
    t.check(
        "syscall pairs in order",
        types.starts_with(&[EventType::SYSCALL_READ_E, EventType::SYSCALL_READ_X]),
        &format!("{:?}", types.first()),
    );

    // A bad user pointer is a counted drop, not a crash.
    let task = CurrentThread::new();
    let regs = Regs { args: [3, 8, 64, 0, 0, 0], ret: 64, syscall_nr: nr::READ as i64 };
    e.syscall_exit_probe(&task, &regs);
    let pf: u64 = (0..e.n_rings()).filter_map(|r| e.stats(r).ok()).map(|s| s.drops_invalid_memory).sum();
    t.check("invalid memory counted", pf == 1, &format!("{} drops", pf));

    let used: u32 = readers.iter().map(|r| r.stats().used).sum();
    t.check("rings drained", used == 0, &format!("{} bytes left", used));
}

fn close_all(t: &mut TestRunner, e: &DefaultEngine) {
    t.section("Teardown");
    let closed = (0..e.n_rings()).all(|r| e.close(r).is_ok());
    t.check("all rings closed", closed, "close failed");
    t.check("hooks removed", !e.hooks().any_installed(), "hooks still installed");
    t.check(
        "close while stopped rejected",
        e.close(0) == Err(EngineError::NotOpen(0)),
        "close succeeded",
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("ktrace smoke test");
    let mut t = TestRunner::new();

    if let Some(engine) = test_engine(&mut t) {
        if test_admission(&mut t, &engine) {
            test_recorder(&mut t, &engine);
            test_consumer(&mut t, &engine);
        }
        close_all(&mut t, &engine);
    }

    t.summary();
    std::process::exit(if t.failed == 0 { 0 } else { 1 });
}

//! Library defaults for `EngineConfig`.

/// Bytes of ring per CPU.
pub const RING_BUF_SIZE: usize = 8 * 1024 * 1024;

/// Bytes snapshotted from read/write/send/recv data buffers.
pub const SNAPLEN: usize = ktrace_core::constants::RW_SNAPLEN;

pub const ADMISSION: super::AdmissionPolicy = super::AdmissionPolicy::AllRings;

/// One ring per online CPU.
pub fn num_rings() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n > 0 {
        n as usize
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

//! Capture control: open / close / pause / resume per ring.
//!
//! ```text
//!            open                 pause
//! Stopped ─────────▶ Started ──────────▶ Inactive
//!    ▲                  ▲  ◀──────────      │
//!    │     close        │      resume       │ close
//!    └──────────────────┴───────────────────┘
//! ```
//!
//! State transitions are single atomic operations on the ring's state
//! byte, so two racing opens of one ring cannot both succeed. The open
//! count and the hook calls it triggers move together under the engine's
//! admission lock.

use std::sync::atomic::Ordering;

use ktrace_core::{CaptureState, HookRegistry};
use tracing::info;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// `_IO('s', 0)`: stop writing to a ring, keep it open.
pub const DISABLE_CAPTURE: u64 = nix::request_code_none!(b's', 0) as u64;
/// `_IO('s', 1)`: resume writing to a paused ring.
pub const ENABLE_CAPTURE: u64 = nix::request_code_none!(b's', 1) as u64;

impl<H: HookRegistry> Engine<H> {
    /// Start capturing into `ring`.
    ///
    /// The ring is emptied and its counters zeroed. If this open satisfies
    /// the admission policy, the hooks are installed; when that fails the
    /// ring stays open and must still be closed.
    pub fn open(&self, ring: usize) -> Result<()> {
        let ctx = self.ring(ring)?;
        ctx.state_cell()
            .compare_exchange(
                CaptureState::Stopped as u8,
                CaptureState::Inactive as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| EngineError::AlreadyOpen(ring))?;

        ctx.reset();
        ctx.state_cell().store(CaptureState::Started as u8, Ordering::Release);

        let _admission = self.admission_lock();
        let open = self.open_count.fetch_add(1, Ordering::AcqRel) + 1;
        info!(ring, open, "capture started");

        if self.config.admission.should_register(open, self.n_rings()) {
            self.register_hooks()?;
        }
        Ok(())
    }

    /// Stop capturing into `ring`. Closing the last open ring removes the
    /// hooks.
    pub fn close(&self, ring: usize) -> Result<()> {
        let ctx = self.ring(ring)?;
        ctx.state_cell()
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (CaptureState::from(s) != CaptureState::Stopped).then_some(CaptureState::Stopped as u8)
            })
            .map_err(|_| EngineError::NotOpen(ring))?;

        let stats = ctx.stats();
        info!(
            ring,
            events = stats.events,
            drops_buffer_full = stats.drops_buffer_full,
            drops_invalid_memory = stats.drops_invalid_memory,
            drops_preemption = stats.drops_preemption,
            "capture stopped"
        );

        let _admission = self.admission_lock();
        if self.open_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.unregister_hooks();
        }
        Ok(())
    }

    /// Stop writing to `ring` without closing it. Committed records stay
    /// readable. Idempotent.
    pub fn pause(&self, ring: usize) -> Result<()> {
        self.set_active(ring, false)
    }

    /// Undo `pause`. Idempotent.
    pub fn resume(&self, ring: usize) -> Result<()> {
        self.set_active(ring, true)
    }

    fn set_active(&self, ring: usize, active: bool) -> Result<()> {
        let ctx = self.ring(ring)?;
        let target = if active {
            CaptureState::Started
        } else {
            CaptureState::Inactive
        };
        let prev = ctx
            .state_cell()
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                CaptureState::from(s).is_open().then_some(target as u8)
            })
            .map_err(|_| EngineError::NotOpen(ring))?;

        if CaptureState::from(prev) != target {
            info!(ring, state = %target, "capture state changed");
        }
        Ok(())
    }

    /// Raw control request on `ring`.
    pub fn ioctl(&self, ring: usize, request: u64) -> Result<()> {
        match request {
            DISABLE_CAPTURE => self.pause(ring),
            ENABLE_CAPTURE => self.resume(ring),
            other => Err(EngineError::UnsupportedControl(other)),
        }
    }
}

//! `Engine`: owns the per-CPU rings and wires them to the hooks.
//!
//! This is the composition point. The hook registry is a generic
//! parameter with a default; the schema is a pair of static tables.
//!
//! ```text
//! Engine<H: HookRegistry = HookTable>
//!   rings:  [RingContext; num_rings]   one per CPU, indexed by task.cpu()
//!   hooks:  H                          installed per AdmissionPolicy
//!   schema: Schema                     event table + syscall table
//! ```
//!
//! All shared memory is allocated in `Engine::new`. Nothing on the
//! recording path allocates.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use ktrace_core::{CaptureState, HookKind, HookRegistry};
use tracing::{error, info};

use crate::config::{AdmissionPolicy, EngineConfig};
use crate::error::{EngineError, Result};
use crate::event_table::Schema;
use crate::hooks::HookTable;
use crate::ring::{RingContext, RingStats};
use crate::shm;

pub struct Engine<H: HookRegistry = HookTable> {
    pub(crate) config: EngineConfig,
    pub(crate) page_size: usize,
    pub(crate) rings: Box<[RingContext]>,
    /// Rings currently open.
    pub(crate) open_count: AtomicUsize,
    pub(crate) hooks: H,
    /// Whether our hooks are installed right now.
    pub(crate) hooks_live: AtomicBool,
    /// Held across an `open_count` change and the hook calls it triggers,
    /// so `hooks_live` always follows the count. Never taken by the recorder.
    pub(crate) admission: Mutex<()>,
    pub(crate) schema: Schema,
}

/// The engine with the default hook table.
pub type DefaultEngine = Engine<HookTable>;

impl<H: HookRegistry> Engine<H> {
    /// Validate `config` and allocate every ring.
    pub fn new(config: EngineConfig, hooks: H) -> Result<Self> {
        Self::with_schema(config, hooks, Schema::builtin())
    }

    pub fn with_schema(config: EngineConfig, hooks: H, schema: Schema) -> Result<Self> {
        let page_size = shm::page_size();
        config.validate(page_size)?;

        let mut rings = Vec::with_capacity(config.num_rings);
        for cpu in 0..config.num_rings {
            let ring = RingContext::new(cpu, config.ring_size as u32, page_size).map_err(|e| {
                error!(cpu, error = %e, "ring buffer allocation failed");
                EngineError::Alloc(e)
            })?;
            rings.push(ring);
        }

        info!(
            rings = config.num_rings,
            ring_size = config.ring_size,
            page_size,
            admission = %config.admission,
            "ring buffers initialized"
        );

        Ok(Self {
            config,
            page_size,
            rings: rings.into_boxed_slice(),
            open_count: AtomicUsize::new(0),
            hooks,
            hooks_live: AtomicBool::new(false),
            admission: Mutex::new(()),
            schema,
        })
    }

    #[inline]
    pub fn n_rings(&self) -> usize {
        self.rings.len()
    }

    #[inline]
    pub fn ring_size(&self) -> usize {
        self.config.ring_size
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::Acquire)
    }

    pub fn hooks_live(&self) -> bool {
        self.hooks_live.load(Ordering::Acquire)
    }

    pub(crate) fn ring(&self, ring: usize) -> Result<&RingContext> {
        self.rings.get(ring).ok_or(EngineError::InvalidRing {
            ring,
            n_rings: self.rings.len(),
        })
    }

    pub fn state(&self, ring: usize) -> Result<CaptureState> {
        Ok(self.ring(ring)?.state())
    }

    /// Counters and offsets of one ring.
    pub fn stats(&self, ring: usize) -> Result<RingStats> {
        Ok(self.ring(ring)?.stats())
    }

    /// Serialize admission decisions. A poisoned lock only means a
    /// previous holder panicked; the counters it guards are atomics.
    pub(crate) fn admission_lock(&self) -> MutexGuard<'_, ()> {
        self.admission.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install all hooks in order. On failure, the ones already installed
    /// are removed in reverse order and the error is returned.
    pub(crate) fn register_hooks(&self) -> Result<()> {
        if self
            .hooks_live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        for (i, kind) in HookKind::ALL.iter().copied().enumerate() {
            if let Err(source) = self.hooks.register(kind) {
                error!(hook = %kind, error = %source, "hook registration failed");
                for done in HookKind::ALL[..i].iter().rev() {
                    self.hooks.unregister(*done);
                }
                self.hooks_live.store(false, Ordering::Release);
                return Err(EngineError::Hook { kind, source });
            }
        }
        info!("hooks registered");
        Ok(())
    }

    /// Remove all hooks, once per activation.
    pub(crate) fn unregister_hooks(&self) {
        if !self.hooks_live.swap(false, Ordering::AcqRel) {
            return;
        }
        for kind in HookKind::ALL.iter().rev() {
            self.hooks.unregister(*kind);
        }
        info!("hooks unregistered");
    }

    /// Remove the hooks regardless of open rings. Idempotent; also runs
    /// on drop.
    pub fn shutdown(&self) {
        let _admission = self.admission_lock();
        self.unregister_hooks();
    }
}

/// Builder for a default engine.
pub struct EngineBuilder {
    config: EngineConfig,
    schema: Schema,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::new(),
            schema: Schema::builtin(),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `EngineConfig::from_env()`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config: EngineConfig::from_env()?,
            schema: Schema::builtin(),
        })
    }

    pub fn ring_size(mut self, bytes: usize) -> Self {
        self.config.ring_size = bytes;
        self
    }

    pub fn num_rings(mut self, n: usize) -> Self {
        self.config.num_rings = n;
        self
    }

    pub fn admission(mut self, policy: AdmissionPolicy) -> Self {
        self.config.admission = policy;
        self
    }

    pub fn snaplen(mut self, bytes: usize) -> Self {
        self.config.snaplen = bytes;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Build with the default hook table.
    pub fn build(self) -> Result<DefaultEngine> {
        self.build_with(HookTable::new())
    }

    /// Build with a custom hook registry.
    pub fn build_with<H: HookRegistry>(self, hooks: H) -> Result<Engine<H>> {
        Engine::with_schema(self.config, hooks, self.schema)
    }
}

/// Hooks go first so no callback can reach a ring being torn down; the
/// rings (and their mappings) are dropped after.
impl<H: HookRegistry> Drop for Engine<H> {
    fn drop(&mut self) {
        self.unregister_hooks();
        info!(rings = self.rings.len(), "engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHooks;
    use ktrace_core::ConfigError;

    fn small_config(rings: usize) -> EngineConfig {
        EngineConfig::new()
            .ring_size(2 * shm::page_size())
            .num_rings(rings)
    }

    #[test]
    fn test_new_engine() {
        let engine = Engine::new(small_config(2), RecordingHooks::new()).unwrap();
        assert_eq!(engine.n_rings(), 2);
        assert_eq!(engine.open_count(), 0);
        assert!(!engine.hooks_live());
        assert_eq!(engine.state(1).unwrap(), CaptureState::Stopped);
        assert_eq!(engine.stats(0).unwrap().capacity as usize, 2 * engine.page_size());
    }

    #[test]
    fn test_bad_config_is_fatal() {
        let config = small_config(1).ring_size(shm::page_size());
        let err = Engine::new(config, RecordingHooks::new()).err().unwrap();
        assert!(matches!(err, EngineError::Config(ConfigError::RingTooSmall { .. })));

        let err = Engine::new(small_config(0), RecordingHooks::new()).err().unwrap();
        assert_eq!(err, EngineError::Config(ConfigError::NoRings));
    }

    #[test]
    fn test_invalid_ring() {
        let engine = Engine::new(small_config(1), RecordingHooks::new()).unwrap();
        assert_eq!(
            engine.stats(1),
            Err(EngineError::InvalidRing { ring: 1, n_rings: 1 })
        );
    }

    #[test]
    fn test_builder() {
        let engine = EngineBuilder::new()
            .ring_size(4 * shm::page_size())
            .num_rings(1)
            .admission(AdmissionPolicy::FirstOpen)
            .snaplen(16)
            .build()
            .unwrap();
        assert_eq!(engine.ring_size(), 4 * shm::page_size());
        assert_eq!(engine.config().admission, AdmissionPolicy::FirstOpen);
        assert_eq!(engine.config().snaplen, 16);
    }

    #[test]
    fn test_register_rollback_reverse_order() {
        let engine = Engine::new(small_config(1), RecordingHooks::failing_on(HookKind::ProcessExit)).unwrap();
        let err = engine.register_hooks().unwrap_err();
        assert!(matches!(err, EngineError::Hook { kind: HookKind::ProcessExit, .. }));
        assert!(!engine.hooks_live());
        assert_eq!(
            engine.hooks().calls(),
            vec![
                (true, HookKind::SyscallExit),
                (true, HookKind::SyscallEnter),
                (false, HookKind::SyscallEnter),
                (false, HookKind::SyscallExit),
            ]
        );
    }

    #[test]
    fn test_unregister_exactly_once() {
        let engine = Engine::new(small_config(1), RecordingHooks::new()).unwrap();
        engine.register_hooks().unwrap();
        // Already live: no second registration.
        engine.register_hooks().unwrap();
        assert_eq!(engine.hooks().registered(), 4);

        engine.shutdown();
        engine.shutdown();
        assert_eq!(engine.hooks().unregistered(), 4);
        assert_eq!(
            engine.hooks().calls()[4..].iter().map(|c| c.1).collect::<Vec<_>>(),
            vec![HookKind::NetifRx, HookKind::ProcessExit, HookKind::SyscallEnter, HookKind::SyscallExit]
        );
    }
}

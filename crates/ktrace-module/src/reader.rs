//! Consumer side of one ring.
//!
//! A `RingReader` owns the two mappings a consumer process would hold:
//! the control page (to load head and publish tail) and the doubled
//! read-only buffer view (so a wrapped record is one contiguous slice).
//! Nothing here touches the producer's copy of the ring.

use std::sync::atomic::Ordering;

use ktrace_core::ring::used_space;
use ktrace_core::{EventHeader, EventInfo, HookRegistry, HEADER_SIZE};

use crate::engine::Engine;
use crate::error::{ReadError, Result};
use crate::event_table::Schema;
use crate::mapping::{MapRequest, MappedRegion};
use crate::ring::RingStats;

/// A borrowed, validated record.
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    pub header: EventHeader,
    pub info: &'static EventInfo,
    /// The whole record, header included.
    raw: &'a [u8],
}

impl<'a> EventView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn nparams(&self) -> usize {
        self.info.params.len()
    }

    /// Length of parameter `i` from the length table.
    fn param_len(&self, i: usize) -> usize {
        let off = HEADER_SIZE + 2 * i;
        u16::from_ne_bytes([self.raw[off], self.raw[off + 1]]) as usize
    }

    /// Parameter `i`. `None` if out of range or if the length table
    /// points past the record.
    pub fn param(&self, i: usize) -> Option<&'a [u8]> {
        self.params().nth(i).flatten()
    }

    /// All parameters in order.
    pub fn params(&self) -> impl Iterator<Item = Option<&'a [u8]>> + '_ {
        let raw = self.raw;
        let mut off = HEADER_SIZE + 2 * self.nparams();
        (0..self.nparams()).map(move |i| {
            let len = self.param_len(i);
            let p = raw.get(off..off + len);
            off += len;
            p
        })
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }
}

pub struct RingReader {
    ring: usize,
    capacity: u32,
    schema: Schema,
    control: MappedRegion,
    view: MappedRegion,
}

impl RingReader {
    /// Map `ring` of `engine` for reading.
    pub fn open<H: HookRegistry>(engine: &Engine<H>, ring: usize) -> Result<Self> {
        let control = engine.mmap(ring, MapRequest::control(engine.page_size()))?;
        let view = engine.mmap(ring, MapRequest::buffer(engine.ring_size()))?;
        Ok(Self {
            ring,
            capacity: engine.ring_size() as u32,
            schema: *engine.schema(),
            control,
            view,
        })
    }

    pub fn ring(&self) -> usize {
        self.ring
    }

    pub fn stats(&self) -> RingStats {
        self.control.stats().unwrap_or_default()
    }

    fn offsets(&self) -> (u32, u32) {
        match self.control.ring_info() {
            Some(info) => (info.head.load(Ordering::Acquire), info.tail.load(Ordering::Relaxed)),
            None => (0, 0),
        }
    }

    /// The record at tail, if any.
    pub fn peek(&self) -> std::result::Result<Option<EventView<'_>>, ReadError> {
        let (head, tail) = self.offsets();
        let used = used_space(head, tail, self.capacity);
        if used == 0 {
            return Ok(None);
        }
        if (used as usize) < HEADER_SIZE {
            return Err(ReadError::Truncated { used });
        }

        let bytes = self.view.bytes().unwrap_or(&[]);
        let start = tail as usize;
        let avail = bytes.get(start..start + used as usize).ok_or(ReadError::Truncated { used })?;
        let header = EventHeader::read_from(avail).ok_or(ReadError::Truncated { used })?;

        let info = self
            .schema
            .event(header.event_type)
            .ok_or(ReadError::UnknownEvent(header.event_type.0))?;
        let min = (HEADER_SIZE + 2 * info.params.len()) as u32;
        if header.len < min || header.len > used {
            return Err(ReadError::BadLength { len: header.len, used, min });
        }

        Ok(Some(EventView {
            header,
            info,
            raw: &avail[..header.len as usize],
        }))
    }

    /// Release `len` bytes at tail back to the producer.
    pub fn consume(&self, len: usize) -> std::result::Result<(), ReadError> {
        let (head, tail) = self.offsets();
        let used = used_space(head, tail, self.capacity);
        if len > used as usize {
            return Err(ReadError::Overrun { len: len as u32, used });
        }
        let next = (tail as usize + len) % self.capacity as usize;
        self.control.set_tail(next as u32);
        Ok(())
    }

    /// Hand every committed record to `f`, consuming as it goes.
    pub fn drain<F>(&self, mut f: F) -> std::result::Result<usize, ReadError>
    where
        F: FnMut(&EventView<'_>),
    {
        let mut n = 0;
        while let Some(ev) = self.peek()? {
            f(&ev);
            let len = ev.len();
            self.consume(len)?;
            n += 1;
        }
        Ok(n)
    }
}

/// Drain several rings in timestamp order. Records within one ring are
/// already ordered; across rings the embedded timestamp decides.
pub fn merge_by_timestamp<F>(readers: &[RingReader], mut f: F) -> std::result::Result<usize, ReadError>
where
    F: FnMut(usize, &EventView<'_>),
{
    let mut n = 0;
    loop {
        let mut next: Option<(u64, usize)> = None;
        for (i, r) in readers.iter().enumerate() {
            if let Some(ev) = r.peek()? {
                if next.map_or(true, |(ts, _)| ev.header.ts < ts) {
                    next = Some((ev.header.ts, i));
                }
            }
        }
        let Some((_, i)) = next else {
            return Ok(n);
        };
        let r = &readers[i];
        if let Some(ev) = r.peek()? {
            f(r.ring(), &ev);
            r.consume(ev.len())?;
            n += 1;
        }
    }
}

use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;

use crate::clock::CycleClock;
use crate::core::config::OutputDestination;
use crate::core::event::Event;
use crate::core::types::*;
use crate::engine::merger::Merger;
use crate::engine::output;

/// Bit of `state` held while a `record` or `reset` is writing slots.
const WRITER_ACTIVE: usize = 1;
/// Amount added to `state` per active reader.
const READER_UNIT: usize = 2;
/// Spins before a waiting `reset` starts yielding.
const SPIN_LIMIT: u32 = 64;

/// Fixed-capacity ring of events written by a single thread.
///
/// Consistency model: read-stable but lossy. A reader announces itself
/// through [`TraceBuffer::read`]; while any reader is active, `record` drops
/// its event instead of waiting. A reader that arrives while a `record` is
/// already mid-write waits for that one write to finish, so it never sees a
/// torn slot. `record` itself never blocks.
///
/// Capacity is always a power of two and the cursor wraps with a mask.
#[repr(align(64))]
pub struct TraceBuffer {
    /// Pre-allocated event slots
    slots: Box<[UnsafeCell<Event>]>,
    /// Capacity - 1
    mask: usize,
    /// Next slot to overwrite. Only changed while `WRITER_ACTIVE` is held.
    next_index: AtomicUsize,
    /// `WRITER_ACTIVE` bit plus `READER_UNIT` per active reader
    state: CachePadded<AtomicUsize>,
}

// Slots are only written under the WRITER_ACTIVE claim and only read under
// a reader claim; the two are mutually exclusive through `state`.
unsafe impl Send for TraceBuffer {}
unsafe impl Sync for TraceBuffer {}

impl TraceBuffer {
    /// Creates a buffer holding `capacity` events (rounded up to a power of 2)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(Event::EMPTY));

        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            next_index: AtomicUsize::new(0),
            state: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Appends an event, overwriting the oldest one once the buffer is full.
    ///
    /// Returns false if the event was dropped because a reader is active.
    /// Must only be called by the thread that owns this buffer.
    #[inline(always)]
    pub fn record(&self, timestamp: Cycles, format: &'static str, args: EventArgs) -> bool {
        if self
            .state
            .compare_exchange(0, WRITER_ACTIVE, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let idx = self.next_index.load(Ordering::Relaxed);
        unsafe {
            *self.slots.get_unchecked(idx).get() = Event::new(timestamp, format, args);
        }
        self.next_index.store((idx + 1) & self.mask, Ordering::Relaxed);

        self.state.fetch_and(!WRITER_ACTIVE, Ordering::Release);
        true
    }

    /// Discards every retained event and rewinds the cursor.
    ///
    /// Intended for the owning thread, or for any thread while the owner is
    /// not recording. Waits for active readers to finish; a `record` racing
    /// with a reset from another thread is dropped.
    pub fn reset(&self) {
        let mut spins = 0;
        while self
            .state
            .compare_exchange_weak(0, WRITER_ACTIVE, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff(&mut spins);
        }

        for slot in self.slots.iter() {
            let event = unsafe { &mut *slot.get() };
            if !event.is_valid() {
                // Slots fill from index 0, so the first empty one ends the
                // valid prefix unless the buffer has wrapped.
                break;
            }
            *event = Event::EMPTY;
        }
        self.next_index.store(0, Ordering::Relaxed);

        self.state.fetch_and(!WRITER_ACTIVE, Ordering::Release);
    }

    /// Registers a reader. Records are dropped until the guard is released.
    pub fn read(&self) -> ReadGuard<'_> {
        self.state.fetch_add(READER_UNIT, Ordering::Acquire);
        // A record or reset that claimed the buffer before us finishes
        // first; nothing can claim it after.
        let mut spins = 0;
        while self.state.load(Ordering::Acquire) & WRITER_ACTIVE != 0 {
            backoff(&mut spins);
        }
        ReadGuard { buffer: self }
    }

    /// Number of readers currently holding a guard
    #[inline(always)]
    pub fn active_readers(&self) -> usize {
        self.state.load(Ordering::Relaxed) / READER_UNIT
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Renders this buffer alone.
    pub fn get_trace<C: CycleClock + ?Sized>(&self, clock: &C) -> String {
        Merger::new(clock, false).render(&[self]).text
    }

    /// Renders this buffer alone and appends it to `destination`.
    pub fn print<C: CycleClock + ?Sized>(&self, clock: &C, destination: &OutputDestination) {
        let rendered = Merger::new(clock, false).render(&[self]);
        output::write_trace(destination, &rendered.output_text());
    }
}

/// Spins briefly, then yields to the scheduler while a long writer
/// (such as a reset from another thread) holds the buffer.
#[inline]
fn backoff(spins: &mut u32) {
    *spins += 1;
    if *spins > SPIN_LIMIT {
        std::thread::yield_now();
        *spins = 0;
    } else {
        spin_loop();
    }
}

/// Proof that a reader is registered on a buffer. Slots may be inspected
/// for as long as the guard lives; dropping it re-enables recording.
pub struct ReadGuard<'a> {
    buffer: &'a TraceBuffer,
}

impl<'a> ReadGuard<'a> {
    #[inline(always)]
    pub fn event(&self, index: usize) -> &Event {
        let slot = &self.buffer.slots[index & self.buffer.mask];
        unsafe { &*slot.get() }
    }

    #[inline(always)]
    pub fn next_index(&self) -> usize {
        self.buffer.next_index.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// True once the cursor has gone all the way around at least once
    pub fn has_wrapped(&self) -> bool {
        self.event(self.next_index()).is_valid()
    }

    /// Index of the oldest retained event
    pub fn oldest_index(&self) -> usize {
        if self.has_wrapped() {
            self.next_index()
        } else {
            0
        }
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        if self.has_wrapped() {
            self.capacity()
        } else {
            self.next_index()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        let start = self.oldest_index();
        (0..self.len()).map(move |offset| self.event(start + offset))
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.buffer.state.fetch_sub(READER_UNIT, Ordering::Release);
    }
}

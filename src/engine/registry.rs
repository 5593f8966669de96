use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::core::config::{OutputDestination, TraceConfig};
use crate::memory::trace_buffer::TraceBuffer;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Buffers this thread owns, keyed by registry id. Almost always holds
    /// a single entry. Only the registry keeps its buffers alive.
    static OWN_BUFFERS: RefCell<Vec<(u64, Weak<TraceBuffer>)>> = const { RefCell::new(Vec::new()) };
}

/// Consistent view of a registry taken under its lock
#[derive(Clone)]
pub struct Snapshot {
    pub buffers: Vec<Arc<TraceBuffer>>,
    pub output: OutputDestination,
    pub keep_old_events: bool,
}

impl Snapshot {
    pub fn buffer_refs(&self) -> Vec<&TraceBuffer> {
        self.buffers.iter().map(Arc::as_ref).collect()
    }
}

struct RegistryState {
    buffers: Vec<Arc<TraceBuffer>>,
    output: OutputDestination,
    keep_old_events: bool,
}

/// Every buffer created for a trace context, plus its configuration.
///
/// The lock is taken to register a thread's buffer (once per thread), to
/// snapshot, and to read or change configuration. Recording never touches it.
pub struct Registry {
    id: u64,
    buffer_capacity: usize,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            buffer_capacity: config.buffer_capacity,
            state: Mutex::new(RegistryState {
                buffers: Vec::new(),
                output: config.output.clone(),
                keep_old_events: config.keep_old_events,
            }),
        }
    }

    /// Runs `f` on the calling thread's buffer, creating and registering it
    /// on first use.
    ///
    /// Returns None only while the thread is being torn down and its
    /// thread-local storage is gone.
    #[inline]
    pub fn with_own_buffer<R>(&self, f: impl FnOnce(&TraceBuffer) -> R) -> Option<R> {
        OWN_BUFFERS
            .try_with(|cell| {
                let cached = cell
                    .borrow()
                    .iter()
                    .find(|(id, _)| *id == self.id)
                    .map(|(_, buffer)| buffer.as_ptr());
                if let Some(buffer) = cached {
                    // SAFETY: ids are never reused, so this entry was pushed by
                    // `self`, whose state holds a strong reference to the
                    // buffer for as long as `self` is borrowed.
                    return f(unsafe { &*buffer });
                }

                let buffer = self.register();
                {
                    let mut own = cell.borrow_mut();
                    // Drop entries whose registry has gone away
                    own.retain(|(_, buffer)| buffer.strong_count() > 0);
                    own.push((self.id, Arc::downgrade(&buffer)));
                }
                f(&buffer)
            })
            .ok()
    }

    /// The calling thread's buffer, registering it on first use
    pub fn acquire_own_buffer(&self) -> Option<Arc<TraceBuffer>> {
        self.with_own_buffer(|_| ())?;
        OWN_BUFFERS
            .try_with(|cell| {
                cell.borrow()
                    .iter()
                    .find(|(id, _)| *id == self.id)
                    .and_then(|(_, buffer)| buffer.upgrade())
            })
            .ok()
            .flatten()
    }

    /// Number of registry entries cached by the calling thread
    #[cfg(test)]
    fn cached_entries() -> usize {
        OWN_BUFFERS.with(|cell| cell.borrow().len())
    }

    fn register(&self) -> Arc<TraceBuffer> {
        let buffer = Arc::new(TraceBuffer::new(self.buffer_capacity));
        let mut state = self.state.lock();
        state.buffers.push(Arc::clone(&buffer));
        debug!(
            registry = self.id,
            buffers = state.buffers.len(),
            capacity = buffer.capacity(),
            thread = ?std::thread::current().id(),
            "registered time trace buffer"
        );
        buffer
    }

    /// Buffers registered so far
    pub fn buffers(&self) -> Vec<Arc<TraceBuffer>> {
        self.state.lock().buffers.clone()
    }

    /// Buffers and configuration, read together under the lock
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            buffers: state.buffers.clone(),
            output: state.output.clone(),
            keep_old_events: state.keep_old_events,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn output(&self) -> OutputDestination {
        self.state.lock().output.clone()
    }

    pub fn set_output(&self, output: OutputDestination) {
        self.state.lock().output = output;
    }

    pub fn keep_old_events(&self) -> bool {
        self.state.lock().keep_old_events
    }

    pub fn set_keep_old_events(&self, keep: bool) {
        self.state.lock().keep_old_events = keep;
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Clears every registered buffer. Resets run outside the lock so new
    /// threads can still register meanwhile.
    pub fn reset_all(&self) {
        for buffer in self.buffers() {
            buffer.reset();
        }
    }
}

// Low-overhead per-thread event tracing
//
// Threads record cycle-stamped events into their own ring buffers without
// locks; printing merges every buffer into one chronological text log.

// Core modules
pub mod core;
pub mod clock;
pub mod memory;
pub mod engine;
pub mod render;
pub mod merge;
pub mod trace;

// Re-exports of common types
pub use crate::clock::{CycleClock, ManualClock, TscClock};
pub use crate::core::config::{OutputDestination, TraceConfig};
pub use crate::core::error::{Result, TraceError};
pub use crate::core::event::Event;
pub use crate::core::types::{Cycles, EventArgs};
pub use crate::engine::merger::{Merger, RenderedTrace, EMPTY_TRACE_MESSAGE};
pub use crate::memory::trace_buffer::TraceBuffer;
pub use crate::trace::{
    get_trace, global, print, record, record_at, reset, set_keep_old_events,
    set_output_destination, TimeTrace,
};

// Version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests;

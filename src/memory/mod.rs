pub mod trace_buffer;

pub use trace_buffer::{ReadGuard, TraceBuffer};

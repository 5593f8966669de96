pub mod merger;
pub mod output;
pub mod registry;

pub use merger::{Merger, RenderedTrace, EMPTY_TRACE_MESSAGE};
pub use registry::{Registry, Snapshot};

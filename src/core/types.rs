/// Raw value of the cycle counter. Free-running and assumed never to wrap
/// within the lifetime of a process.
pub type Cycles = u64;

/// Number of integer arguments stored alongside each event.
pub const MAX_ARGS: usize = 4;

/// Arguments substituted into an event's format string when it is rendered.
pub type EventArgs = [u32; MAX_ARGS];

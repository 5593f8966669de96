use crate::core::types::*;

/// One slot of a trace buffer.
///
/// The format string is borrowed for `'static`, so recording never copies or
/// allocates; string literals are the expected input. A slot whose `format`
/// is `None` is empty.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Cycle counter value at which the event occurred
    pub timestamp: Cycles,
    /// printf-style format describing the event
    pub format: Option<&'static str>,
    /// Values referenced by `format`
    pub args: EventArgs,
}

impl Event {
    /// An unused slot.
    pub const EMPTY: Event = Event {
        timestamp: 0,
        format: None,
        args: [0; MAX_ARGS],
    };

    #[inline(always)]
    pub fn new(timestamp: Cycles, format: &'static str, args: EventArgs) -> Self {
        Self {
            timestamp,
            format: Some(format),
            args,
        }
    }

    /// Returns true if the slot holds a recorded event
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.format.is_some()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::EMPTY
    }
}

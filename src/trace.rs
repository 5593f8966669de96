//! Trace contexts and the process-wide default context.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::clock::{CycleClock, TscClock};
use crate::core::config::{OutputDestination, TraceConfig};
use crate::core::types::*;
use crate::engine::merger::{Merger, RenderedTrace};
use crate::engine::output;
use crate::engine::registry::Registry;
use crate::memory::trace_buffer::TraceBuffer;

/// A set of per-thread trace buffers sharing one clock and configuration.
///
/// Each thread recording into a context gets its own buffer on first use;
/// buffers live as long as the context. Most programs use the process-wide
/// context behind [`global`] and the free functions of this crate, while
/// tests and embedders can build independent contexts.
pub struct TimeTrace<C: CycleClock = TscClock> {
    registry: Registry,
    clock: C,
}

impl TimeTrace<TscClock> {
    /// A context timed by the calibrated hardware counter
    pub fn new(config: TraceConfig) -> Self {
        Self::with_clock(config, TscClock::calibrated())
    }
}

impl Default for TimeTrace<TscClock> {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

impl<C: CycleClock> TimeTrace<C> {
    pub fn with_clock(config: TraceConfig, clock: C) -> Self {
        Self {
            registry: Registry::new(&config),
            clock,
        }
    }

    /// Records an event timestamped now in the calling thread's buffer.
    ///
    /// `format` is rendered printf-style with `args` when the trace is
    /// printed. Never blocks; the event is silently dropped while a print
    /// is scanning this thread's buffer.
    #[inline]
    pub fn record(&self, format: &'static str, args: EventArgs) {
        self.record_at(self.clock.now(), format, args);
    }

    /// Records an event with an explicit cycle timestamp.
    #[inline]
    pub fn record_at(&self, timestamp: Cycles, format: &'static str, args: EventArgs) {
        self.registry
            .with_own_buffer(|buffer| buffer.record(timestamp, format, args));
    }

    /// The calling thread's buffer, created on first use
    pub fn buffer(&self) -> Option<Arc<TraceBuffer>> {
        self.registry.acquire_own_buffer()
    }

    /// Merges every thread's events into one string without any I/O.
    pub fn get_trace(&self) -> String {
        self.render().text
    }

    /// Merges every thread's events and appends them to the configured
    /// output, falling back to stdout if it cannot be opened.
    pub fn print(&self) {
        let snapshot = self.registry.snapshot();
        let rendered = Merger::new(&self.clock, snapshot.keep_old_events)
            .render(&snapshot.buffer_refs());
        output::write_trace(&snapshot.output, &rendered.output_text());
    }

    /// Like [`print`](Self::print), with `stdout` standing in for standard
    /// output both as a destination and as the fallback.
    pub fn print_with<W: Write>(&self, stdout: &mut W) {
        let snapshot = self.registry.snapshot();
        let rendered = Merger::new(&self.clock, snapshot.keep_old_events)
            .render(&snapshot.buffer_refs());
        output::write_trace_with(&snapshot.output, &rendered.output_text(), stdout);
    }

    /// Merges every thread's events, returning the text and statistics.
    pub fn render(&self) -> RenderedTrace {
        let snapshot = self.registry.snapshot();
        Merger::new(&self.clock, snapshot.keep_old_events).render(&snapshot.buffer_refs())
    }

    /// Discards the events of every registered buffer.
    ///
    /// Each buffer's owner should not be recording meanwhile; events racing
    /// with the reset may be dropped.
    pub fn reset(&self) {
        self.registry.reset_all();
    }

    /// Subsequent prints append to `path`; an empty path means stdout
    pub fn set_output_destination(&self, path: impl Into<PathBuf>) {
        self.registry.set_output(OutputDestination::from_path(path));
    }

    pub fn clear_output_destination(&self) {
        self.registry.set_output(OutputDestination::Stdout);
    }

    pub fn output_destination(&self) -> OutputDestination {
        self.registry.output()
    }

    /// Selects the merge window policy; see [`crate::engine::merger`]
    pub fn set_keep_old_events(&self, keep: bool) {
        self.registry.set_keep_old_events(keep);
    }

    pub fn keep_old_events(&self) -> bool {
        self.registry.keep_old_events()
    }

    /// Number of threads that have recorded into this context
    pub fn buffer_count(&self) -> usize {
        self.registry.len()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// The process-wide context, configured from the environment on first use
/// and never torn down before the process exits.
pub fn global() -> &'static TimeTrace {
    static GLOBAL: OnceLock<TimeTrace> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        let config = TraceConfig::from_env().unwrap_or_else(|err| {
            warn!(error = %err, "ignoring time trace environment configuration");
            TraceConfig::default()
        });
        TimeTrace::new(config)
    })
}

/// Records an event into the global context, timestamped now.
#[inline]
pub fn record(format: &'static str, args: EventArgs) {
    global().record(format, args);
}

/// Records an event into the global context with an explicit timestamp.
#[inline]
pub fn record_at(timestamp: Cycles, format: &'static str, args: EventArgs) {
    global().record_at(timestamp, format, args);
}

pub fn print() {
    global().print();
}

pub fn get_trace() -> String {
    global().get_trace()
}

pub fn reset() {
    global().reset();
}

pub fn set_output_destination(path: impl Into<PathBuf>) {
    global().set_output_destination(path);
}

pub fn set_keep_old_events(keep: bool) {
    global().set_keep_old_events(keep);
}

/// Builds the fixed-size argument array, padding with zeros.
#[macro_export]
macro_rules! event_args {
    () => {
        [0u32; 4]
    };
    ($a:expr) => {
        [$a as u32, 0, 0, 0]
    };
    ($a:expr, $b:expr) => {
        [$a as u32, $b as u32, 0, 0]
    };
    ($a:expr, $b:expr, $c:expr) => {
        [$a as u32, $b as u32, $c as u32, 0]
    };
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        [$a as u32, $b as u32, $c as u32, $d as u32]
    };
}

/// Records an event with up to four integer arguments.
///
/// ```
/// use timetrace::tt_record;
///
/// tt_record!("request %u started", 7);
///
/// let trace = timetrace::TimeTrace::default();
/// tt_record!(in trace, "stage %u of %u", 1, 3);
/// assert!(trace.get_trace().contains("stage 1 of 3"));
/// ```
#[macro_export]
macro_rules! tt_record {
    (in $trace:expr, $format:expr $(, $arg:expr)* $(,)?) => {
        $trace.record($format, $crate::event_args!($($arg),*))
    };
    ($format:expr $(, $arg:expr)* $(,)?) => {
        $crate::record($format, $crate::event_args!($($arg),*))
    };
}

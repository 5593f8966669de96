//! Chronological merge of several trace buffers into one text log.
//!
//! Buffers retain different amounts of history: a busy thread may have
//! overwritten events from a period that a quiet thread still holds. The
//! merge first decides which window of time is trustworthy:
//!
//! * default policy: start at the *latest* of the per-buffer oldest events
//!   (an empty buffer counts as 0), so every buffer covers the whole output
//!   and no thread's activity silently disappears from its beginning;
//! * keep-old policy: start at the *earliest* retained event of any buffer,
//!   accepting that some threads may not cover the start of the output.
//!
//! Events before the start are skipped, then buffers are merged by
//! timestamp with a binary heap.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::clock::CycleClock;
use crate::core::event::Event;
use crate::core::types::Cycles;
use crate::memory::trace_buffer::{ReadGuard, TraceBuffer};
use crate::render::printf;

/// Printed instead of a trace when no buffer has events in the window.
pub const EMPTY_TRACE_MESSAGE: &str = "No time trace events to print";

/// Result of rendering a set of buffers
#[derive(Debug, Clone, Default)]
pub struct RenderedTrace {
    /// Lines separated by '\n', without a trailing newline
    pub text: String,
    /// Events emitted
    pub events: usize,
    /// First cycle value included; None when nothing was emitted
    pub start_cycles: Option<Cycles>,
    /// Conversions that could not be rendered
    pub format_mismatches: usize,
}

impl RenderedTrace {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }

    /// Text as appended to a file or stream: every trace line ends with a
    /// newline, the empty-trace message does not.
    pub fn output_text(&self) -> Cow<'_, str> {
        if self.is_empty() {
            Cow::Borrowed(self.text.as_str())
        } else {
            Cow::Owned(format!("{}\n", self.text))
        }
    }
}

/// Read position within one buffer
#[derive(Debug, Clone, Copy)]
struct Cursor {
    index: usize,
    remaining: usize,
}

impl Cursor {
    fn oldest(guard: &ReadGuard<'_>) -> Self {
        Self {
            index: guard.oldest_index(),
            remaining: guard.len(),
        }
    }

    fn peek<'g>(&self, guard: &'g ReadGuard<'_>) -> Option<&'g Event> {
        if self.remaining == 0 {
            return None;
        }
        let event = guard.event(self.index);
        event.is_valid().then_some(event)
    }

    fn advance(&mut self, guard: &ReadGuard<'_>) {
        self.index = (self.index + 1) & (guard.capacity() - 1);
        self.remaining -= 1;
    }

    fn skip_before(&mut self, guard: &ReadGuard<'_>, start_time: Cycles) {
        while let Some(event) = self.peek(guard) {
            if event.timestamp >= start_time {
                break;
            }
            self.advance(guard);
        }
    }
}

/// Renders buffers using a clock's calibration and a retention policy.
pub struct Merger<'c, C: CycleClock + ?Sized> {
    clock: &'c C,
    keep_old_events: bool,
}

impl<'c, C: CycleClock + ?Sized> Merger<'c, C> {
    pub fn new(clock: &'c C, keep_old_events: bool) -> Self {
        Self {
            clock,
            keep_old_events,
        }
    }

    /// Merges `buffers` into a single chronologically ordered log.
    ///
    /// Every buffer is held under a read guard for the whole call, so
    /// records issued meanwhile are dropped rather than mixed into the
    /// output. Guards are released on return, including by unwinding.
    pub fn render(&self, buffers: &[&TraceBuffer]) -> RenderedTrace {
        let guards: Vec<ReadGuard<'_>> = buffers.iter().map(|buffer| buffer.read()).collect();
        let mut cursors: Vec<Cursor> = guards.iter().map(Cursor::oldest).collect();

        let start_time = self.start_time(&guards, &cursors);
        for (cursor, guard) in cursors.iter_mut().zip(&guards) {
            cursor.skip_before(guard, start_time);
        }

        let mut heap = BinaryHeap::with_capacity(guards.len());
        for (i, (cursor, guard)) in cursors.iter().zip(&guards).enumerate() {
            if let Some(event) = cursor.peek(guard) {
                heap.push(Reverse((event.timestamp, i)));
            }
        }

        let mut rendered = RenderedTrace::default();
        let mut prev_ns = 0.0;
        while let Some(Reverse((_, i))) = heap.pop() {
            let guard = &guards[i];
            let Some(event) = cursors[i].peek(guard) else {
                continue;
            };
            let event = *event;
            cursors[i].advance(guard);
            if let Some(next) = cursors[i].peek(guard) {
                heap.push(Reverse((next.timestamp, i)));
            }

            if rendered.events == 0 {
                // Calibration and absolute start let separately captured
                // traces be aligned later.
                rendered.text.push_str(&format!(
                    "CYCLES_PER_SECOND {:?}\nSTART_CYCLES {}\n",
                    self.clock.cycles_per_second(),
                    start_time
                ));
                rendered.start_cycles = Some(start_time);
            } else {
                rendered.text.push('\n');
            }

            let ns = self
                .clock
                .cycles_to_nanoseconds(event.timestamp.saturating_sub(start_time));
            rendered
                .text
                .push_str(&format!("{:8.1} ns (+{:6.1} ns): ", ns, ns - prev_ns));
            if let Some(format) = event.format {
                rendered.format_mismatches +=
                    printf::format_into(&mut rendered.text, format, &event.args);
            }
            prev_ns = ns;
            rendered.events += 1;
        }

        if rendered.is_empty() {
            rendered.text.push_str(EMPTY_TRACE_MESSAGE);
        }

        debug!(
            buffers = guards.len(),
            events = rendered.events,
            start_cycles = start_time,
            keep_old_events = self.keep_old_events,
            "rendered time trace"
        );
        if rendered.format_mismatches > 0 {
            debug!(
                mismatches = rendered.format_mismatches,
                "time trace format strings did not match their arguments"
            );
        }

        rendered
    }

    /// First timestamp included in the output.
    fn start_time(&self, guards: &[ReadGuard<'_>], cursors: &[Cursor]) -> Cycles {
        let oldest = cursors
            .iter()
            .zip(guards)
            .map(|(cursor, guard)| cursor.peek(guard).map(|event| event.timestamp));

        if self.keep_old_events {
            oldest.flatten().min().unwrap_or(0)
        } else {
            oldest.map(|timestamp| timestamp.unwrap_or(0)).max().unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn buffer_with(capacity: usize, events: &[(Cycles, &'static str)]) -> TraceBuffer {
        let buffer = TraceBuffer::new(capacity);
        for &(timestamp, format) in events {
            assert!(buffer.record(timestamp, format, [0; 4]));
        }
        buffer
    }

    fn messages(rendered: &RenderedTrace) -> Vec<String> {
        rendered
            .text
            .lines()
            .skip(2)
            .map(|line| line.split_once("): ").unwrap().1.to_string())
            .collect()
    }

    #[test]
    fn test_two_events_exact_output() {
        let clock = ManualClock::new(1e9);
        let buffer = buffer_with(16, &[(100, "A"), (200, "B")]);

        let rendered = Merger::new(&clock, false).render(&[&buffer]);
        assert_eq!(
            rendered.text,
            "CYCLES_PER_SECOND 1000000000.0\n\
             START_CYCLES 100\n     \
             0.0 ns (+   0.0 ns): A\n   \
             100.0 ns (+ 100.0 ns): B"
        );
        assert_eq!(rendered.events, 2);
        assert_eq!(rendered.start_cycles, Some(100));
        assert_eq!(
            rendered.output_text(),
            format!("{}\n", rendered.text)
        );
    }

    #[test]
    fn test_empty_buffers_produce_sentinel() {
        let clock = ManualClock::new(1e9);
        let a = TraceBuffer::new(8);
        let b = TraceBuffer::new(8);

        let rendered = Merger::new(&clock, false).render(&[&a, &b]);
        assert_eq!(rendered.text, EMPTY_TRACE_MESSAGE);
        assert!(rendered.is_empty());
        assert_eq!(rendered.output_text(), EMPTY_TRACE_MESSAGE);

        let rendered = Merger::new(&clock, false).render(&[]);
        assert_eq!(rendered.text, EMPTY_TRACE_MESSAGE);
    }

    #[test]
    fn test_default_policy_uses_latest_oldest_event() {
        let clock = ManualClock::new(1e9);
        let a = buffer_with(8, &[(0, "a0"), (100, "a100")]);
        let b = buffer_with(8, &[(50, "b50"), (150, "b150")]);

        let rendered = Merger::new(&clock, false).render(&[&a, &b]);
        assert_eq!(rendered.start_cycles, Some(50));
        assert_eq!(messages(&rendered), vec!["b50", "a100", "b150"]);
    }

    #[test]
    fn test_keep_old_policy_uses_earliest_event() {
        let clock = ManualClock::new(1e9);
        let a = buffer_with(8, &[(0, "a0"), (100, "a100")]);
        let b = buffer_with(8, &[(50, "b50"), (150, "b150")]);

        let rendered = Merger::new(&clock, true).render(&[&a, &b]);
        assert_eq!(rendered.start_cycles, Some(0));
        assert_eq!(messages(&rendered), vec!["a0", "b50", "a100", "b150"]);
    }

    #[test]
    fn test_empty_buffer_does_not_hide_others() {
        let clock = ManualClock::new(1e9);
        let empty = TraceBuffer::new(8);
        let busy = buffer_with(8, &[(10, "x"), (20, "y")]);

        // An empty buffer's oldest time counts as 0 under the default policy
        let rendered = Merger::new(&clock, false).render(&[&empty, &busy]);
        assert_eq!(messages(&rendered), vec!["x", "y"]);

        let rendered = Merger::new(&clock, true).render(&[&empty, &busy]);
        assert_eq!(rendered.start_cycles, Some(10));
        assert_eq!(messages(&rendered), vec!["x", "y"]);
    }

    #[test]
    fn test_wrapped_buffer_limits_window() {
        let clock = ManualClock::new(1e9);
        // Four slots, six events: only 20..=50 survive in the busy buffer
        let busy = buffer_with(
            4,
            &[(0, "b0"), (10, "b10"), (20, "b20"), (30, "b30"), (40, "b40"), (50, "b50")],
        );
        let quiet = buffer_with(8, &[(5, "q5"), (35, "q35")]);

        let rendered = Merger::new(&clock, false).render(&[&busy, &quiet]);
        assert_eq!(rendered.start_cycles, Some(20));
        assert_eq!(messages(&rendered), vec!["b20", "b30", "q35", "b40", "b50"]);
    }

    #[test]
    fn test_overflow_retains_exactly_capacity_events() {
        let clock = ManualClock::new(1e9);
        let buffer = TraceBuffer::new(8);
        for i in 0..11u64 {
            buffer.record(i * 10, "e%u", [i as u32, 0, 0, 0]);
        }

        let rendered = Merger::new(&clock, false).render(&[&buffer]);
        assert_eq!(rendered.events, 8);
        assert_eq!(rendered.start_cycles, Some(30));
        let expected: Vec<String> = (3..11).map(|i| format!("e{}", i)).collect();
        assert_eq!(messages(&rendered), expected);
    }

    #[test]
    fn test_deltas_between_events() {
        let clock = ManualClock::new(2e9);
        let buffer = buffer_with(8, &[(1000, "a"), (1200, "b"), (1700, "c")]);

        let rendered = Merger::new(&clock, false).render(&[&buffer]);
        let lines: Vec<&str> = rendered.text.lines().skip(2).collect();
        assert_eq!(lines[0], "     0.0 ns (+   0.0 ns): a");
        assert_eq!(lines[1], "   100.0 ns (+ 100.0 ns): b");
        assert_eq!(lines[2], "   350.0 ns (+ 250.0 ns): c");
    }

    #[test]
    fn test_arguments_are_substituted() {
        let clock = ManualClock::new(1e9);
        let buffer = TraceBuffer::new(8);
        buffer.record(1, "rpc %u took %u us", [17, 250, 0, 0]);
        buffer.record(2, "bad %s", [0; 4]);

        let rendered = Merger::new(&clock, false).render(&[&buffer]);
        assert_eq!(messages(&rendered), vec!["rpc 17 took 250 us", "bad %s"]);
        assert_eq!(rendered.format_mismatches, 1);
    }

    #[test]
    fn test_render_releases_guards() {
        let clock = ManualClock::new(1e9);
        let buffer = buffer_with(8, &[(1, "x")]);

        Merger::new(&clock, false).render(&[&buffer]);
        assert_eq!(buffer.active_readers(), 0);
        assert!(buffer.record(2, "y", [0; 4]));
    }
}

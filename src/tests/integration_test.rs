use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crate::clock::{CycleClock, ManualClock, TscClock};
use crate::core::config::TraceConfig;
use crate::engine::merger::{Merger, EMPTY_TRACE_MESSAGE};
use crate::merge::{merge_traces, parse_trace};
use crate::trace::TimeTrace;

const PRODUCERS: usize = 4;
const EVENTS_PER_PRODUCER: u32 = 2_000;

fn tsc_trace(capacity: usize) -> Arc<TimeTrace> {
    let config = TraceConfig::default().with_buffer_capacity(capacity).unwrap();
    Arc::new(TimeTrace::new(config))
}

/// Messages of a rendered trace, header stripped
fn messages(text: &str) -> Vec<String> {
    text.lines()
        .skip(2)
        .map(|line| line.split_once("): ").unwrap().1.to_string())
        .collect()
}

#[test]
fn test_producers_merge_in_timestamp_order() {
    let trace = tsc_trace(1 << 14);
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let trace = Arc::clone(&trace);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..EVENTS_PER_PRODUCER {
                    trace.record("producer %u event %u", [producer as u32, i, 0, 0]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let rendered = trace.render();
    assert_eq!(trace.buffer_count(), PRODUCERS);
    assert!(rendered.events > 0);
    assert_eq!(rendered.format_mismatches, 0);

    // Times never go backwards and each producer's events stay in order
    let parsed = parse_trace(&rendered.text).unwrap();
    let mut last_seen = [None::<u32>; PRODUCERS];
    let mut previous = 0.0;
    for event in &parsed.events {
        assert!(event.nanos >= previous);
        previous = event.nanos;

        let mut words = event.message.split_whitespace();
        let producer: usize = words.nth(1).unwrap().parse().unwrap();
        let index: u32 = words.nth(1).unwrap().parse().unwrap();
        if let Some(last) = last_seen[producer] {
            assert_eq!(index, last + 1);
        }
        last_seen[producer] = Some(index);
    }
}

#[test]
fn test_record_during_print_is_invisible() {
    let clock = Arc::new(ManualClock::new(1e9));
    let trace = TimeTrace::with_clock(TraceConfig::default(), Arc::clone(&clock));
    trace.record_at(10, "before", [0; 4]);
    let buffer = trace.buffer().unwrap();

    // Hold a reader the way a print does, then record from the owner
    let guard = buffer.read();
    trace.record_at(20, "during", [0; 4]);
    let during = Merger::new(&clock, false).render(&[&*buffer]);
    drop(guard);

    assert_eq!(messages(&during.text), vec!["before"]);
    assert_eq!(messages(&trace.get_trace()), vec!["before"]);

    trace.record_at(30, "after", [0; 4]);
    assert_eq!(messages(&trace.get_trace()), vec!["before", "after"]);
}

#[test]
fn test_concurrent_print_and_record() {
    let trace = tsc_trace(256);
    let running = Arc::new(AtomicBool::new(true));
    let recorded = Arc::new(AtomicUsize::new(0));

    let writers: Vec<_> = (0..2)
        .map(|writer| {
            let trace = Arc::clone(&trace);
            let running = Arc::clone(&running);
            let recorded = Arc::clone(&recorded);
            thread::spawn(move || {
                let mut i = 0u32;
                while running.load(Ordering::Relaxed) {
                    trace.record("writer %u value %u", [writer, i, 0, 0]);
                    i = i.wrapping_add(1);
                }
                recorded.fetch_add(i as usize, Ordering::Relaxed);
            })
        })
        .collect();

    for _ in 0..50 {
        let rendered = trace.render();
        for message in messages_or_empty(&rendered.text) {
            // Every line is a complete, correctly paired event
            assert!(message.starts_with("writer "), "torn line: {}", message);
            assert_eq!(message.split_whitespace().count(), 4);
        }
        thread::sleep(Duration::from_micros(200));
    }

    running.store(false, Ordering::Relaxed);
    for writer in writers {
        writer.join().unwrap();
    }
    assert!(recorded.load(Ordering::Relaxed) > 0);
    assert_eq!(trace.buffer_count(), 2);
}

fn messages_or_empty(text: &str) -> Vec<String> {
    if text == EMPTY_TRACE_MESSAGE {
        Vec::new()
    } else {
        messages(text)
    }
}

#[test]
fn test_reset_across_threads() {
    let trace = tsc_trace(64);
    let worker = {
        let trace = Arc::clone(&trace);
        thread::spawn(move || {
            for i in 0..10 {
                trace.record("worker %u", [i, 0, 0, 0]);
            }
        })
    };
    worker.join().unwrap();
    trace.record("main", [0; 4]);

    assert_ne!(trace.get_trace(), EMPTY_TRACE_MESSAGE);
    trace.reset();
    assert_eq!(trace.get_trace(), EMPTY_TRACE_MESSAGE);
}

#[test]
fn test_captured_traces_merge_offline() {
    let clock = Arc::new(ManualClock::new(1e9));
    let first = TimeTrace::with_clock(TraceConfig::default(), Arc::clone(&clock));
    let second = TimeTrace::with_clock(TraceConfig::default(), Arc::clone(&clock));

    first.record_at(1_000, "first %u", [1, 0, 0, 0]);
    second.record_at(1_050, "second %u", [1, 0, 0, 0]);
    first.record_at(1_100, "first %u", [2, 0, 0, 0]);
    second.record_at(1_150, "second %u", [2, 0, 0, 0]);

    let traces = [
        parse_trace(&first.get_trace()).unwrap(),
        parse_trace(&second.get_trace()).unwrap(),
    ];
    assert_eq!(traces[0].start_cycles, 1_000);
    assert_eq!(traces[1].start_cycles, 1_050);

    let merged = merge_traces(&traces, false);
    assert_eq!(
        messages(&merged),
        vec!["second 1", "first 2", "second 2"]
    );
}

#[test]
fn test_tsc_trace_reports_calibration() {
    let trace = tsc_trace(16);
    trace.record("hello", [0; 4]);

    let parsed = parse_trace(&trace.get_trace()).unwrap();
    assert_eq!(
        parsed.cycles_per_second,
        TscClock::calibrated().cycles_per_second()
    );
    assert_eq!(parsed.events.len(), 1);
    assert_eq!(parsed.events[0].nanos, 0.0);
}

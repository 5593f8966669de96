//! Merging of traces captured separately, for example by several processes
//! on the same machine.
//!
//! Each trace carries its calibration and absolute start cycle in its
//! header, which is enough to place its events on a common time line.

pub mod parser;

pub use parser::{parse_trace, ParsedTrace, TraceLine};

/// Merges parsed traces into one rendered trace, newline-terminated.
///
/// All traces are rescaled to the smallest cycles-per-second value and
/// shifted by their START_CYCLES. The start is picked with the same policy
/// as the in-process merge. Merging stops as soon as any trace runs out of
/// events: past that point its process may have been active without the
/// events showing up here. The output has the usual header and can itself
/// be merged again.
pub fn merge_traces(traces: &[ParsedTrace], keep_old_events: bool) -> String {
    let mut out = String::new();
    let Some(cycles_per_second) = traces
        .iter()
        .map(|trace| trace.cycles_per_second)
        .reduce(f64::min)
    else {
        return out;
    };

    let aligned: Vec<Vec<TraceLine>> = traces
        .iter()
        .map(|trace| {
            let offset = trace.start_cycles as f64 * 1e9 / cycles_per_second;
            let scale = trace.cycles_per_second / cycles_per_second;
            trace
                .events
                .iter()
                .map(|event| TraceLine {
                    nanos: event.nanos * scale + offset,
                    message: event.message.clone(),
                })
                .collect()
        })
        .collect();

    let firsts = aligned.iter().map(|events| events.first().map(|e| e.nanos));
    let start = if keep_old_events {
        firsts.flatten().reduce(f64::min).unwrap_or(0.0)
    } else {
        firsts.map(|first| first.unwrap_or(0.0)).reduce(f64::max).unwrap_or(0.0)
    };

    let mut cursors: Vec<usize> = aligned
        .iter()
        .map(|events| events.iter().take_while(|e| e.nanos < start).count())
        .collect();

    out.push_str(&format!(
        "CYCLES_PER_SECOND {:?}\nSTART_CYCLES {}\n",
        cycles_per_second,
        (start * cycles_per_second / 1e9).round() as u64
    ));

    let mut prev = start;
    loop {
        let mut chosen: Option<usize> = None;
        for (i, events) in aligned.iter().enumerate() {
            let Some(event) = events.get(cursors[i]) else {
                chosen = None;
                break;
            };
            if chosen.map_or(true, |c| event.nanos < aligned[c][cursors[c]].nanos) {
                chosen = Some(i);
            }
        }
        let Some(i) = chosen else {
            break;
        };

        let event = &aligned[i][cursors[i]];
        cursors[i] += 1;
        out.push_str(&format!(
            "{:8.1} ns (+{:6.1} ns): {}\n",
            event.nanos - start,
            event.nanos - prev,
            event.message
        ));
        prev = event.nanos;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(cycles_per_second: f64, start_cycles: u64, events: &[(f64, &str)]) -> ParsedTrace {
        ParsedTrace {
            cycles_per_second,
            start_cycles,
            events: events
                .iter()
                .map(|&(nanos, message)| TraceLine {
                    nanos,
                    message: message.to_string(),
                })
                .collect(),
        }
    }

    fn messages(text: &str) -> Vec<String> {
        parse_trace(text)
            .unwrap()
            .events
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_no_traces() {
        assert_eq!(merge_traces(&[], false), "");
    }

    #[test]
    fn test_exact_text() {
        let a = trace(1e9, 100, &[(0.0, "A"), (100.0, "B")]);
        assert_eq!(
            merge_traces(&[a], false),
            "CYCLES_PER_SECOND 1000000000.0\n\
             START_CYCLES 100\n     \
             0.0 ns (+   0.0 ns): A\n   \
             100.0 ns (+ 100.0 ns): B\n"
        );
    }

    #[test]
    fn test_aligns_by_start_cycles() {
        // 1 GHz: trace b starts 100 ns after trace a
        let a = trace(1e9, 1000, &[(0.0, "a0"), (150.0, "a150"), (300.0, "a300")]);
        let b = trace(1e9, 1100, &[(0.0, "b100"), (100.0, "b200"), (300.0, "b400")]);

        let merged = merge_traces(&[a, b], false);
        let parsed = parse_trace(&merged).unwrap();
        assert_eq!(parsed.start_cycles, 1100);
        // a0 predates b; a stops after a300 so b400 is cut off
        assert_eq!(
            messages(&merged),
            vec!["b100", "a150", "b200", "a300"]
        );
        assert_eq!(parsed.events[0].nanos, 0.0);
        assert_eq!(parsed.events[3].nanos, 200.0);
    }

    #[test]
    fn test_keep_old_events() {
        let a = trace(1e9, 1000, &[(0.0, "a0"), (150.0, "a150")]);
        let b = trace(1e9, 1100, &[(0.0, "b100"), (100.0, "b200")]);

        let merged = merge_traces(&[a, b], true);
        assert_eq!(parse_trace(&merged).unwrap().start_cycles, 1000);
        // a runs out after a150, which ends the merge
        assert_eq!(messages(&merged), vec!["a0", "b100", "a150"]);
    }

    #[test]
    fn test_rescales_to_slowest_rate() {
        // Traces captured with differently calibrated clocks
        let a = trace(2e9, 0, &[(0.0, "a0"), (100.0, "a100")]);
        let b = trace(1e9, 0, &[(0.0, "b0"), (150.0, "b150"), (400.0, "b400")]);

        let merged = merge_traces(&[a, b], false);
        let parsed = parse_trace(&merged).unwrap();
        assert_eq!(parsed.cycles_per_second, 1e9);
        // a's 100 ns become 200 ns on the 1 GHz time line
        assert_eq!(
            messages(&merged),
            vec!["a0", "b0", "b150", "a100"]
        );
    }

    #[test]
    fn test_output_can_be_merged_again() {
        let a = trace(1e9, 0, &[(0.0, "a0"), (10.0, "a10")]);
        let b = trace(1e9, 0, &[(5.0, "b5"), (20.0, "b20")]);
        let merged = parse_trace(&merge_traces(&[a, b], false)).unwrap();

        let c = trace(1e9, 0, &[(5.0, "c5"), (30.0, "c30")]);
        let again = merge_traces(&[merged, c], false);
        assert_eq!(messages(&again), vec!["b5", "c5", "a10"]);
    }
}

use std::sync::OnceLock;

use regex::Regex;

use crate::core::error::{Result, TraceError};

/// One event line of a rendered trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceLine {
    /// Nanoseconds since the trace's START_CYCLES
    pub nanos: f64,
    pub message: String,
}

/// A trace read back from its text form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTrace {
    pub cycles_per_second: f64,
    pub start_cycles: u64,
    pub events: Vec<TraceLine>,
}

fn event_line() -> &'static Regex {
    static EVENT_LINE: OnceLock<Regex> = OnceLock::new();
    EVENT_LINE.get_or_init(|| {
        Regex::new(r"^\s*([0-9.]+) ns \(\+\s*([0-9.]+) ns\): (.*)$")
            .expect("event line pattern is valid")
    })
}

/// Parses the output of `print`/`get_trace`. Lines that are neither header
/// nor event lines (blank lines, the empty-trace message, interleaved logs)
/// are skipped.
pub fn parse_trace(text: &str) -> Result<ParsedTrace> {
    let mut trace = ParsedTrace::default();

    for (number, line) in text.lines().enumerate() {
        let line_number = number + 1;
        let header = line.trim_start();

        if header.starts_with("CYCLES_PER_SECOND") {
            trace.cycles_per_second = header_value(line, line_number)?
                .parse::<f64>()
                .map_err(|err| TraceError::Parse {
                    line: line_number,
                    reason: format!("bad CYCLES_PER_SECOND: {}", err),
                })?;
            continue;
        }
        if header.starts_with("START_CYCLES") {
            trace.start_cycles = header_value(line, line_number)?
                .parse::<u64>()
                .map_err(|err| TraceError::Parse {
                    line: line_number,
                    reason: format!("bad START_CYCLES: {}", err),
                })?;
            continue;
        }

        let Some(captures) = event_line().captures(line) else {
            continue;
        };
        let Ok(nanos) = captures[1].parse::<f64>() else {
            continue;
        };
        trace.events.push(TraceLine {
            nanos,
            message: captures[3].to_string(),
        });
    }

    Ok(trace)
}

fn header_value(line: &str, line_number: usize) -> Result<&str> {
    line.split_whitespace()
        .nth(1)
        .ok_or_else(|| TraceError::Parse {
            line: line_number,
            reason: "header without a value".to_string(),
        })
}

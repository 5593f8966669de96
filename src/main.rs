use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use timetrace::merge::{merge_traces, parse_trace};
use timetrace::tt_record;

#[derive(Parser)]
#[command(name = "timetrace", version, about = "Per-thread cycle-stamped event tracing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge traces captured separately into one time line
    Merge {
        /// Start at the oldest event of any trace instead of truncating
        #[arg(short, long)]
        keep_old_events: bool,
        /// Trace files written by print
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Record from several producer threads and print the merged trace
    Demo {
        #[arg(long, default_value_t = 2)]
        threads: usize,
        #[arg(long, default_value_t = 20)]
        events: u32,
        /// Append the trace to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        keep_old_events: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Merge {
            keep_old_events,
            inputs,
        } => merge(&inputs, keep_old_events),
        Command::Demo {
            threads,
            events,
            output,
            keep_old_events,
        } => {
            demo(threads, events, output, keep_old_events);
            Ok(())
        }
    }
}

fn merge(inputs: &[PathBuf], keep_old_events: bool) -> Result<()> {
    let mut traces = Vec::with_capacity(inputs.len());
    for path in inputs {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let trace = parse_trace(&text).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), events = trace.events.len(), "loaded trace");
        traces.push(trace);
    }

    print!("{}", merge_traces(&traces, keep_old_events));
    Ok(())
}

fn demo(threads: usize, events: u32, output: Option<PathBuf>, keep_old_events: bool) {
    if let Some(path) = output {
        timetrace::set_output_destination(path);
    }
    timetrace::set_keep_old_events(keep_old_events);

    let barrier = Arc::new(Barrier::new(threads));
    let producers: Vec<_> = (0..threads)
        .map(|producer| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                tt_record!("producer %u started", producer);
                for i in 0..events {
                    tt_record!("producer %u step %u", producer, i);
                    thread::sleep(Duration::from_micros(50));
                }
                tt_record!("producer %u done", producer);
            })
        })
        .collect();

    for producer in producers {
        if producer.join().is_err() {
            tracing::error!("producer thread panicked");
        }
    }

    info!(
        buffers = timetrace::global().buffer_count(),
        "printing merged trace"
    );
    timetrace::print();
}

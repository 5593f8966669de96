use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the trace engine.
///
/// None of these abort a recording or printing operation: the facade logs
/// them and degrades (for example to stdout when a file cannot be opened).
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("cannot open trace output {}: {source}", path.display())]
    OpenDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write trace output: {0}")]
    Write(#[from] io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;

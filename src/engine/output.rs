use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use tracing::warn;

use crate::core::config::OutputDestination;
use crate::core::error::{Result, TraceError};

/// Writes rendered trace text to `destination`.
///
/// A file that cannot be opened degrades to stdout; no failure is
/// propagated to the caller.
pub fn write_trace(destination: &OutputDestination, text: &str) {
    write_trace_with(destination, text, &mut io::stdout());
}

/// Same as [`write_trace`], with `stdout` used for
/// [`OutputDestination::Stdout`] and as the fallback stream.
pub fn write_trace_with<W: Write>(destination: &OutputDestination, text: &str, stdout: &mut W) {
    match destination {
        OutputDestination::Stdout => write_stream(stdout, text),
        OutputDestination::File(path) => match append_to_file(path, text) {
            Ok(()) => {}
            Err(err @ TraceError::OpenDestination { .. }) => {
                warn!(error = %err, "writing time trace to stdout instead");
                write_stream(stdout, text);
            }
            Err(err) => {
                warn!(error = %err, path = %path.display(), "time trace output incomplete");
            }
        },
    }
}

/// Appends `text` to the file at `path`, creating it if needed. The file
/// is closed before returning on every path.
pub fn append_to_file(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TraceError::OpenDestination {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(())
}

fn write_stream<W: Write>(stream: &mut W, text: &str) {
    if let Err(err) = stream
        .write_all(text.as_bytes())
        .and_then(|()| stream.flush())
    {
        warn!(error = %err, "failed to write time trace to stdout");
    }
}

use std::path::PathBuf;

use crate::core::error::{Result, TraceError};

/// Events retained per thread by default (2^16).
pub const DEFAULT_BUFFER_CAPACITY: usize = 1 << 16;

/// Largest accepted per-thread capacity.
pub const MAX_BUFFER_CAPACITY: usize = 1 << 28;

/// Where `print` writes a rendered trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputDestination {
    #[default]
    Stdout,
    /// Appended to; created if missing
    File(PathBuf),
}

impl OutputDestination {
    /// An empty path means the default stream
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.as_os_str().is_empty() {
            Self::Stdout
        } else {
            Self::File(path)
        }
    }
}

/// Configuration of a trace context
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Events retained per thread; rounded up to a power of two
    pub buffer_capacity: usize,
    /// Destination used by `print`
    pub output: OutputDestination,
    /// Merge from the earliest retained event of any buffer instead of the
    /// latest oldest event across all buffers
    pub keep_old_events: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            output: OutputDestination::Stdout,
            keep_old_events: false,
        }
    }
}

impl TraceConfig {
    pub const ENV_BUFFER_CAPACITY: &'static str = "TIMETRACE_BUFFER_CAPACITY";
    pub const ENV_OUTPUT: &'static str = "TIMETRACE_OUTPUT";
    pub const ENV_KEEP_OLD_EVENTS: &'static str = "TIMETRACE_KEEP_OLD_EVENTS";

    /// Defaults overlaid with the `TIMETRACE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::ENV_BUFFER_CAPACITY) {
            let capacity = raw.trim().parse::<usize>().map_err(|_| {
                TraceError::InvalidConfig(format!(
                    "{} must be a positive integer, got {:?}",
                    Self::ENV_BUFFER_CAPACITY,
                    raw
                ))
            })?;
            config = config.with_buffer_capacity(capacity)?;
        }

        if let Some(raw) = lookup(Self::ENV_OUTPUT) {
            config.output = OutputDestination::from_path(raw.trim());
        }

        if let Some(raw) = lookup(Self::ENV_KEEP_OLD_EVENTS) {
            config.keep_old_events = parse_bool(Self::ENV_KEEP_OLD_EVENTS, &raw)?;
        }

        Ok(config)
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_BUFFER_CAPACITY {
            return Err(TraceError::InvalidConfig(format!(
                "buffer capacity must be in 1..={}, got {}",
                MAX_BUFFER_CAPACITY, capacity
            )));
        }
        self.buffer_capacity = capacity;
        Ok(self)
    }

    pub fn with_output(mut self, output: OutputDestination) -> Self {
        self.output = output;
        self
    }

    pub fn with_keep_old_events(mut self, keep: bool) -> Self {
        self.keep_old_events = keep;
        self
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(TraceError::InvalidConfig(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}

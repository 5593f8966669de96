pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::{OutputDestination, TraceConfig};
pub use error::{Result, TraceError};
pub use event::Event;
pub use types::{Cycles, EventArgs};

//! Observability module providing structured logging.
//!
//! Initializes console logging on stderr with configurable format
//! (pretty, compact, JSON) and an optional append-only log file, so
//! scheduler-driven runs leave a trail without redirecting output.

mod tracing_init;

pub use tracing_init::*;

//! Infrastructure layer for the forwarding policy
//!
//! This module contains implementations of external concerns: log message
//! catalogues and trace storage.

pub mod log_messages;
pub mod trace_sink;

pub use trace_sink::{InMemoryTraceSink, TraceEntry, TraceSnapshot};

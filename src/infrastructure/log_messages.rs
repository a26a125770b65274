//! Log message constants for infrastructure components
//!
//! This module centralizes the log messages used throughout the crate so the
//! wording stays consistent between call sites.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting forward policy";
    pub const STARTED_SUCCESSFULLY: &str = "Forward policy ready";
    pub const POLICY_LOADED: &str = "Forwarding policy loaded";
    pub const TRACING_ENABLED: &str = "Request tracing enabled";
    pub const TRACING_DISABLED: &str = "Request tracing disabled";
}

/// Request/response processing messages
pub mod request_processing {
    pub const PATH_ENCODING_FAILED: &str =
        "Request URI override could not be encoded, using the inbound path";
    pub const RESPONSE_APPLIED: &str = "Upstream response applied to request context";
    pub const RESPONSE_ALREADY_COMMITTED: &str =
        "Cannot attach a response body after the response was committed";
}

/// Diagnostic trace messages
pub mod trace {
    pub const REQUEST_RECORDED: &str = "Outbound request recorded";
    pub const RESPONSE_RECORDED: &str = "Upstream response recorded";
    pub const BODY_CAPTURE_SKIPPED: &str = "Streamed request body left out of the trace";
    pub const TRACE_EVICTED: &str = "Trace sink full, dropping oldest trace";
}

/// Configuration and validation messages
pub mod configuration {
    pub const CONFIG_LOADED: &str = "Configuration loaded successfully";
}

//! Type definitions for the proxy module

use nutype::nutype;
use thiserror::Error;

/// Default number of traces kept by the in-memory sink
pub const DEFAULT_TRACE_CAPACITY: usize = 100;

/// Maximum number of body characters captured into a trace
pub const MAX_TRACE_BODY_CHARS: usize = 4096;

/// Marker appended to a captured body that was cut short
pub const TRUNCATED_MARKER: &str = "<truncated>";

/// Glob pattern for destination hosts whose requests may see sensitive headers.
///
/// Supports `*` (any run of characters) and `?` (exactly one character).
/// Hosts are compared lowercase, so patterns are lowercased on ingestion.
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct HostPattern(String);

/// Lowercased header name held in policy configuration
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct PolicyHeaderName(String);

/// Opaque identifier of the route that handled a request
#[nutype(
    validate(not_empty),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct RouteId(String);

/// Number of traces an in-memory sink retains
#[nutype(
    validate(greater = 0),
    default = 100,
    derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct TraceCapacity(usize);

/// Errors that can occur while reconstructing a proxied exchange
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid host pattern: {0}")]
    InvalidHostPattern(String),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid route id: {0}")]
    InvalidRouteId(String),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

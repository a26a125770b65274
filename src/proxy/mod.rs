//! Forwarding policy for proxied HTTP exchanges
//!
//! This module decides what crosses the proxy boundary:
//! - Outbound leg: request path, query string and headers sent upstream
//! - Response leg: status, body and headers handed back to the client
//! - Diagnostics: an optional two-phase trace of every exchange

pub mod context;
pub mod headers;
pub mod http_types;
pub mod pattern;
pub mod policy;
pub mod query;
pub mod request_helper;
pub mod trace;
pub mod types;

pub use context::{IgnoredHeaders, InboundRequest, RequestContext, ResponseBody};
pub use headers::HeaderSet;
pub use http_types::{encode_path, ParamSet};
pub use policy::{is_included_header, ProxyPolicyConfig};
pub use query::query_string;
pub use request_helper::ProxyRequestHelper;
pub use trace::{RequestTrace, SharedTrace, TraceHandle, TraceRecorder, TraceSink, TraceValue};
pub use types::{HostPattern, PolicyHeaderName, ProxyError, ProxyResult, RouteId, TraceCapacity};

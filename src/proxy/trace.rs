//! Diagnostic traces of proxied exchanges
//!
//! A trace is written in two phases. The outbound leg builds the record and
//! appends it to the sink straight away, returning a [`TraceHandle`]. The
//! response leg passes that handle back to attach the response headers and
//! status. Sinks store the shared record, so they observe the second phase
//! without a second append.

use crate::infrastructure::log_messages::trace as messages;
use crate::proxy::context::RequestContext;
use crate::proxy::headers::HeaderSet;
use crate::proxy::http_types::ParamSet;
use crate::proxy::query::query_string;
use crate::proxy::types::{RouteId, MAX_TRACE_BODY_CHARS, TRUNCATED_MARKER};
use http::StatusCode;
use parking_lot::RwLock;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// Enough bytes to hold one character past [`MAX_TRACE_BODY_CHARS`] at any
/// UTF-8 width
const MAX_TRACE_BODY_BYTES: usize = (MAX_TRACE_BODY_CHARS + 1) * 4;

/// A header as shown in a trace: one value as a string, several as a list
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TraceValue {
    Single(String),
    Multiple(Vec<String>),
}

impl TraceValue {
    fn collapse(values: &[String]) -> Self {
        match values {
            [] => Self::Single(String::new()),
            [value] => Self::Single(value.clone()),
            values => Self::Multiple(values.to_vec()),
        }
    }
}

/// Ordered header map inside a trace, serialized as a JSON object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceHeaderMap(Vec<(String, TraceValue)>);

impl TraceHeaderMap {
    fn from_headers(headers: &HeaderSet) -> Self {
        Self(
            headers
                .iter()
                .map(|(name, values)| (name.to_string(), TraceValue::collapse(values)))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&TraceValue> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TraceValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for TraceHeaderMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Header snapshots of both legs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TraceHeaders {
    pub request: TraceHeaderMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<TraceHeaderMap>,
}

/// Structured record of one proxied exchange
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestTrace {
    pub method: String,
    pub path: String,
    pub query: String,
    pub remote: bool,
    pub proxy: Option<RouteId>,
    pub headers: TraceHeaders,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A trace record shared between the recorder and the sink
pub type SharedTrace = Arc<RwLock<RequestTrace>>;

/// Destination for recorded traces.
///
/// `append` is called once per exchange, possibly from many requests at the
/// same time.
pub trait TraceSink: Send + Sync {
    fn append(&self, trace: SharedTrace);
}

/// Token linking the response leg to the trace created on the outbound leg
#[derive(Clone, Debug, Default)]
pub struct TraceHandle(Option<SharedTrace>);

impl TraceHandle {
    /// True when a trace was actually recorded
    pub fn is_recorded(&self) -> bool {
        self.0.is_some()
    }

    /// Current contents of the trace, or an empty record when tracing is off
    pub fn snapshot(&self) -> RequestTrace {
        self.0
            .as_ref()
            .map(|trace| trace.read().clone())
            .unwrap_or_default()
    }
}

/// Builds traces and hands them to the configured sink
#[derive(Clone, Default)]
pub struct TraceRecorder {
    sink: Option<Arc<dyn TraceSink>>,
}

impl TraceRecorder {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Record the outbound leg and persist it.
    ///
    /// `body` is the buffered request body; it is borrowed, never consumed.
    /// It is left out of the trace for chunked bodies and multipart content.
    pub fn record_request(
        &self,
        ctx: &RequestContext,
        method: &str,
        uri: &str,
        headers: &HeaderSet,
        params: &ParamSet,
        body: Option<&[u8]>,
    ) -> TraceHandle {
        let Some(sink) = &self.sink else {
            return TraceHandle::default();
        };

        let mut trace = RequestTrace {
            method: method.to_string(),
            path: uri.to_string(),
            query: query_string(params),
            remote: true,
            proxy: ctx.proxy().cloned(),
            headers: TraceHeaders {
                request: TraceHeaderMap::from_headers(headers),
                response: None,
            },
            body: None,
        };

        match body {
            Some(bytes) if should_capture_body(ctx) => trace.body = capture_body(bytes),
            Some(_) => debug!(path = uri, "{}", messages::BODY_CAPTURE_SKIPPED),
            None => {}
        }

        let shared = Arc::new(RwLock::new(trace));
        sink.append(Arc::clone(&shared));
        debug!(method, path = uri, "{}", messages::REQUEST_RECORDED);
        TraceHandle(Some(shared))
    }

    /// Attach the response leg to the trace behind `handle`
    pub fn record_response(&self, handle: &TraceHandle, status: StatusCode, headers: &HeaderSet) {
        if !self.is_enabled() {
            return;
        }
        let Some(trace) = &handle.0 else {
            return;
        };

        let mut response = TraceHeaderMap::from_headers(headers);
        response.0.push((
            "status".to_string(),
            TraceValue::Single(status.as_u16().to_string()),
        ));
        trace.write().headers.response = Some(response);
        debug!(status = status.as_u16(), "{}", messages::RESPONSE_RECORDED);
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn should_capture_body(ctx: &RequestContext) -> bool {
    if ctx.is_chunked_request_body() {
        return false;
    }
    !ctx
        .content_type()
        .is_some_and(|content_type| content_type.to_lowercase().contains("multipart"))
}

/// The first [`MAX_TRACE_BODY_CHARS`] characters of the body as UTF-8
fn capture_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let prefix = &bytes[..bytes.len().min(MAX_TRACE_BODY_BYTES)];
    let text = match std::str::from_utf8(prefix) {
        Ok(text) => Cow::Borrowed(text),
        // The prefix may have split a character
        Err(error) if error.error_len().is_none() && prefix.len() < bytes.len() => {
            String::from_utf8_lossy(&prefix[..error.valid_up_to()])
        }
        Err(_) => String::from_utf8_lossy(prefix),
    };

    let body = match text.char_indices().nth(MAX_TRACE_BODY_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATED_MARKER}", &text[..cut]),
        None => text.into_owned(),
    };
    Some(body)
}

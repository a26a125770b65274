//! Per-request state shared between routing, forwarding and the response leg
//!
//! A [`RequestContext`] belongs to exactly one inbound request. Earlier routing
//! steps fill in the destination and overrides; the forwarding policy reads
//! those and writes the reconstructed response back into the same context.

use crate::proxy::headers::{is_chunked, HeaderSet, CONTENT_TYPE, TRANSFER_ENCODING};
use crate::proxy::http_types::ParamSet;
use crate::proxy::types::RouteId;
use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use http_body_util::combinators::BoxBody;
use std::collections::HashSet;
use std::fmt;

/// Response body handed back from the upstream
pub type ResponseBody = BoxBody<Bytes, std::io::Error>;

/// The inbound client request as seen by the forwarding policy
#[derive(Clone, Debug)]
pub struct InboundRequest {
    method: Method,
    path: String,
    headers: HeaderSet,
    query_params: Option<ParamSet>,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderSet::new(),
            query_params: None,
        }
    }

    /// Build from the parts of an `http` request, parsing its query string
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            headers: HeaderSet::from(&parts.headers),
            query_params: parts.uri.query().map(ParamSet::parse),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query_params = Some(ParamSet::parse(query));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Parsed query parameters, `None` when the request carried no query
    pub fn query_params(&self) -> Option<&ParamSet> {
        self.query_params.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_first(CONTENT_TYPE.as_str())
    }

    /// True when the request body is sent with chunked transfer coding
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get(TRANSFER_ENCODING.as_str())
            .is_some_and(|values| values.iter().any(|value| is_chunked(value)))
    }
}

/// Header names excluded from forwarding for a single request, stored lowercase
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IgnoredHeaders(HashSet<String>);

impl IgnoredHeaders {
    pub fn insert(&mut self, name: &str) {
        self.0.insert(name.to_lowercase());
    }

    /// `name` must already be lowercase
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Scratch state for one proxied exchange
#[derive(Default)]
pub struct RequestContext {
    route_host: Option<Uri>,
    request_uri: Option<String>,
    request_headers: HeaderSet,
    chunked_request_body: bool,
    proxy: Option<RouteId>,
    content_type: Option<String>,
    ignored_headers: Option<IgnoredHeaders>,
    response_status: Option<StatusCode>,
    response_body: Option<ResponseBody>,
    response_gzipped: bool,
    response_committed: bool,
    origin_response_headers: Vec<(String, String)>,
    origin_content_length: Option<String>,
    response_headers: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a context for `request`, carrying over its content type and
    /// whether its body is chunked
    pub fn for_request(request: &InboundRequest) -> Self {
        Self {
            content_type: request.content_type().map(str::to_string),
            chunked_request_body: request.is_chunked(),
            ..Self::default()
        }
    }

    // ========== Routing decisions (read by the policy) ==========

    pub fn set_route_host(&mut self, route_host: Uri) {
        self.route_host = Some(route_host);
    }

    /// Destination chosen by routing, if any
    pub fn route_host(&self) -> Option<&Uri> {
        self.route_host.as_ref()
    }

    /// Path that replaces the inbound path when forwarding
    pub fn set_request_uri(&mut self, uri: impl Into<String>) {
        self.request_uri = Some(uri.into());
    }

    pub fn request_uri(&self) -> Option<&str> {
        self.request_uri.as_deref()
    }

    /// Authoritative single-valued header for the outbound request
    pub fn add_request_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.request_headers.set(name.into().to_lowercase(), value);
    }

    pub fn request_headers(&self) -> &HeaderSet {
        &self.request_headers
    }

    pub fn set_chunked_request_body(&mut self, chunked: bool) {
        self.chunked_request_body = chunked;
    }

    pub fn is_chunked_request_body(&self) -> bool {
        self.chunked_request_body
    }

    pub fn set_proxy(&mut self, proxy: RouteId) {
        self.proxy = Some(proxy);
    }

    pub fn proxy(&self) -> Option<&RouteId> {
        self.proxy.as_ref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    // ========== Request-scoped ignored headers ==========

    pub fn ignored_headers(&self) -> Option<&IgnoredHeaders> {
        self.ignored_headers.as_ref()
    }

    /// The ignored-header set, created empty on first use
    pub fn ignored_headers_mut(&mut self) -> &mut IgnoredHeaders {
        self.ignored_headers.get_or_insert_with(IgnoredHeaders::default)
    }

    // ========== Response (written by the policy) ==========

    pub fn set_response_status(&mut self, status: StatusCode) {
        self.response_status = Some(status);
    }

    pub fn response_status(&self) -> Option<StatusCode> {
        self.response_status
    }

    pub(crate) fn set_response_body(&mut self, body: ResponseBody) {
        self.response_body = Some(body);
    }

    /// Hand the upstream body to whoever writes the client response
    pub fn take_response_body(&mut self) -> Option<ResponseBody> {
        self.response_body.take()
    }

    pub fn has_response_body(&self) -> bool {
        self.response_body.is_some()
    }

    pub fn set_response_gzipped(&mut self, gzipped: bool) {
        self.response_gzipped = gzipped;
    }

    pub fn is_response_gzipped(&self) -> bool {
        self.response_gzipped
    }

    /// Called by the transport once bytes have been sent to the client
    pub fn mark_response_committed(&mut self) {
        self.response_committed = true;
    }

    pub fn is_response_committed(&self) -> bool {
        self.response_committed
    }

    pub fn add_origin_response_header(&mut self, name: &str, value: &str) {
        self.origin_response_headers
            .push((name.to_string(), value.to_string()));
    }

    /// Every header the origin sent, unfiltered
    pub fn origin_response_headers(&self) -> &[(String, String)] {
        &self.origin_response_headers
    }

    pub fn set_origin_content_length(&mut self, value: &str) {
        self.origin_content_length = Some(value.to_string());
    }

    pub fn origin_content_length(&self) -> Option<&str> {
        self.origin_content_length.as_deref()
    }

    pub fn add_response_header(&mut self, name: &str, value: &str) {
        self.response_headers
            .push((name.to_string(), value.to_string()));
    }

    /// Headers that will be sent back to the client
    pub fn response_headers(&self) -> &[(String, String)] {
        &self.response_headers
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("route_host", &self.route_host)
            .field("request_uri", &self.request_uri)
            .field("proxy", &self.proxy)
            .field("ignored_headers", &self.ignored_headers)
            .field("response_status", &self.response_status)
            .field("has_response_body", &self.response_body.is_some())
            .field("response_gzipped", &self.response_gzipped)
            .finish_non_exhaustive()
    }
}

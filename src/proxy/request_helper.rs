//! Request and response reconstruction for proxied exchanges
//!
//! [`ProxyRequestHelper`] is built once from configuration and then used by
//! every request. It holds no per-request state: everything request-specific
//! lives in the [`RequestContext`] passed to each call.
//!
//! ```rust,ignore
//! let helper = ProxyRequestHelper::new(policy).with_trace_sink(sink);
//!
//! let mut ctx = RequestContext::for_request(&inbound);
//! ctx.set_route_host(route);
//! helper.add_ignored_headers(&mut ctx, ["x-internal-token"]);
//!
//! let uri = helper.build_request_uri(&inbound, &ctx);
//! let params = helper.build_request_query_params(&inbound);
//! let headers = helper.build_request_headers(&inbound, &ctx);
//! let body = request_body.collect().await?.to_bytes();
//! let trace = helper.debug(&ctx, "POST", &uri, &headers, &params, Some(&body[..]));
//!
//! // ... forward `body` upstream ...
//!
//! helper.set_response(&mut ctx, status, Some(upstream_body), &response_headers)?;
//! helper.append_debug(&trace, status, &response_headers);
//! ```

use crate::infrastructure::log_messages::request_processing as messages;
use crate::proxy::context::{InboundRequest, RequestContext, ResponseBody};
use crate::proxy::headers::{is_gzipped, HeaderSet, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, GZIP};
use crate::proxy::http_types::{encode_path, ParamSet};
use crate::proxy::policy::{is_included_header, ProxyPolicyConfig};
use crate::proxy::query::query_string;
use crate::proxy::trace::{TraceHandle, TraceRecorder, TraceSink};
use crate::proxy::types::*;
use http::uri::PathAndQuery;
use http::StatusCode;
use std::io;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Decides what crosses the proxy boundary and records the result
#[derive(Clone, Debug)]
pub struct ProxyRequestHelper {
    policy: Arc<ProxyPolicyConfig>,
    traces: TraceRecorder,
}

impl ProxyRequestHelper {
    pub fn new(policy: ProxyPolicyConfig) -> Self {
        Self {
            policy: Arc::new(policy),
            traces: TraceRecorder::disabled(),
        }
    }

    /// Record every exchange to `sink`
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.traces = TraceRecorder::new(sink);
        self
    }

    pub fn policy(&self) -> &ProxyPolicyConfig {
        &self.policy
    }

    pub fn is_tracing(&self) -> bool {
        self.traces.is_enabled()
    }

    // ========== Header policy ==========

    /// Returns true when `name` may be forwarded for this request
    pub fn is_included_header(&self, name: &str, ctx: &RequestContext) -> bool {
        is_included_header(name, ctx.ignored_headers())
    }

    /// Add headers to this request's ignore set.
    ///
    /// Always adds the configured ignored headers and, when the current route
    /// host is whitelisted, the sensitive headers. Repeated calls only add.
    pub fn add_ignored_headers<I, S>(&self, ctx: &mut RequestContext, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sensitive = self.policy.sensitive_headers_for(ctx.route_host());
        let mut additions: Vec<String> = self
            .policy
            .ignored_headers()
            .iter()
            .chain(sensitive)
            .map(|name| name.as_ref().to_string())
            .collect();
        additions.extend(names.into_iter().map(|name| name.as_ref().to_string()));

        let ignored = ctx.ignored_headers_mut();
        for name in &additions {
            ignored.insert(name);
        }
    }

    // ========== Outbound leg ==========

    /// Path to forward: the context override when present, otherwise the
    /// inbound path.
    ///
    /// The override is used as given, so an empty or relative override is
    /// forwarded as such. An override that cannot be encoded is logged and
    /// ignored rather than failing the request.
    pub fn build_request_uri(&self, request: &InboundRequest, ctx: &RequestContext) -> String {
        let Some(override_uri) = ctx.request_uri() else {
            return request.path().to_string();
        };

        match encode_request_path(override_uri) {
            Ok(encoded) => encoded,
            Err(reason) => {
                debug!(
                    override_uri,
                    fallback = request.path(),
                    reason = %reason,
                    "{}",
                    messages::PATH_ENCODING_FAILED
                );
                request.path().to_string()
            }
        }
    }

    /// The inbound query parameters, unfiltered
    pub fn build_request_query_params(&self, request: &InboundRequest) -> ParamSet {
        let mut params = ParamSet::new();
        let Some(inbound) = request.query_params() else {
            return params;
        };
        for (name, values) in inbound.iter() {
            for value in values {
                params.add(name, value.as_str());
            }
        }
        params
    }

    /// Headers to send upstream.
    ///
    /// Included inbound headers keep all their values; overrides from the
    /// context replace whatever was there; `Accept-Encoding` is always `gzip`.
    pub fn build_request_headers(&self, request: &InboundRequest, ctx: &RequestContext) -> HeaderSet {
        let mut headers = HeaderSet::new();
        for (name, values) in request.headers().iter() {
            if self.is_included_header(name, ctx) {
                for value in values {
                    headers.add(name, value.as_str());
                }
            }
        }
        for (name, value) in ctx.request_headers().pairs() {
            headers.set(name, value);
        }
        headers.set(ACCEPT_ENCODING.as_str(), GZIP);
        headers
    }

    /// Rebuild the query string for `params`
    pub fn query_string(&self, params: &ParamSet) -> String {
        query_string(params)
    }

    // ========== Response leg ==========

    /// Write the upstream response into the context.
    ///
    /// Every header is kept in the origin copy; only headers passing the
    /// inclusion policy reach the client-facing copy. Fails when a body is
    /// supplied after the response has already been committed.
    #[instrument(skip_all, fields(status = status.as_u16()))]
    pub fn set_response(
        &self,
        ctx: &mut RequestContext,
        status: StatusCode,
        body: Option<ResponseBody>,
        headers: &HeaderSet,
    ) -> ProxyResult<()> {
        if body.is_some() && ctx.is_response_committed() {
            return Err(ProxyError::IoError(io::Error::new(
                io::ErrorKind::BrokenPipe,
                messages::RESPONSE_ALREADY_COMMITTED,
            )));
        }
        ctx.set_response_status(status);
        if let Some(body) = body {
            ctx.set_response_body(body);
        }

        let flattened: Vec<(&str, &str)> = headers.pairs().collect();

        let gzipped = flattened
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(CONTENT_ENCODING.as_str()))
            .any(|(_, value)| is_gzipped(value));
        ctx.set_response_gzipped(gzipped);

        for (name, value) in flattened {
            ctx.add_origin_response_header(name, value);
            if name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
                ctx.set_origin_content_length(value);
            }
            if self.is_included_header(name, ctx) {
                ctx.add_response_header(name, value);
            }
        }

        debug!(gzipped, "{}", messages::RESPONSE_APPLIED);
        Ok(())
    }

    // ========== Diagnostics ==========

    /// Record the outbound leg of this exchange.
    ///
    /// `body` is the request body as already buffered by the caller. It is
    /// only borrowed, so the same bytes can still be forwarded upstream.
    /// Without a trace sink this returns an empty handle and does nothing.
    pub fn debug(
        &self,
        ctx: &RequestContext,
        method: &str,
        uri: &str,
        headers: &HeaderSet,
        params: &ParamSet,
        body: Option<&[u8]>,
    ) -> TraceHandle {
        self.traces
            .record_request(ctx, method, uri, headers, params, body)
    }

    /// Attach the response leg to the trace returned by [`Self::debug`]
    pub fn append_debug(&self, handle: &TraceHandle, status: StatusCode, headers: &HeaderSet) {
        self.traces.record_response(handle, status, headers);
    }
}

fn encode_request_path(raw: &str) -> Result<String, http::uri::InvalidUri> {
    let encoded = encode_path(raw);
    if !encoded.is_empty() {
        PathAndQuery::try_from(encoded.as_ref())?;
    }
    Ok(encoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::trace::{SharedTrace, TraceValue};
    use bytes::Bytes;
    use http::Method;
    use http_body_util::{BodyExt, Full};
    use parking_lot::Mutex;

    fn names(raw: &[&str]) -> Vec<PolicyHeaderName> {
        raw.iter()
            .map(|name| PolicyHeaderName::try_new(*name).unwrap())
            .collect()
    }

    fn helper() -> ProxyRequestHelper {
        ProxyRequestHelper::new(
            ProxyPolicyConfig::new()
                .with_sensitive_headers(names(&["Authorization", "Cookie"]))
                .with_whitelist_hosts([HostPattern::try_new("*.trusted.net").unwrap()]),
        )
    }

    fn body(text: &'static str) -> ResponseBody {
        Full::new(Bytes::from_static(text.as_bytes()))
            .map_err(|never| match never {})
            .boxed()
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<SharedTrace>>);

    impl TraceSink for CollectingSink {
        fn append(&self, trace: SharedTrace) {
            self.0.lock().push(trace);
        }
    }

    // ========== Request URI ==========

    #[test]
    fn test_request_uri_defaults_to_inbound_path() {
        let request = InboundRequest::new(Method::GET, "/api/users");
        let uri = helper().build_request_uri(&request, &RequestContext::new());
        assert_eq!(uri, "/api/users");
    }

    #[test]
    fn test_request_uri_override_is_encoded() {
        let request = InboundRequest::new(Method::GET, "/api/users");
        let mut ctx = RequestContext::new();
        ctx.set_request_uri("/users/zoë smith");

        let uri = helper().build_request_uri(&request, &ctx);
        assert_eq!(uri, "/users/zo%C3%AB%20smith");
    }

    #[test]
    fn test_empty_override_is_forwarded_as_empty() {
        // A route stripping its own prefix from a request for exactly that prefix
        let request = InboundRequest::new(Method::GET, "/orders");
        let mut ctx = RequestContext::new();
        ctx.set_request_uri("");

        let uri = helper().build_request_uri(&request, &ctx);
        assert_eq!(uri, "");
    }

    #[test]
    fn test_relative_override_is_encoded_not_replaced() {
        let request = InboundRequest::new(Method::GET, "/orders");
        let mut ctx = RequestContext::new();
        ctx.set_request_uri("v2/orders");
        assert_eq!(helper().build_request_uri(&request, &ctx), "v2/orders");

        ctx.set_request_uri("v2/zoë orders");
        assert_eq!(helper().build_request_uri(&request, &ctx), "v2/zo%C3%AB%20orders");
    }

    #[test]
    fn test_encoded_override_is_a_valid_uri_path() {
        assert_eq!(encode_request_path("/a%b/#frag?q").unwrap(), "/a%25b/%23frag%3Fq");
    }

    // ========== Query parameters ==========

    #[test]
    fn test_query_params_are_copied_verbatim() {
        let request = InboundRequest::new(Method::GET, "/").with_query("b=2&a=1&b=3&flag");
        let params = helper().build_request_query_params(&request);

        assert_eq!(params.iter().map(|(name, _)| name).collect::<Vec<_>>(), ["b", "a", "flag"]);
        assert_eq!(params.get("b").unwrap(), ["2", "3"]);
        assert_eq!(params.get("flag").unwrap(), [""]);
        assert_eq!(helper().query_string(&params), "?b=2&b=3&a=1&flag");
    }

    #[test]
    fn test_missing_query_gives_empty_params() {
        let request = InboundRequest::new(Method::GET, "/");
        assert!(helper().build_request_query_params(&request).is_empty());
    }

    // ========== Request headers ==========

    #[test]
    fn test_multiple_values_survive_in_order() {
        let request = InboundRequest::new(Method::GET, "/")
            .with_header("X-Trace", "a")
            .with_header("X-Trace", "b");

        let headers = helper().build_request_headers(&request, &RequestContext::new());
        assert_eq!(headers.get("X-Trace").unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_structural_headers_are_dropped() {
        let request = InboundRequest::new(Method::POST, "/")
            .with_header("Host", "proxy.local")
            .with_header("Content-Length", "12")
            .with_header("Connection", "keep-alive")
            .with_header("X-Application-Context", "gateway:8080")
            .with_header("Accept", "*/*");

        let headers = helper().build_request_headers(&request, &RequestContext::new());
        assert_eq!(headers.names().collect::<Vec<_>>(), ["Accept", "accept-encoding"]);
    }

    #[test]
    fn test_accept_encoding_is_forced_to_gzip() {
        let request = InboundRequest::new(Method::GET, "/").with_header("Accept-Encoding", "br, deflate");

        let headers = helper().build_request_headers(&request, &RequestContext::new());
        assert_eq!(headers.get("accept-encoding").unwrap(), ["gzip"]);
    }

    #[test]
    fn test_context_overrides_replace_inbound_values() {
        let request = InboundRequest::new(Method::GET, "/")
            .with_header("X-User", "forged")
            .with_header("X-User", "forged-again");
        let mut ctx = RequestContext::new();
        ctx.add_request_header("X-User", "alice");
        ctx.add_request_header("X-Forwarded-Prefix", "/api");

        let headers = helper().build_request_headers(&request, &ctx);
        assert_eq!(headers.get("X-User").unwrap(), ["alice"]);
        assert_eq!(headers.get("x-forwarded-prefix").unwrap(), ["/api"]);
    }

    #[test]
    fn test_sensitive_headers_withheld_from_whitelisted_host() {
        let helper = helper();
        let request = InboundRequest::new(Method::GET, "/")
            .with_header("Authorization", "secret")
            .with_header("X-Foo", "bar");
        let mut ctx = RequestContext::for_request(&request);
        ctx.set_route_host("https://billing.trusted.net/".parse().unwrap());
        helper.add_ignored_headers(&mut ctx, Vec::<&str>::new());

        let headers = helper.build_request_headers(&request, &ctx);
        assert!(!headers.contains("Authorization"));
        assert_eq!(headers.get("X-Foo").unwrap(), ["bar"]);
    }

    #[test]
    fn test_sensitive_headers_forwarded_to_other_hosts() {
        let helper = helper();
        let request = InboundRequest::new(Method::GET, "/")
            .with_header("Authorization", "secret")
            .with_header("X-Foo", "bar");
        let mut ctx = RequestContext::for_request(&request);
        ctx.set_route_host("https://example.com/".parse().unwrap());
        helper.add_ignored_headers(&mut ctx, Vec::<&str>::new());

        let headers = helper.build_request_headers(&request, &ctx);
        assert_eq!(headers.get("Authorization").unwrap(), ["secret"]);
        assert_eq!(headers.get("X-Foo").unwrap(), ["bar"]);
    }

    #[test]
    fn test_add_ignored_headers_unions_every_source() {
        let helper = ProxyRequestHelper::new(
            ProxyPolicyConfig::new()
                .with_ignored_headers(names(&["X-Static"]))
                .with_sensitive_headers(names(&["Cookie"]))
                .with_whitelist_hosts([HostPattern::try_new("*").unwrap()]),
        );
        let mut ctx = RequestContext::new();
        helper.add_ignored_headers(&mut ctx, ["X-Call"]);

        // No route yet, so the gate contributes nothing
        assert!(helper.is_included_header("Cookie", &ctx));
        assert!(!helper.is_included_header("x-static", &ctx));
        assert!(!helper.is_included_header("X-CALL", &ctx));

        ctx.set_route_host("http://anywhere/".parse().unwrap());
        helper.add_ignored_headers(&mut ctx, ["x-later"]);

        assert!(!helper.is_included_header("cookie", &ctx));
        assert!(!helper.is_included_header("X-Call", &ctx));
        assert!(!helper.is_included_header("X-Later", &ctx));
        assert_eq!(ctx.ignored_headers().unwrap().len(), 4);
    }

    // ========== Response ==========

    #[tokio::test]
    async fn test_set_response_writes_status_body_and_headers() {
        let helper = helper();
        let mut ctx = RequestContext::new();
        let headers: HeaderSet = vec![
            ("Content-Type", "text/plain"),
            ("Content-Length", "5"),
            ("Server", "origin"),
            ("Set-Cookie", "a=1"),
            ("Set-Cookie", "b=2"),
        ]
        .into_iter()
        .collect();

        helper
            .set_response(&mut ctx, StatusCode::OK, Some(body("hello")), &headers)
            .unwrap();

        assert_eq!(ctx.response_status(), Some(StatusCode::OK));
        assert_eq!(ctx.origin_content_length(), Some("5"));
        assert!(!ctx.is_response_gzipped());
        assert_eq!(ctx.origin_response_headers().len(), 5);

        let forwarded: Vec<_> = ctx
            .response_headers()
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        assert_eq!(
            forwarded,
            vec![("Content-Type", "text/plain"), ("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")]
        );

        let collected = ctx.take_response_body().unwrap().collect().await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_set_response_detects_gzip() {
        let helper = helper();
        for encoding in ["gzip", "GZIP", "gzip;q=1.0"] {
            let mut ctx = RequestContext::new();
            let headers: HeaderSet = vec![("Content-Encoding", encoding)].into_iter().collect();
            helper
                .set_response(&mut ctx, StatusCode::OK, None, &headers)
                .unwrap();

            assert!(ctx.is_response_gzipped(), "{encoding} should be gzip");
            assert!(ctx.response_headers().is_empty());
            assert_eq!(ctx.origin_response_headers().len(), 1);
        }
    }

    #[test]
    fn test_set_response_without_gzip() {
        let helper = helper();
        let mut identity = RequestContext::new();
        let headers: HeaderSet = vec![("Content-Encoding", "identity")].into_iter().collect();
        helper
            .set_response(&mut identity, StatusCode::OK, None, &headers)
            .unwrap();
        assert!(!identity.is_response_gzipped());

        let mut absent = RequestContext::new();
        helper
            .set_response(&mut absent, StatusCode::NO_CONTENT, None, &HeaderSet::new())
            .unwrap();
        assert!(!absent.is_response_gzipped());
        assert!(!absent.has_response_body());
    }

    #[test]
    fn test_set_response_honours_request_ignores() {
        let helper = helper();
        let mut ctx = RequestContext::new();
        helper.add_ignored_headers(&mut ctx, ["X-Internal-Debug"]);
        let headers: HeaderSet = vec![("x-internal-debug", "1"), ("ETag", "\"v1\"")]
            .into_iter()
            .collect();

        helper
            .set_response(&mut ctx, StatusCode::OK, None, &headers)
            .unwrap();

        assert_eq!(ctx.origin_response_headers().len(), 2);
        assert_eq!(ctx.response_headers(), [("ETag".to_string(), "\"v1\"".to_string())]);
    }

    #[test]
    fn test_set_response_fails_once_committed() {
        let helper = helper();
        let mut ctx = RequestContext::new();
        ctx.mark_response_committed();

        let result = helper.set_response(&mut ctx, StatusCode::OK, Some(body("late")), &HeaderSet::new());

        assert!(matches!(result, Err(ProxyError::IoError(_))));
        assert!(!ctx.has_response_body());
        assert!(ctx.response_status().is_none());
    }

    // ========== Diagnostics ==========

    #[test]
    fn test_debug_without_sink_is_empty() {
        let helper = helper();
        let handle =
            helper.debug(&RequestContext::new(), "GET", "/", &HeaderSet::new(), &ParamSet::new(), None);

        assert!(!helper.is_tracing());
        assert!(!handle.is_recorded());
        assert_eq!(handle.snapshot().method, "");
        helper.append_debug(&handle, StatusCode::OK, &HeaderSet::new());
    }

    #[test]
    fn test_full_exchange_is_traced() {
        let sink = Arc::new(CollectingSink::default());
        let helper = helper().with_trace_sink(sink.clone());
        let request = InboundRequest::new(Method::POST, "/orders")
            .with_query("dry run=yes")
            .with_header("Content-Type", "application/json")
            .with_header("X-Trace", "a")
            .with_header("X-Trace", "b");
        let ctx = RequestContext::for_request(&request);

        let uri = helper.build_request_uri(&request, &ctx);
        let params = helper.build_request_query_params(&request);
        let headers = helper.build_request_headers(&request, &ctx);
        let payload = Bytes::from_static(b"{\"qty\":1}");
        let handle = helper.debug(&ctx, "POST", &uri, &headers, &params, Some(&payload[..]));

        let response: HeaderSet = vec![("X-Upstream", "1")].into_iter().collect();
        helper.append_debug(&handle, StatusCode::ACCEPTED, &response);

        let stored = sink.0.lock()[0].read().clone();
        assert_eq!(stored.query, "?dry%20run=yes");
        assert_eq!(stored.body.as_deref(), Some("{\"qty\":1}"));
        assert_eq!(
            stored.headers.request.get("x-trace"),
            Some(&TraceValue::Multiple(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(
            stored.headers.response.unwrap().get("status"),
            Some(&TraceValue::Single("202".to_string()))
        );
    }

    #[tokio::test]
    async fn test_traced_body_is_still_forwardable() {
        let helper = helper().with_trace_sink(Arc::new(CollectingSink::default()));
        let ctx = RequestContext::new();
        let payload = Bytes::from_static(b"{\"qty\":1}");

        let handle = helper.debug(&ctx, "POST", "/", &HeaderSet::new(), &ParamSet::new(), Some(&payload[..]));
        assert_eq!(handle.snapshot().body.as_deref(), Some("{\"qty\":1}"));

        let forwarded = Full::new(payload).collect().await.unwrap().to_bytes();
        assert_eq!(forwarded.len(), 9);
        assert_eq!(forwarded, Bytes::from_static(b"{\"qty\":1}"));
    }
}

//! Header inclusion policy and the sensitive header gate
//!
//! Two decisions live here:
//! - whether a header name may cross the proxy boundary (either direction)
//! - whether the configured sensitive headers apply to the current destination

use crate::proxy::context::IgnoredHeaders;
use crate::proxy::headers::ALWAYS_EXCLUDED;
use crate::proxy::pattern::matches_any;
use crate::proxy::types::{HostPattern, PolicyHeaderName};
use http::Uri;
use std::collections::BTreeSet;

static NO_HEADERS: BTreeSet<PolicyHeaderName> = BTreeSet::new();

/// Returns true when `name` may be forwarded.
///
/// `ignored` is the request-scoped ignore set; a header listed there, or in
/// [`ALWAYS_EXCLUDED`], is never forwarded.
pub fn is_included_header(name: &str, ignored: Option<&IgnoredHeaders>) -> bool {
    let name = name.to_lowercase();
    if ignored.is_some_and(|ignored| ignored.contains(&name)) {
        return false;
    }
    !ALWAYS_EXCLUDED.contains(&name.as_str())
}

/// Static forwarding configuration, shared read-only by every request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyPolicyConfig {
    ignored_headers: BTreeSet<PolicyHeaderName>,
    sensitive_headers: BTreeSet<PolicyHeaderName>,
    whitelist_hosts: Vec<HostPattern>,
}

impl ProxyPolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers never forwarded for any request
    pub fn with_ignored_headers<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = PolicyHeaderName>,
    {
        self.ignored_headers.extend(names);
        self
    }

    /// Headers withheld when the destination matches a whitelisted host
    pub fn with_sensitive_headers<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = PolicyHeaderName>,
    {
        self.sensitive_headers.extend(names);
        self
    }

    pub fn with_whitelist_hosts<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = HostPattern>,
    {
        for pattern in patterns {
            if !self.whitelist_hosts.contains(&pattern) {
                self.whitelist_hosts.push(pattern);
            }
        }
        self
    }

    pub fn ignored_headers(&self) -> &BTreeSet<PolicyHeaderName> {
        &self.ignored_headers
    }

    pub fn sensitive_headers(&self) -> &BTreeSet<PolicyHeaderName> {
        &self.sensitive_headers
    }

    pub fn whitelist_hosts(&self) -> &[HostPattern] {
        &self.whitelist_hosts
    }

    /// The sensitive headers that apply to `route_host`.
    ///
    /// Empty until routing has chosen a destination, and empty for hosts that
    /// match none of the whitelist patterns.
    pub fn sensitive_headers_for(&self, route_host: Option<&Uri>) -> &BTreeSet<PolicyHeaderName> {
        let Some(host) = route_host.and_then(Uri::host) else {
            return &NO_HEADERS;
        };
        let host = host.to_lowercase();
        if matches_any(self.whitelist_hosts.iter().map(AsRef::as_ref), &host) {
            &self.sensitive_headers
        } else {
            &NO_HEADERS
        }
    }
}

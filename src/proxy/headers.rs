//! HTTP header constants and the ordered header collection used on both legs
//!
//! This module centralizes the header names the forwarding policy cares about
//! and provides [`HeaderSet`], a multi-valued header map that matches names
//! case-insensitively while keeping the spelling the header first arrived with.

use serde::{Deserialize, Serialize};

/// Diagnostic header the proxy itself attaches; never forwarded in either direction
pub const X_APPLICATION_CONTEXT: &str = "x-application-context";

/// Headers that the transport always re-derives and that must never be copied
/// verbatim across the proxy boundary
pub const ALWAYS_EXCLUDED: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "content-encoding",
    "server",
    "transfer-encoding",
    X_APPLICATION_CONTEXT,
];

/// Sensitive headers used when no configuration overrides them
pub const DEFAULT_SENSITIVE_HEADERS: &[&str] = &["cookie", "set-cookie", "authorization"];

/// The only content coding the proxy knows how to decode on the response leg
pub const GZIP: &str = "gzip";

/// Standard header re-exports for convenience
pub use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};

/// Returns true when a `Content-Encoding` value names gzip.
///
/// The value may be a comma-separated coding list and each coding may carry
/// parameters (`gzip;q=1.0`). Anything unrecognised is simply not gzip.
pub fn is_gzipped(content_encoding: &str) -> bool {
    content_encoding.split(',').any(|coding| {
        let token = coding.split(';').next().unwrap_or_default().trim();
        token.eq_ignore_ascii_case(GZIP) || token.eq_ignore_ascii_case("x-gzip")
    })
}

/// Returns true when a `Transfer-Encoding` value announces a chunked body
pub fn is_chunked(transfer_encoding: &str) -> bool {
    transfer_encoding
        .split(',')
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Ordered, multi-valued collection of HTTP headers.
///
/// Names compare case-insensitively. The first spelling seen for a name is the
/// one that is kept, so `X-Trace` followed by `x-trace` yields a single
/// `X-Trace` entry with two values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSet(Vec<(String, Vec<String>)>);

impl HeaderSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Append a value, keeping any values already present under `name`
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.0[index].1.push(value.into()),
            None => self.0.push((name, vec![value.into()])),
        }
    }

    /// Replace every value under `name` with exactly one value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.0[index].1 = vec![value.into()],
            None => self.0.push((name, vec![value.into()])),
        }
    }

    /// All values stored under `name`, in arrival order
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|index| self.0[index].1.as_slice())
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|index| self.0.remove(index).1)
    }

    /// Header names in arrival order, with their stored spelling
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    /// Entries grouped by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Every name/value pair, flattened in order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

/// Header value as text: UTF-8 when it is valid, otherwise each byte read as
/// ISO-8859-1 so obs-text survives unchanged
pub fn header_value_text(value: &http::HeaderValue) -> String {
    let bytes = value.as_bytes();
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&byte| char::from(byte)).collect(),
    }
}

impl From<&http::HeaderMap> for HeaderSet {
    fn from(map: &http::HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| (name.as_str().to_string(), header_value_text(value)))
            .collect()
    }
}

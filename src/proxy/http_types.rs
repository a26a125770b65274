//! Type-safe HTTP components for request reconstruction
//!
//! Path and query representations plus the percent-encoding rules used when
//! the outbound URI is rebuilt.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Characters left as-is inside a path: unreserved, sub-delims, `:`, `@` and `/`
const PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@')
    .remove(b'/');

/// Characters left as-is inside a query name or value.
///
/// `&`, `=` and `+` are escaped because they carry meaning when the query is
/// parsed back into parameters.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b':')
    .remove(b'@')
    .remove(b'/')
    .remove(b'?');

/// Percent-encode a path for use in an outbound URI.
///
/// The path is encoded as given: relative and empty paths are valid input.
pub fn encode_path(raw: &str) -> Cow<'_, str> {
    utf8_percent_encode(raw, PATH).into()
}

/// Percent-encode a single query name or value
pub fn encode_query_component(raw: &str) -> Cow<'_, str> {
    utf8_percent_encode(raw, QUERY_COMPONENT).into()
}

fn decode_query_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// Ordered, multi-valued query parameters.
///
/// Names are case-sensitive. Empty values are kept: `?debug` and `?debug=`
/// both produce a `debug` parameter with one empty value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSet(Vec<(String, Vec<String>)>);

impl ParamSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse a raw query string; a single leading `?` is skipped
    pub fn parse(query: &str) -> Self {
        query
            .strip_prefix('?')
            .unwrap_or(query)
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => {
                    (decode_query_component(name), decode_query_component(value))
                }
                None => (decode_query_component(pair), String::new()),
            })
            .collect()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, values)) => values.push(value.into()),
            None => self.0.push((name, vec![value.into()])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Entries grouped by name, in encounter order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ParamSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.add(name, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_encoding() {
        assert_eq!(encode_path("/a b/ü/x:y@z;v=1"), "/a%20b/%C3%BC/x:y@z;v=1");
    }

    #[test]
    fn test_path_encoding_escapes_reserved_query_markers() {
        assert_eq!(encode_path("/what?#"), "/what%3F%23");
    }

    #[test]
    fn test_path_encoding_accepts_relative_and_empty_paths() {
        assert_eq!(encode_path(""), "");
        assert_eq!(encode_path("v2/orders"), "v2/orders");
        assert_eq!(encode_path("v2/zoë"), "v2/zo%C3%AB");
    }

    #[test]
    fn test_query_component_encoding() {
        assert_eq!(encode_query_component("a b&c=d+e"), "a%20b%26c%3Dd%2Be");
        assert_eq!(encode_query_component("/path?x"), "/path?x");
        assert_eq!(encode_query_component("100%"), "100%25");
    }

    #[test]
    fn test_query_string_parsing() {
        let params = ParamSet::parse("foo=bar&baz=qux&foo=again");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("foo").unwrap(), ["bar", "again"]);
        assert_eq!(params.get("baz").unwrap(), ["qux"]);
    }

    #[test]
    fn test_query_string_parsing_keeps_empty_values() {
        let params = ParamSet::parse("?debug&empty=&&x=1");
        assert_eq!(params.get("debug").unwrap(), [""]);
        assert_eq!(params.get("empty").unwrap(), [""]);
        assert_eq!(params.get("x").unwrap(), ["1"]);
    }

    #[test]
    fn test_query_string_parsing_decodes() {
        let params = ParamSet::parse("q=a+b%26c&name=%C3%BC");
        assert_eq!(params.get("q").unwrap(), ["a b&c"]);
        assert_eq!(params.get("name").unwrap(), ["ü"]);
    }

    #[test]
    fn test_param_names_are_case_sensitive() {
        let params: ParamSet = vec![("Id", "1"), ("id", "2")].into_iter().collect();
        assert_eq!(params.len(), 2);
        assert!(params.get("ID").is_none());
    }
}

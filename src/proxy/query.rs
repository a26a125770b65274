//! Query string reconstruction
//!
//! The query is first laid out as a template whose values are placeholders,
//! one per value occurrence, and then expanded. Expansion is the only place
//! values are written, and every value goes through the same query-component
//! encoder, so arbitrary characters (`&`, `=`, spaces, non-ASCII) cannot leak
//! into the structure of the query.

use crate::proxy::http_types::{encode_query_component, ParamSet};
use std::collections::HashMap;

/// Identifies one value: the parameter name and the value's zero-based
/// position among that name's values
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct Placeholder<'a> {
    name: &'a str,
    occurrence: usize,
}

#[derive(Debug)]
enum Segment<'a> {
    Separator(char),
    Name(&'a str),
    Value(Placeholder<'a>),
}

/// A query laid out with placeholders in place of values
#[derive(Debug, Default)]
struct QueryTemplate<'a> {
    segments: Vec<Segment<'a>>,
}

impl<'a> QueryTemplate<'a> {
    fn expand(&self, values: &HashMap<Placeholder<'a>, &'a str>) -> String {
        let mut query = String::from("?");
        for segment in &self.segments {
            match segment {
                Segment::Separator(c) => query.push(*c),
                Segment::Name(name) => query.push_str(&encode_query_component(name)),
                Segment::Value(placeholder) => {
                    if let Some(value) = values.get(placeholder) {
                        query.push_str(&encode_query_component(value));
                    }
                }
            }
        }
        query
    }
}

/// Rebuild a query string from `params`.
///
/// Returns `""` when there are no parameters, otherwise `?` followed by the
/// encoded parameters in encounter order. Empty values are written as a bare
/// name.
pub fn query_string(params: &ParamSet) -> String {
    if params.is_empty() {
        return String::new();
    }

    let mut template = QueryTemplate::default();
    let mut values = HashMap::new();
    for (name, occurrences) in params.iter() {
        for (occurrence, value) in occurrences.iter().enumerate() {
            if !template.segments.is_empty() {
                template.segments.push(Segment::Separator('&'));
            }
            template.segments.push(Segment::Name(name));
            if !value.is_empty() {
                let placeholder = Placeholder { name, occurrence };
                values.insert(placeholder.clone(), value.as_str());
                template.segments.push(Segment::Separator('='));
                template.segments.push(Segment::Value(placeholder));
            }
        }
    }

    template.expand(&values)
}

//! The query result type.
//!
//! Borrows from the input buffer wherever possible; only unescaped text
//! (which may require allocation when entities are present) and computed
//! forms (`Array`, `to_string_form`) own their bytes.

use std::borrow::Cow;

/// A typed result of a `query` call, or one constituent of an `Array`.
///
/// `True`/`False` are represented as a single `Bool(bool)` variant rather
/// than two separate variants.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<'a> {
    Null,
    Bool(bool),
    /// Caches the parsed double rather than re-parsing on every read.
    Number(f64),
    String(Cow<'a, str>),
    /// An element's raw inner span (content between open and close tags,
    /// empty for self-closing), so a caller can re-query just that subset.
    Element(Cow<'a, str>),
    Attribute(Cow<'a, str>),
    Array(Vec<QueryResult<'a>>),
}

impl<'a> QueryResult<'a> {
    /// `false` only for `Null`.
    pub fn exists(&self) -> bool {
        !matches!(self, QueryResult::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, QueryResult::Null)
    }

    /// The scalar string representation used by string-typed accessors.
    /// Not the canonical JSON-like form used for comparisons/sorting — see
    /// `to_string_form`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryResult::String(s) | QueryResult::Element(s) | QueryResult::Attribute(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            QueryResult::Number(n) => Some(*n),
            QueryResult::String(s) | QueryResult::Element(s) | QueryResult::Attribute(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[QueryResult<'a>]> {
        match self {
            QueryResult::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Drop all borrows, producing a `'static` copy. Used when a caller
    /// needs a `QueryResult` to outlive the input buffer.
    pub fn into_owned(self) -> QueryResult<'static> {
        match self {
            QueryResult::Null => QueryResult::Null,
            QueryResult::Bool(b) => QueryResult::Bool(b),
            QueryResult::Number(n) => QueryResult::Number(n),
            QueryResult::String(s) => QueryResult::String(Cow::Owned(s.into_owned())),
            QueryResult::Element(s) => QueryResult::Element(Cow::Owned(s.into_owned())),
            QueryResult::Attribute(s) => QueryResult::Attribute(Cow::Owned(s.into_owned())),
            QueryResult::Array(items) => QueryResult::Array(items.into_iter().map(QueryResult::into_owned).collect()),
        }
    }

    /// The JSON-like canonical string form filter expressions and `@sort`
    /// compare against.
    pub fn to_string_form(&self) -> String {
        match self {
            QueryResult::Null => "null".to_string(),
            QueryResult::Bool(b) => b.to_string(),
            QueryResult::Number(n) => format_number(*n),
            QueryResult::String(s) | QueryResult::Element(s) | QueryResult::Attribute(s) => s.to_string(),
            QueryResult::Array(items) => {
                let mut out = String::from("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(&item.to_string_form().replace('\\', "\\\\").replace('"', "\\\""));
                    out.push('"');
                }
                out.push(']');
                out
            }
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_is_false_only_for_null() {
        assert!(!QueryResult::Null.exists());
        assert!(QueryResult::Bool(false).exists());
        assert!(QueryResult::String(Cow::Borrowed("")).exists());
    }

    #[test]
    fn array_string_form_matches_scenario_three() {
        let arr = QueryResult::Array(vec![
            QueryResult::String(Cow::Borrowed("a")),
            QueryResult::String(Cow::Borrowed("b")),
            QueryResult::String(Cow::Borrowed("c")),
        ]);
        assert_eq!(arr.to_string_form(), r#"["a","b","c"]"#);
    }

    #[test]
    fn number_string_form_drops_trailing_zero() {
        assert_eq!(QueryResult::Number(3.0).to_string_form(), "3");
        assert_eq!(QueryResult::Number(3.5).to_string_form(), "3.5");
    }

    #[test]
    fn into_owned_detaches_borrow() {
        let owned = {
            let s = String::from("hello");
            QueryResult::String(Cow::Borrowed(s.as_str())).into_owned()
        };
        assert_eq!(owned.as_str(), Some("hello"));
    }
}

//! `xmldot` is a GJSON-style dot-path query and in-place mutation engine
//! for raw XML byte buffers.
//!
//! It never materializes a DOM: `query` walks a compiled dot-path directly
//! over a borrowed `&[u8]`, returning a [`QueryResult`] that borrows back
//! into the same buffer wherever possible. `set`/`set_raw`/`delete` splice
//! the minimum byte span needed for an edit and hand back a new buffer,
//! leaving every byte outside that span untouched.
//!
//! # Example
//! ```rust
//! let doc = br#"<users><user id="1"><name>Ann</name></user></users>"#;
//! let path = xmldot::compile_path("users.user.0.name", None);
//! let name = xmldot::query(doc, &path, None);
//! assert_eq!(name.as_str(), Some("Ann"));
//! ```
//!
//! # Path grammar
//! Dot-separated segments navigate elements (`users.user`), `@name` reads
//! an attribute, `%` reads direct text, `#` counts siblings, `#.field`
//! extracts a field from every sibling, `#(cond)`/`#(cond)#` filter to the
//! first/all matches, and a trailing `|@modifier` pipes the result through
//! `@first`/`@last`/`@reverse`/`@sort`/`@count`.
//!
//! # Non-goals
//! This is not a conformant XML 1.0 parser: no DTD/XSD validation, no
//! external entity expansion, no namespace URI resolution (prefixes are
//! compared as literal strings), no Unicode case folding.

mod error;
mod escape;
mod eval;
mod limits;
mod matcher;
mod mutate;
mod options;
mod path;
mod scanner;
mod value;

pub use error::{Error, Position, Result};
pub use mutate::Value;
pub use options::Options;
pub use value::QueryResult;

/// An opaque, cheaply-clonable compiled path, produced by [`compile_path`]
/// and accepted by [`query`], [`set`], [`set_raw`], and [`delete`].
///
/// Compiling the same path string twice returns handles backed by the same
/// underlying allocation (see the process-global cache in `src/path/cache.rs`).
#[derive(Debug, Clone)]
pub struct CompiledPath(path::CompiledPath);

impl CompiledPath {
    /// `true` if `path` failed to compile: an empty path, a field name
    /// over the length limit, an out-of-range index, etc.
    /// `query` treats an invalid path as "always yields Null"; `set`/
    /// `set_raw`/`delete` treat it as `Error::InvalidPath`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compile `path` into a [`CompiledPath`], using the process-wide cache.
///
/// `opts` only affects the *compiled* path (currently: none of its fields
/// do — matching is options-sensitive at evaluation time, not compile
/// time), so it is accepted for API symmetry with `query`/`set` and may be
/// `None`.
pub fn compile_path(path: &str, _opts: Option<&Options>) -> CompiledPath {
    CompiledPath(path::compile(path))
}

/// Evaluate a compiled path against `doc`, returning [`QueryResult::Null`]
/// when the path doesn't match anything or failed to compile. `query`
/// never errors.
pub fn query<'a>(doc: &'a [u8], path: &CompiledPath, opts: Option<&Options>) -> QueryResult<'a> {
    let default = Options::default();
    eval::query(doc, &path.0, opts.unwrap_or(&default))
}

/// Set the value at `path` to `value`, returning a new document buffer.
///
/// Creates missing ancestor elements along the way and appends via a
/// terminal `-1` index segment. Fails with
/// [`Error::InvalidPath`] for an empty/invalid path or an unsupported
/// mutation target, or [`Error::MalformedXml`] if `doc` exceeds the
/// maximum document size or fails strict well-formedness.
pub fn set(doc: &[u8], path: &CompiledPath, value: Value<'_>, opts: Option<&Options>) -> Result<Vec<u8>> {
    let default = Options::default();
    mutate::set(doc, &path.0, value, opts.unwrap_or(&default))
}

/// Like [`set`], but `raw` is spliced in verbatim (after a mini
/// well-formedness scan) instead of being escaped as a scalar value.
pub fn set_raw(doc: &[u8], path: &CompiledPath, raw: &str, opts: Option<&Options>) -> Result<Vec<u8>> {
    let default = Options::default();
    mutate::set_raw(doc, &path.0, raw, opts.unwrap_or(&default))
}

/// Delete the element or attribute at `path`, returning a new document
/// buffer. Removes an element's full tag-to-tag span plus trailing
/// whitespace up to (not past) the next newline.
pub fn delete(doc: &[u8], path: &CompiledPath, opts: Option<&Options>) -> Result<Vec<u8>> {
    let default = Options::default();
    mutate::delete(doc, &path.0, opts.unwrap_or(&default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_round_trips_a_set_then_get() {
        let doc = b"<root><user><name>John</name></user></root>";
        let path = compile_path("root.user.name", None);
        let updated = set(doc, &path, Value::Str("Jane"), None).unwrap();
        let result = query(&updated, &path, None);
        assert_eq!(result.as_str(), Some("Jane"));
    }

    #[test]
    fn invalid_path_never_errors_on_query() {
        let path = compile_path("", None);
        assert!(path.is_empty());
        assert!(query(b"<root/>", &path, None).is_null());
    }

    #[test]
    fn invalid_path_errors_on_set() {
        let path = compile_path("", None);
        assert!(set(b"<root/>", &path, Value::Str("x"), None).is_err());
    }
}

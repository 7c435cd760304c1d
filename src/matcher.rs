//! Element/attribute name matching.
//!
//! Matching is a plain byte/ASCII-case comparison augmented with namespace
//! prefix handling. There's no Unicode case folding and no XML namespace
//! URI resolution: prefixes are matched as literal strings, optionally
//! remapped by `Options::namespaces`.

use crate::options::Options;

/// Lowercase ASCII bytes only; non-ASCII bytes pass through untouched.
fn ascii_fold(s: &str) -> std::borrow::Cow<'_, str> {
    if s.bytes().any(|b| b.is_ascii_uppercase()) {
        std::borrow::Cow::Owned(s.chars().map(|c| c.to_ascii_lowercase()).collect())
    } else {
        std::borrow::Cow::Borrowed(s)
    }
}

fn names_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        ascii_fold(a) == ascii_fold(b)
    }
}

/// Split a document element's qualified name (`prefix:local` or just
/// `local`) the same way the path compiler splits a segment's name.
fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.find(':') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (Some(&name[..idx]), &name[idx + 1..]),
        _ => (None, name),
    }
}

/// Does a document element's tag name match a path segment's
/// `(name, prefix)` pair under the given options?
///
/// When the segment carries no prefix, it matches any document element
/// with the same local name regardless of the element's own prefix (so
/// `root.title` matches `<ns:title>` just as it matches `<title>`) -
/// consistent with this crate's prefix-string-only namespace model: a
/// path author who does care about the prefix writes it explicitly.
pub(crate) fn element_matches(
    doc_name: &str,
    seg_name: &str,
    seg_prefix: Option<&str>,
    opts: &Options,
) -> bool {
    let (doc_prefix, doc_local) = split_qualified(doc_name);
    match seg_prefix {
        None => names_equal(doc_local, seg_name, opts.case_sensitive),
        Some(prefix) => {
            let resolved = opts.resolve_prefix(prefix);
            match doc_prefix {
                Some(doc_prefix) => {
                    names_equal(doc_prefix, resolved, opts.case_sensitive)
                        && names_equal(doc_local, seg_name, opts.case_sensitive)
                }
                None => false,
            }
        }
    }
}

pub(crate) fn attribute_matches(doc_name: &str, seg_name: &str, opts: &Options) -> bool {
    names_equal(doc_name, seg_name, opts.case_sensitive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprefixed_segment_matches_any_prefix() {
        let opts = Options::default();
        assert!(element_matches("ns:title", "title", None, &opts));
        assert!(element_matches("title", "title", None, &opts));
    }

    #[test]
    fn prefixed_segment_requires_matching_prefix() {
        let opts = Options::default();
        assert!(element_matches("ns:title", "title", Some("ns"), &opts));
        assert!(!element_matches("other:title", "title", Some("ns"), &opts));
        assert!(!element_matches("title", "title", Some("ns"), &opts));
    }

    #[test]
    fn case_insensitive_option_folds_ascii_only() {
        let mut opts = Options::default();
        opts.case_sensitive = false;
        assert!(element_matches("TITLE", "title", None, &opts));
        assert!(!names_equal("caf\u{e9}", "CAF\u{c9}", false));
    }

    #[test]
    fn namespace_alias_resolves_before_comparison() {
        let mut opts = Options::default();
        opts.namespaces.insert("alias".to_string(), "real".to_string());
        assert!(element_matches("real:title", "title", Some("alias"), &opts));
    }
}

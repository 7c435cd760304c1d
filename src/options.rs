//! Options plumbing.
//!
//! Threaded through the compiler, matcher, and mutator. `is_default` lets
//! hot call sites skip option-aware branches entirely.

use std::collections::HashMap;

/// Behavior knobs for `compile_path`/`query`/`set`/`set_raw`/`delete`.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Element/attribute name matching is case-sensitive when `true`
    /// (default). When `false`, names are ASCII-lowercased before
    /// comparison (no Unicode case folding).
    pub case_sensitive: bool,

    /// Indentation string used by the mutator when creating a missing
    /// ancestor chain. Empty by default: no newlines or indentation are
    /// inserted.
    pub indent: String,

    /// When `true`, the mutator avoids collapsing whitespace runs it would
    /// otherwise normalize around an edit. Default `false`.
    pub preserve_whitespace: bool,

    /// Alias table from a path's namespace prefix to the prefix actually
    /// used in the document. Empty by default: prefixes are compared
    /// literally.
    pub namespaces: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            case_sensitive: true,
            indent: String::new(),
            preserve_whitespace: false,
            namespaces: HashMap::new(),
        }
    }
}

impl Options {
    /// `true` for the default snapshot, letting the compiler/matcher/mutator
    /// bypass option-aware code on the fast path.
    pub fn is_default(&self) -> bool {
        self.case_sensitive
            && self.indent.is_empty()
            && !self.preserve_whitespace
            && self.namespaces.is_empty()
    }

    /// Resolve a path-side namespace prefix to the prefix actually present
    /// in the document, following `namespaces`. Identity when unaliased.
    pub(crate) fn resolve_prefix<'a>(&'a self, prefix: &'a str) -> &'a str {
        self.namespaces.get(prefix).map(String::as_str).unwrap_or(prefix)
    }
}

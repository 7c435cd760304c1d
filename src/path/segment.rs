//! Compiled path data model.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Exists,
}

/// `(sub-path, operator, literal)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterCondition {
    pub sub_path: Arc<[Segment]>,
    pub op: FilterOp,
    pub literal: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Modifier {
    First,
    Last,
    Reverse,
    Sort,
    Count,
    /// Anything not in the minimum built-in set degrades to identity.
    Unknown,
}

impl Modifier {
    pub(crate) fn from_token(token: &str) -> Modifier {
        match token {
            "@first" => Modifier::First,
            "@last" => Modifier::Last,
            "@reverse" => Modifier::Reverse,
            "@sort" => Modifier::Sort,
            "@count" => Modifier::Count,
            _ => Modifier::Unknown,
        }
    }
}

/// What a single field-extraction/filter sub-path target looks like:
/// an element child, an attribute, or direct text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Field {
    Element(String),
    Attribute(String),
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SegmentKind {
    Element { name: String, prefix: Option<String> },
    Attribute { name: String },
    /// Just the raw index (`-1..=N`); whether it means replace, append, or
    /// read-only access is decided procedurally by the evaluator/mutator,
    /// not at compile time, since a cached compiled path is shared between
    /// `Get` and `Set` callers.
    Index { value: i64 },
    Wildcard,
    RecursiveWildcard,
    Filter { condition: Box<FilterCondition>, all: bool },
    Text,
    Count,
    FieldExtraction { field: Field },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Segment {
    pub kind: SegmentKind,
    pub modifiers: Vec<Modifier>,
}

/// A compiled path is an immutable, cheaply-clonable sequence of segments.
/// Sharing via `Arc` avoids a deep copy on every cache hit: the data is
/// never mutated after compilation, so handing out another
/// reference-counted handle is indistinguishable from a clone to every
/// caller.
pub(crate) type CompiledPath = Arc<[Segment]>;

pub(crate) fn empty_path() -> CompiledPath {
    Arc::from(Vec::new())
}

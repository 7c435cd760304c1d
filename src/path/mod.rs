//! Path compilation: string -> `CompiledPath`.

mod cache;
mod parse;
mod segment;

pub(crate) use segment::{
    CompiledPath, Field, FilterCondition, FilterOp, Modifier, Segment, SegmentKind, empty_path,
};

/// Compile (or fetch from cache) the segment sequence for `path`.
///
/// Returns an empty `CompiledPath` when `path` fails any validation rule;
/// callers decide what emptiness means for them (`Get` treats it as "yield
/// Null", `Set`/`Delete` treat it as `Error::InvalidPath`).
pub(crate) fn compile(path: &str) -> CompiledPath {
    cache::get_or_compile(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_compiles_empty() {
        assert!(compile("").is_empty());
    }

    #[test]
    fn valid_path_round_trips_through_cache() {
        let segs = compile("root.item.name");
        assert_eq!(segs.len(), 3);
    }
}

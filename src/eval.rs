//! The path evaluator behind `query`.
//!
//! Drives the Scanner in lock-step with a compiled path. Each step either
//! narrows to a single matched element and descends into its content, or
//! (when the next segment is an aggregate consumer — Index, Count,
//! FieldExtraction, Filter — or the producing segment is itself a
//! wildcard) gathers every matching sibling and hands the whole list to
//! that consumer.

use crate::error::Result;
use crate::escape;
use crate::limits::MAX_WILDCARD_RESULTS;
use crate::matcher;
use crate::options::Options;
use crate::path::{Field, FilterCondition, FilterOp, Modifier, Segment, SegmentKind};
use crate::scanner::{self, ChildIter, ElementSpan};
use crate::value::QueryResult;
use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::ops::Range;

/// Entry point used by the crate root's `query`. Never errors: a malformed
/// document or an internal scanner failure surfaces as `Null` instead.
pub(crate) fn query<'a>(bytes: &'a [u8], segments: &[Segment], opts: &Options) -> QueryResult<'a> {
    if segments.is_empty() {
        return QueryResult::Null;
    }
    let depth_budget = crate::limits::MAX_NESTING_DEPTH;
    eval_segment(bytes, 0..bytes.len(), segments, 0, opts, depth_budget).unwrap_or(QueryResult::Null)
}

/// Resolve `segments[idx]` (and everything after it) against the direct
/// children of `parent_content`.
fn eval_segment<'a>(
    bytes: &'a [u8],
    parent_content: Range<usize>,
    segments: &[Segment],
    idx: usize,
    opts: &Options,
    depth_budget: usize,
) -> Result<QueryResult<'a>> {
    let seg = &segments[idx];
    let mut result = match &seg.kind {
        SegmentKind::Element { name, prefix } => {
            let candidates = collect_named(bytes, parent_content, name, prefix.as_deref(), opts, depth_budget)?;
            finish(bytes, candidates, segments, idx, false, opts, depth_budget)?
        }
        SegmentKind::Wildcard => {
            let candidates = collect_any_direct(bytes, parent_content, depth_budget)?;
            let force_array = candidates.len() > 1;
            finish(bytes, candidates, segments, idx, force_array, opts, depth_budget)?
        }
        SegmentKind::RecursiveWildcard => {
            eval_recursive_wildcard(bytes, parent_content, segments, idx, opts, depth_budget)?
        }
        SegmentKind::Filter { condition, all } => {
            let pool = collect_any_direct(bytes, parent_content, depth_budget)?;
            let kept = apply_filter(bytes, &pool, condition, opts, depth_budget)?;
            finish(bytes, kept, segments, idx, *all, opts, depth_budget)?
        }
        // Reached with no preceding producer segment (e.g. a bare path
        // "@id"). Not a meaningful navigation step on its own.
        SegmentKind::Attribute { .. }
        | SegmentKind::Text
        | SegmentKind::Count
        | SegmentKind::FieldExtraction { .. }
        | SegmentKind::Index { .. } => QueryResult::Null,
    };
    apply_modifiers(&mut result, &seg.modifiers);
    Ok(result)
}

/// Given candidates gathered by the segment at `idx`, decide what the
/// segment at `idx + 1` (if any) wants: an aggregate consumer, a
/// per-candidate map (when `force_array`), or first-match navigation.
fn finish<'a>(
    bytes: &'a [u8],
    candidates: Vec<ElementSpan>,
    segments: &[Segment],
    idx: usize,
    force_array: bool,
    opts: &Options,
    depth_budget: usize,
) -> Result<QueryResult<'a>> {
    let next_idx = idx + 1;
    let next = segments.get(next_idx);

    let mut result = match next.map(|s| &s.kind) {
        Some(SegmentKind::Attribute { name }) => resolve_attribute_list(bytes, &candidates, name, opts, force_array),
        Some(SegmentKind::Text) => resolve_text_list(bytes, &candidates, force_array),
        Some(SegmentKind::Count) => QueryResult::Number(candidates.len() as f64),
        Some(SegmentKind::FieldExtraction { field }) => resolve_field_extraction(bytes, &candidates, field, opts),
        Some(SegmentKind::Index { value }) => {
            let mut r = resolve_index(bytes, candidates, *value, segments, next_idx, opts, depth_budget)?;
            if let Some(next_seg) = next {
                apply_modifiers(&mut r, &next_seg.modifiers);
            }
            return Ok(r);
        }
        Some(SegmentKind::Filter { condition, all }) => {
            let kept = apply_filter(bytes, &candidates, condition, opts, depth_budget)?;
            return finish(bytes, kept, segments, next_idx, *all, opts, depth_budget);
        }
        _ => {
            return if force_array {
                resolve_each(bytes, candidates, segments, next_idx, opts, depth_budget)
            } else {
                match candidates.into_iter().next() {
                    Some(first) => descend_or_resolve(bytes, first, segments, next_idx, opts, depth_budget),
                    None => Ok(QueryResult::Null),
                }
            };
        }
    };
    if let Some(next_seg) = next {
        apply_modifiers(&mut result, &next_seg.modifiers);
    }
    Ok(result)
}

fn descend_or_resolve<'a>(
    bytes: &'a [u8],
    elem: ElementSpan,
    segments: &[Segment],
    idx: usize,
    opts: &Options,
    depth_budget: usize,
) -> Result<QueryResult<'a>> {
    if idx >= segments.len() {
        return Ok(element_result(bytes, &elem));
    }
    eval_segment(bytes, elem.content.clone(), segments, idx, opts, depth_budget)
}

fn resolve_each<'a>(
    bytes: &'a [u8],
    candidates: Vec<ElementSpan>,
    segments: &[Segment],
    idx: usize,
    opts: &Options,
    depth_budget: usize,
) -> Result<QueryResult<'a>> {
    let mut out = Vec::with_capacity(candidates.len());
    for cand in candidates {
        out.push(descend_or_resolve(bytes, cand, segments, idx, opts, depth_budget)?);
    }
    Ok(QueryResult::Array(out))
}

fn resolve_index<'a>(
    bytes: &'a [u8],
    candidates: Vec<ElementSpan>,
    value: i64,
    segments: &[Segment],
    idx: usize,
    opts: &Options,
    depth_budget: usize,
) -> Result<QueryResult<'a>> {
    let selected = if value == -1 {
        candidates.into_iter().last()
    } else {
        candidates.into_iter().nth(value as usize)
    };
    match selected {
        Some(elem) => descend_or_resolve(bytes, elem, segments, idx + 1, opts, depth_budget),
        None => Ok(QueryResult::Null),
    }
}

/// `**` pairs with the segment immediately after it as the real matcher,
/// searching every descendant (not just direct children) via an explicit
/// work-queue bounded by a visited-offset guard and `MAX_WILDCARD_RESULTS`,
/// rather than true recursion, to keep stack use independent of document depth.
fn eval_recursive_wildcard<'a>(
    bytes: &'a [u8],
    parent_content: Range<usize>,
    segments: &[Segment],
    idx: usize,
    opts: &Options,
    depth_budget: usize,
) -> Result<QueryResult<'a>> {
    let matcher_idx = idx + 1;
    let mut visited = HashSet::new();
    let mut queue: VecDeque<Range<usize>> = VecDeque::new();
    queue.push_back(parent_content);
    let mut matches = Vec::new();

    'search: while let Some(content) = queue.pop_front() {
        for child in ChildIter::new(bytes, content, depth_budget) {
            let child = child?;
            if !visited.insert(child.tag_start) {
                continue;
            }
            let is_match = match segments.get(matcher_idx).map(|s| &s.kind) {
                Some(SegmentKind::Element { name, prefix }) => matcher::element_matches(
                    &String::from_utf8_lossy(child.name_bytes(bytes)),
                    name,
                    prefix.as_deref(),
                    opts,
                ),
                Some(SegmentKind::Wildcard) | None => true,
                _ => false,
            };
            if is_match {
                matches.push(child.clone());
                if matches.len() >= MAX_WILDCARD_RESULTS {
                    break 'search;
                }
            }
            queue.push_back(child.content.clone());
        }
    }

    let force_array = matches.len() > 1;
    let mut result = finish(bytes, matches, segments, matcher_idx, force_array, opts, depth_budget)?;
    if let Some(matcher_seg) = segments.get(matcher_idx) {
        apply_modifiers(&mut result, &matcher_seg.modifiers);
    }
    Ok(result)
}

fn collect_named(
    bytes: &[u8],
    content: Range<usize>,
    name: &str,
    prefix: Option<&str>,
    opts: &Options,
    depth_budget: usize,
) -> Result<Vec<ElementSpan>> {
    let mut out = Vec::new();
    for child in ChildIter::new(bytes, content, depth_budget) {
        let child = child?;
        let doc_name = String::from_utf8_lossy(child.name_bytes(bytes));
        if matcher::element_matches(&doc_name, name, prefix, opts) {
            out.push(child);
            if out.len() >= MAX_WILDCARD_RESULTS {
                break;
            }
        }
    }
    Ok(out)
}

fn collect_any_direct(bytes: &[u8], content: Range<usize>, depth_budget: usize) -> Result<Vec<ElementSpan>> {
    let mut out = Vec::new();
    for child in ChildIter::new(bytes, content, depth_budget) {
        out.push(child?);
        if out.len() >= MAX_WILDCARD_RESULTS {
            break;
        }
    }
    Ok(out)
}

fn element_result<'a>(bytes: &'a [u8], span: &ElementSpan) -> QueryResult<'a> {
    QueryResult::Element(String::from_utf8_lossy(span.content_bytes(bytes)))
}

fn resolve_attribute<'a>(bytes: &'a [u8], elem: &ElementSpan, name: &str, opts: &Options) -> Option<QueryResult<'a>> {
    for attr in scanner::AttrIter::new(bytes, elem.attrs.clone()) {
        let attr = attr.ok()?;
        let attr_name = String::from_utf8_lossy(&bytes[attr.name.clone()]);
        if matcher::attribute_matches(&attr_name, name, opts) {
            return Some(QueryResult::Attribute(Cow::Owned(escape::unescape(&bytes[attr.value.clone()]))));
        }
    }
    None
}

fn resolve_attribute_list<'a>(
    bytes: &'a [u8],
    candidates: &[ElementSpan],
    name: &str,
    opts: &Options,
    aggregate: bool,
) -> QueryResult<'a> {
    if aggregate {
        QueryResult::Array(candidates.iter().filter_map(|c| resolve_attribute(bytes, c, name, opts)).collect())
    } else {
        candidates.first().and_then(|c| resolve_attribute(bytes, c, name, opts)).unwrap_or(QueryResult::Null)
    }
}

fn resolve_text<'a>(bytes: &'a [u8], elem: &ElementSpan) -> QueryResult<'a> {
    QueryResult::String(Cow::Owned(scanner::direct_text(bytes, elem.content.clone())))
}

fn resolve_text_list<'a>(bytes: &'a [u8], candidates: &[ElementSpan], aggregate: bool) -> QueryResult<'a> {
    if aggregate {
        QueryResult::Array(candidates.iter().map(|c| resolve_text(bytes, c)).collect())
    } else {
        candidates.first().map(|c| resolve_text(bytes, c)).unwrap_or(QueryResult::Null)
    }
}

fn resolve_child_element_value<'a>(
    bytes: &'a [u8],
    parent: &ElementSpan,
    name: &str,
    opts: &Options,
) -> QueryResult<'a> {
    for child in ChildIter::new(bytes, parent.content.clone(), crate::limits::MAX_NESTING_DEPTH) {
        let Ok(child) = child else { break };
        let doc_name = String::from_utf8_lossy(child.name_bytes(bytes));
        if matcher::element_matches(&doc_name, name, None, opts) {
            return element_result(bytes, &child);
        }
    }
    QueryResult::Null
}

/// `#.field`: map every sibling in `candidates` to its `field`, always an
/// Array (empty if `candidates` is empty).
fn resolve_field_extraction<'a>(
    bytes: &'a [u8],
    candidates: &[ElementSpan],
    field: &Field,
    opts: &Options,
) -> QueryResult<'a> {
    let items = candidates
        .iter()
        .map(|c| match field {
            Field::Element(name) => resolve_child_element_value(bytes, c, name, opts),
            Field::Attribute(name) => resolve_attribute(bytes, c, name, opts).unwrap_or(QueryResult::Null),
            Field::Text => resolve_text(bytes, c),
        })
        .collect();
    QueryResult::Array(items)
}

fn apply_filter(
    bytes: &[u8],
    candidates: &[ElementSpan],
    condition: &FilterCondition,
    opts: &Options,
    depth_budget: usize,
) -> Result<Vec<ElementSpan>> {
    let mut kept = Vec::with_capacity(candidates.len());
    for cand in candidates {
        if filter_matches(bytes, cand, condition, opts, depth_budget)? {
            kept.push(cand.clone());
        }
    }
    Ok(kept)
}

fn filter_matches(
    bytes: &[u8],
    candidate: &ElementSpan,
    condition: &FilterCondition,
    opts: &Options,
    depth_budget: usize,
) -> Result<bool> {
    let result = resolve_filter_subpath(bytes, candidate, &condition.sub_path, opts, depth_budget)?;
    if condition.op == FilterOp::Exists {
        return Ok(result.exists());
    }
    if !result.exists() {
        return Ok(false);
    }
    Ok(compare_values(&result.to_string_form(), &condition.literal, condition.op))
}

/// A filter's sub-path is resolved relative to the candidate itself: if it
/// starts with `@name` or `%` those apply directly to the candidate rather
/// than to its children.
fn resolve_filter_subpath<'a>(
    bytes: &'a [u8],
    candidate: &ElementSpan,
    sub_path: &[Segment],
    opts: &Options,
    depth_budget: usize,
) -> Result<QueryResult<'a>> {
    let Some(first) = sub_path.first() else {
        return Ok(QueryResult::Null);
    };
    match &first.kind {
        SegmentKind::Attribute { name } => {
            let mut r = resolve_attribute(bytes, candidate, name, opts).unwrap_or(QueryResult::Null);
            apply_modifiers(&mut r, &first.modifiers);
            Ok(r)
        }
        SegmentKind::Text => {
            let mut r = resolve_text(bytes, candidate);
            apply_modifiers(&mut r, &first.modifiers);
            Ok(r)
        }
        _ => eval_segment(bytes, candidate.content.clone(), sub_path, 0, opts, depth_budget),
    }
}

fn compare_values(lhs: &str, rhs: &str, op: FilterOp) -> bool {
    use std::cmp::Ordering;
    let ordering = match (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(lhs.cmp(rhs)),
    };
    let Some(ordering) = ordering else { return false };
    match op {
        FilterOp::Eq => ordering == Ordering::Equal,
        FilterOp::Ne => ordering != Ordering::Equal,
        FilterOp::Lt => ordering == Ordering::Less,
        FilterOp::Le => ordering != Ordering::Greater,
        FilterOp::Gt => ordering == Ordering::Greater,
        FilterOp::Ge => ordering != Ordering::Less,
        FilterOp::Exists => unreachable!("Exists is handled before comparison"),
    }
}

fn apply_modifiers(result: &mut QueryResult<'_>, modifiers: &[Modifier]) {
    for m in modifiers {
        match m {
            Modifier::First => {
                if let QueryResult::Array(items) = result {
                    *result = items.drain(..).next().unwrap_or(QueryResult::Null);
                }
            }
            Modifier::Last => {
                if let QueryResult::Array(items) = result {
                    *result = items.pop().unwrap_or(QueryResult::Null);
                }
            }
            Modifier::Reverse => {
                if let QueryResult::Array(items) = result {
                    items.reverse();
                }
            }
            Modifier::Sort => {
                if let QueryResult::Array(items) = result {
                    items.sort_by(|a, b| a.to_string_form().cmp(&b.to_string_form()));
                }
            }
            Modifier::Count => {
                if let QueryResult::Array(items) = result {
                    *result = QueryResult::Number(items.len() as f64);
                }
            }
            Modifier::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    fn q<'a>(doc: &'a [u8], path_str: &str) -> QueryResult<'a> {
        let segments = path::compile(path_str);
        query(doc, &segments, &Options::default())
    }

    #[test]
    fn nested_get() {
        let doc = b"<root><user><name>John</name></user></root>";
        assert_eq!(q(doc, "root.user.name"), QueryResult::Element(Cow::Borrowed("John")));
    }

    #[test]
    fn array_count() {
        let doc = b"<root><item>a</item><item>b</item><item>c</item></root>";
        assert_eq!(q(doc, "root.item.#"), QueryResult::Number(3.0));
    }

    #[test]
    fn field_extraction_text() {
        let doc = b"<root><item>a</item><item>b</item><item>c</item></root>";
        let result = q(doc, "root.item.#.%");
        assert_eq!(result.to_string_form(), r#"["a","b","c"]"#);
    }

    #[test]
    fn filter_first_vs_all() {
        let doc = b"<items><item><age>25</age></item><item><age>30</age></item><item><age>40</age></item></items>";
        assert_eq!(q(doc, "items.item.#(age>=30).age").as_str(), Some("30"));
        let all = q(doc, "items.item.#(age>=30)#.age");
        assert_eq!(all.to_string_form(), r#"["30","40"]"#);
    }

    #[test]
    fn case_insensitive_get() {
        let doc = b"<ROOT><USER><NAME>John</NAME></USER></ROOT>";
        let mut opts = Options::default();
        opts.case_sensitive = false;
        let segments = path::compile("root.user.name");
        assert_eq!(query(doc, &segments, &opts).as_str(), Some("John"));
        assert_eq!(query(doc, &segments, &Options::default()), QueryResult::Null);
    }

    #[test]
    fn append_then_count() {
        let doc = b"<root><item>a</item><item>b</item></root>";
        assert_eq!(q(doc, "root.item.-1").as_str(), Some("b"));
    }

    #[test]
    fn attribute_access() {
        let doc = br#"<root><user id="7"/></root>"#;
        assert_eq!(q(doc, "root.user.@id").as_str(), Some("7"));
    }

    #[test]
    fn recursive_wildcard_finds_descendant() {
        let doc = b"<library><section><book><price>10</price></book></section></library>";
        assert_eq!(q(doc, "library.**.price").as_str(), Some("10"));
    }

    #[test]
    fn recursive_wildcard_aggregates_multiple_matches() {
        let doc = b"<library><book><price>10</price></book><book><price>20</price></book></library>";
        let result = q(doc, "library.**.price");
        assert_eq!(result.to_string_form(), r#"["10","20"]"#);
    }

    #[test]
    fn wildcard_single_match_is_scalar_not_array() {
        let doc = b"<root><only><name>Ann</name></only></root>";
        assert_eq!(q(doc, "root.*.name").as_str(), Some("Ann"));
    }

    #[test]
    fn wildcard_multiple_matches_aggregate_into_array() {
        let doc = b"<root><a><name>x</name></a><b><name>y</name></b></root>";
        let result = q(doc, "root.*.name");
        assert_eq!(result.to_string_form(), r#"["x","y"]"#);
    }

    #[test]
    fn invalid_path_is_null_not_error() {
        let doc = b"<root/>";
        assert_eq!(q(doc, "root.-2.bad"), QueryResult::Null);
    }

    #[test]
    fn malformed_document_is_null() {
        let doc = b"<root><user>";
        assert_eq!(q(doc, "root.user.name"), QueryResult::Null);
    }

    #[test]
    fn sort_modifier_on_field_extraction() {
        let doc = b"<root><item>c</item><item>a</item><item>b</item></root>";
        let result = q(doc, "root.item.#.%|@sort");
        assert_eq!(result.to_string_form(), r#"["a","b","c"]"#);
    }
}

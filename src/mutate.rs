//! The in-place mutator.
//!
//! Unlike evaluation, a mutation always targets exactly one location:
//! `locate` walks the compiled path deterministically (first matching
//! sibling, or the sibling an `Index`/`Attribute` segment names) down to a
//! single `Target`, then the edit is applied as one byte splice.
//!
//! Supported path shapes are `Element`, `Attribute`, and a terminal `Index`
//! (including `-1` append). `Wildcard`/`RecursiveWildcard`/`Filter`/`Count`/
//! `FieldExtraction` have no defined single-target mutation semantics and
//! are rejected with `ErrInvalidPath`.

use crate::error::{Error, Result};
use crate::escape;
use crate::limits::{MAX_DOCUMENT_SIZE, MAX_NESTING_DEPTH};
use crate::matcher;
use crate::options::Options;
use crate::path::{Segment, SegmentKind};
use crate::scanner::{self, AttrIter, ChildIter, ElementSpan};
use std::ops::Range;

/// The tagged sum a `set` call marshals into bytes. `nil`-means-delete is
/// lifted out of this type entirely — callers wanting to delete a target
/// call `delete`, not `set` with a null value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Str(&'a str),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl<'a> Value<'a> {
    fn marshal_escaped(&self) -> String {
        match self {
            Value::Str(s) => escape::escape(s),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => crate::value::format_number(*f),
            Value::Bool(b) => b.to_string(),
        }
    }
}

enum Target {
    Element(ElementSpan),
    Attribute { owner: ElementSpan, attr_name: String, existing: Option<Range<usize>> },
    Append { after_offset: usize, name: String },
    CreateChain { at_offset: usize, names: Vec<String> },
}

pub(crate) fn set(bytes: &[u8], segments: &[Segment], value: Value<'_>, opts: &Options) -> Result<Vec<u8>> {
    precheck(bytes)?;
    let target = locate_target(bytes, segments, opts)?;
    Ok(splice_for_set(bytes, target, &value.marshal_escaped(), opts))
}

pub(crate) fn set_raw(bytes: &[u8], segments: &[Segment], raw: &str, opts: &Options) -> Result<Vec<u8>> {
    precheck(bytes)?;
    validate_fragment(raw)?;
    let target = locate_target(bytes, segments, opts)?;
    Ok(splice_for_set(bytes, target, raw, opts))
}

pub(crate) fn delete(bytes: &[u8], segments: &[Segment], opts: &Options) -> Result<Vec<u8>> {
    precheck(bytes)?;
    let target = locate_target(bytes, segments, opts)?;
    splice_for_delete(bytes, target)
}

fn precheck(bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_DOCUMENT_SIZE {
        return Err(Error::malformed(scanner::position_at(bytes, 0), "document exceeds maximum size"));
    }
    scanner::validate_strict(bytes)
}

fn locate_target(bytes: &[u8], segments: &[Segment], opts: &Options) -> Result<Target> {
    if segments.is_empty() {
        return Err(Error::invalid_path("empty compiled path"));
    }
    locate(bytes, 0..bytes.len(), segments, 0, opts)
}

fn locate(bytes: &[u8], parent_content: Range<usize>, segments: &[Segment], idx: usize, opts: &Options) -> Result<Target> {
    let SegmentKind::Element { name, prefix } = &segments[idx].kind else {
        return Err(Error::invalid_path("mutation path must resolve through element segments"));
    };

    match segments.get(idx + 1).map(|s| &s.kind) {
        Some(SegmentKind::Attribute { name: attr_name }) => {
            let owner = find_named_child(bytes, parent_content, name, prefix.as_deref(), opts)?
                .ok_or_else(|| Error::invalid_path("mutation target element does not exist"))?;
            let existing = find_attr(bytes, &owner, attr_name, opts)?;
            Ok(Target::Attribute { owner, attr_name: attr_name.clone(), existing })
        }
        Some(SegmentKind::Index { value }) => {
            let siblings = collect_named(bytes, parent_content.clone(), name, prefix.as_deref(), opts)?;
            if *value == -1 {
                let after_offset = siblings.last().map(|e| e.close_end).unwrap_or(parent_content.end);
                return Ok(Target::Append { after_offset, name: name.clone() });
            }
            let selected = siblings
                .into_iter()
                .nth(*value as usize)
                .ok_or_else(|| Error::invalid_path("index out of range"))?;
            if idx + 2 >= segments.len() {
                Ok(Target::Element(selected))
            } else {
                locate(bytes, selected.content.clone(), segments, idx + 2, opts)
            }
        }
        Some(SegmentKind::Element { .. }) | None => {
            match find_named_child(bytes, parent_content.clone(), name, prefix.as_deref(), opts)? {
                Some(elem) => {
                    if idx + 1 >= segments.len() {
                        Ok(Target::Element(elem))
                    } else {
                        locate(bytes, elem.content.clone(), segments, idx + 1, opts)
                    }
                }
                None => build_missing_chain(parent_content, segments, idx),
            }
        }
        _ => Err(Error::invalid_path("unsupported mutation path shape")),
    }
}

/// `segments[idx]`'s element wasn't found as a child of `container`: if
/// every remaining segment is a plain `Element`, the whole suffix becomes
/// an ancestor chain to create.
fn build_missing_chain(container: Range<usize>, segments: &[Segment], idx: usize) -> Result<Target> {
    let mut names = Vec::with_capacity(segments.len() - idx);
    for seg in &segments[idx..] {
        match &seg.kind {
            SegmentKind::Element { name, .. } => names.push(name.clone()),
            _ => return Err(Error::invalid_path("cannot create a missing non-element path segment")),
        }
    }
    Ok(Target::CreateChain { at_offset: container.end, names })
}

fn find_named_child(
    bytes: &[u8],
    content: Range<usize>,
    name: &str,
    prefix: Option<&str>,
    opts: &Options,
) -> Result<Option<ElementSpan>> {
    for child in ChildIter::new(bytes, content, MAX_NESTING_DEPTH) {
        let child = child?;
        let doc_name = String::from_utf8_lossy(child.name_bytes(bytes));
        if matcher::element_matches(&doc_name, name, prefix, opts) {
            return Ok(Some(child));
        }
    }
    Ok(None)
}

fn collect_named(
    bytes: &[u8],
    content: Range<usize>,
    name: &str,
    prefix: Option<&str>,
    opts: &Options,
) -> Result<Vec<ElementSpan>> {
    let mut out = Vec::new();
    for child in ChildIter::new(bytes, content, MAX_NESTING_DEPTH) {
        let child = child?;
        let doc_name = String::from_utf8_lossy(child.name_bytes(bytes));
        if matcher::element_matches(&doc_name, name, prefix, opts) {
            out.push(child);
        }
    }
    Ok(out)
}

fn find_attr(bytes: &[u8], owner: &ElementSpan, name: &str, opts: &Options) -> Result<Option<Range<usize>>> {
    for attr in AttrIter::new(bytes, owner.attrs.clone()) {
        let attr = attr?;
        let attr_name = String::from_utf8_lossy(&bytes[attr.name.clone()]);
        if matcher::attribute_matches(&attr_name, name, opts) {
            return Ok(Some(attr.value));
        }
    }
    Ok(None)
}

fn splice(bytes: &[u8], range: Range<usize>, replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() - (range.end - range.start) + replacement.len());
    out.extend_from_slice(&bytes[..range.start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&bytes[range.end..]);
    out
}

fn splice_for_set(bytes: &[u8], target: Target, value: &str, opts: &Options) -> Vec<u8> {
    match target {
        Target::Element(elem) => splice(bytes, elem.content, value.as_bytes()),
        Target::Attribute { owner, attr_name, existing } => match existing {
            Some(value_range) => splice(bytes, value_range, value.as_bytes()),
            None => insert_attribute_sorted(bytes, &owner, &attr_name, value),
        },
        Target::Append { after_offset, name } => {
            let fragment = format!("<{name}>{value}</{name}>");
            splice(bytes, after_offset..after_offset, fragment.as_bytes())
        }
        Target::CreateChain { at_offset, names } => {
            let fragment = build_chain_fragment(&names, value, opts);
            splice(bytes, at_offset..at_offset, fragment.as_bytes())
        }
    }
}

fn splice_for_delete(bytes: &[u8], target: Target) -> Result<Vec<u8>> {
    match target {
        Target::Element(elem) => {
            let mut end = elem.close_end;
            while end < bytes.len() && bytes[end] != b'\n' && bytes[end].is_ascii_whitespace() {
                end += 1;
            }
            if end < bytes.len() && bytes[end] == b'\n' {
                end += 1;
            }
            Ok(splice(bytes, elem.tag_start..end, b""))
        }
        Target::Attribute { owner, attr_name, existing } => match existing {
            Some(_) => Ok(remove_attribute(bytes, &owner, &attr_name)),
            None => Err(Error::invalid_path("attribute does not exist")),
        },
        Target::Append { .. } | Target::CreateChain { .. } => {
            Err(Error::invalid_path("delete target does not exist"))
        }
    }
}

fn read_attrs(bytes: &[u8], owner: &ElementSpan) -> Vec<(String, String, u8)> {
    AttrIter::new(bytes, owner.attrs.clone())
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(&bytes[attr.name.clone()]).into_owned(),
                String::from_utf8_lossy(&bytes[attr.value.clone()]).into_owned(),
                attr.quote,
            )
        })
        .collect()
}

fn render_attrs(attrs: &[(String, String, u8)]) -> String {
    let mut rendered = String::new();
    for (name, value, quote) in attrs {
        rendered.push(' ');
        rendered.push_str(name);
        rendered.push('=');
        rendered.push(*quote as char);
        rendered.push_str(value);
        rendered.push(*quote as char);
    }
    rendered
}

/// New/changed attributes are kept sorted alphabetically by name.
fn insert_attribute_sorted(bytes: &[u8], owner: &ElementSpan, name: &str, value: &str) -> Vec<u8> {
    let mut attrs = read_attrs(bytes, owner);
    attrs.push((name.to_string(), value.to_string(), b'"'));
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    splice(bytes, owner.attrs.clone(), render_attrs(&attrs).as_bytes())
}

fn remove_attribute(bytes: &[u8], owner: &ElementSpan, name: &str) -> Vec<u8> {
    let mut attrs = read_attrs(bytes, owner);
    attrs.retain(|(n, _, _)| n != name);
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    splice(bytes, owner.attrs.clone(), render_attrs(&attrs).as_bytes())
}

fn build_chain_fragment(names: &[String], value: &str, opts: &Options) -> String {
    let mut frag = String::new();
    if opts.indent.is_empty() {
        for name in names {
            frag.push('<');
            frag.push_str(name);
            frag.push('>');
        }
        frag.push_str(value);
        for name in names.iter().rev() {
            frag.push_str("</");
            frag.push_str(name);
            frag.push('>');
        }
        return frag;
    }
    for (depth, name) in names.iter().enumerate() {
        frag.push('\n');
        frag.push_str(&opts.indent.repeat(depth + 1));
        frag.push('<');
        frag.push_str(name);
        frag.push('>');
    }
    frag.push_str(value);
    for (depth, name) in names.iter().enumerate().rev() {
        frag.push_str("</");
        frag.push_str(name);
        frag.push('>');
        frag.push('\n');
        if depth > 0 {
            frag.push_str(&opts.indent.repeat(depth));
        }
    }
    frag
}

/// `set_raw`'s mini-scan: plain text needs no validation; anything
/// carrying a tag must be a balanced, self-closing-OK fragment.
fn validate_fragment(raw: &str) -> Result<()> {
    let bytes = raw.as_bytes();
    if !bytes.contains(&b'<') {
        return Ok(());
    }
    scanner::validate_strict(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    fn compiled(path_str: &str) -> crate::path::CompiledPath {
        path::compile(path_str)
    }

    #[test]
    fn replaces_element_content() {
        let doc = b"<root><user><name>John</name></user></root>";
        let segments = compiled("root.user.name");
        let out = set(doc, &segments, Value::Str("Jane"), &Options::default()).unwrap();
        assert_eq!(out, b"<root><user><name>Jane</name></user></root>");
    }

    #[test]
    fn creates_missing_chain_then_reads_back() {
        let doc = b"<root></root>";
        let segments = compiled("root.user.address.city");
        let out = set(doc, &segments, Value::Str("NYC"), &Options::default()).unwrap();
        assert_eq!(out, b"<root><user><address><city>NYC</city></address></user></root>");
        let value = crate::eval::query(&out, &segments, &Options::default());
        assert_eq!(value.as_str(), Some("NYC"));
    }

    #[test]
    fn appends_via_index_minus_one() {
        let doc = b"<root><item>a</item><item>b</item></root>";
        let segments = compiled("root.item.-1");
        let out = set(doc, &segments, Value::Str("c"), &Options::default()).unwrap();
        assert_eq!(out, b"<root><item>a</item><item>b</item><item>c</item></root>");
        let count = crate::eval::query(&out, &compiled("root.item.#"), &Options::default());
        assert_eq!(count.as_f64(), Some(3.0));
    }

    #[test]
    fn malformed_input_errors_without_modifying() {
        let doc = b"<root><user>";
        let segments = compiled("root.user.name");
        let err = set(doc, &segments, Value::Str("Jane"), &Options::default());
        assert!(matches!(err, Err(Error::MalformedXml { .. })));
    }

    #[test]
    fn creates_attribute_sorted() {
        let doc = br#"<user b="2"/>"#;
        let segments = compiled("user.@a");
        let out = set(doc, &segments, Value::Str("1"), &Options::default()).unwrap();
        assert_eq!(out, br#"<user a="1" b="2"/>"#);
    }

    #[test]
    fn delete_removes_element_and_trailing_newline() {
        let doc = b"<root>\n<a>1</a>\n<b>2</b>\n</root>";
        let segments = compiled("root.a");
        let out = delete(doc, &segments, &Options::default()).unwrap();
        assert_eq!(out, b"<root>\n<b>2</b>\n</root>");
    }
}

//! The streaming XML cursor.
//!
//! A byte-oriented, non-validating scanner over a borrowed `&[u8]`. It
//! never copies document content; every landmark it reports is a byte
//! offset or a `Range<usize>` into the caller's buffer. `scan_element`
//! returns open/attrs/content/close ranges for a whole element at once,
//! rather than one token at a time, so the evaluator and mutator can work
//! directly off spans.

use crate::error::{Error, Position};
use crate::limits::{MAX_ATTRIBUTES, MAX_NESTING_DEPTH, MAX_TOKEN_SIZE};
use std::ops::Range;

#[cfg(feature = "use-memchr")]
use memchr::memchr;
#[cfg(not(feature = "use-memchr"))]
fn memchr(needle: u8, haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

/// Compute the 1-based `(line, column)` of a byte offset. Used to build
/// every `Error::MalformedXml`.
pub(crate) fn position_at(bytes: &[u8], offset: usize) -> Position {
    let offset = offset.min(bytes.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for &b in &bytes[..offset] {
        if b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    Position { line, column: col }
}

fn eof(bytes: &[u8], at: usize) -> Error {
    Error::malformed(position_at(bytes, at), "unexpected end of document")
}

fn malformed(bytes: &[u8], at: usize, reason: impl Into<String>) -> Error {
    Error::malformed(position_at(bytes, at), reason)
}

/// A fully-scanned element: every byte range an evaluator or mutator needs,
/// without having materialised anything beyond these offsets.
#[derive(Debug, Clone)]
pub(crate) struct ElementSpan {
    /// Offset of the opening `<`.
    pub tag_start: usize,
    /// Raw name bytes, e.g. `ns:item` (prefix not yet split).
    pub name: Range<usize>,
    /// Raw attribute text between the name and the tag's `>`/`/>`.
    pub attrs: Range<usize>,
    /// Offset just past the open (or self-closing) tag's `>`.
    pub tag_end: usize,
    /// Inner content span; zero-width at `tag_end` when self-closing.
    pub content: Range<usize>,
    /// Offset of the matching closer's `<` (`== tag_end` when self-closing).
    pub close_start: usize,
    /// Offset just past the matching closer's `>` (`== tag_end` when
    /// self-closing).
    pub close_end: usize,
    pub self_closing: bool,
}

impl ElementSpan {
    pub fn name_bytes<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.name.clone()]
    }
    pub fn attrs_bytes<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.attrs.clone()]
    }
    pub fn content_bytes<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.content.clone()]
    }
    /// The full `<tag>...</tag>` span, including both tags.
    pub fn full_span(&self) -> Range<usize> {
        self.tag_start..self.close_end
    }
}

struct TagHead {
    is_closing: bool,
    name: Range<usize>,
    attrs: Range<usize>,
    self_closing: bool,
    tag_end: usize,
}

fn is_name_byte(b: u8) -> bool {
    !matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>')
}

/// Parse a single tag head (`<Name attrs>`, `</Name>`, or `<Name attrs/>`)
/// starting at `lt` (`bytes[lt] == b'<'`). Does not attempt to find a
/// matching closer.
fn parse_tag_head(bytes: &[u8], lt: usize) -> Result<TagHead, Error> {
    let mut i = lt + 1;
    let is_closing = bytes.get(i) == Some(&b'/');
    if is_closing {
        i += 1;
    }
    let name_start = i;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    if i >= bytes.len() {
        return Err(eof(bytes, i));
    }
    if i == name_start {
        return Err(malformed(bytes, lt, "empty or invalid element name"));
    }
    let name = name_start..i;

    let attrs_start = i;
    let mut quote: Option<u8> = None;
    let mut self_closing = false;
    loop {
        if i >= bytes.len() {
            return Err(eof(bytes, i));
        }
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None => match b {
                b'\'' | b'"' => {
                    quote = Some(b);
                    i += 1;
                }
                b'>' => break,
                b'/' if bytes.get(i + 1) == Some(&b'>') => {
                    self_closing = true;
                    break;
                }
                _ => i += 1,
            },
        }
        if i - attrs_start > MAX_TOKEN_SIZE {
            return Err(malformed(bytes, lt, "tag exceeds maximum token size"));
        }
    }
    let attrs_end = i;
    let tag_end = if self_closing { i + 2 } else { i + 1 };
    if is_closing && self_closing {
        return Err(malformed(bytes, lt, "end tag cannot self-close"));
    }
    Ok(TagHead { is_closing, name, attrs: attrs_start..attrs_end, self_closing, tag_end })
}

/// Skip a comment (`<!-- ... -->`). `--` inside the body is illegal.
fn skip_comment(bytes: &[u8], lt: usize) -> Result<usize, Error> {
    let body_start = lt + 4; // past "<!--"
    if body_start > bytes.len() {
        return Err(eof(bytes, lt));
    }
    let mut i = body_start;
    loop {
        match memchr(b'-', &bytes[i..]) {
            None => return Err(eof(bytes, i)),
            Some(rel) => {
                let dash = i + rel;
                if bytes.get(dash + 1) != Some(&b'-') {
                    i = dash + 1;
                    continue;
                }
                // Found "--": must be immediately followed by '>'.
                if bytes.get(dash + 2) == Some(&b'>') {
                    return Ok(dash + 3);
                }
                return Err(malformed(bytes, dash, "'--' is not allowed inside a comment body"));
            }
        }
        if i - body_start > MAX_TOKEN_SIZE {
            return Err(malformed(bytes, lt, "comment exceeds maximum token size"));
        }
    }
}

/// Skip a CDATA section (`<![CDATA[ ... ]]>`), tracked but not interpreted.
fn skip_cdata(bytes: &[u8], lt: usize) -> Result<usize, Error> {
    const OPEN: &[u8] = b"<![CDATA[";
    if !bytes[lt..].starts_with(OPEN) {
        return Err(malformed(bytes, lt, "malformed CDATA section"));
    }
    let body_start = lt + OPEN.len();
    find_subsequence(bytes, body_start, b"]]>")
        .map(|end| end + 3)
        .ok_or_else(|| eof(bytes, body_start))
}

/// Skip a processing instruction (`<? ... ?>`), including the XML
/// declaration; its contents are not interpreted.
fn skip_pi(bytes: &[u8], lt: usize) -> Result<usize, Error> {
    find_subsequence(bytes, lt + 2, b"?>").map(|end| end + 2).ok_or_else(|| eof(bytes, lt + 2))
}

/// Skip a `<!DOCTYPE ...>` declaration, tracking (but not parsing) a `[ ]`
/// internal subset so an internal `>` inside it doesn't end the doctype
/// early.
fn skip_doctype(bytes: &[u8], lt: usize) -> Result<usize, Error> {
    let mut i = lt + 2; // past "<!"
    let mut depth: i32 = 0;
    let mut quote: Option<u8> = None;
    loop {
        if i >= bytes.len() {
            return Err(eof(bytes, i));
        }
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' => depth += 1,
                b']' => depth -= 1,
                b'>' if depth <= 0 => return Ok(i + 1),
                _ => {}
            },
        }
        i += 1;
        if i - lt > MAX_TOKEN_SIZE {
            return Err(malformed(bytes, lt, "doctype exceeds maximum token size"));
        }
    }
}

fn find_subsequence(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    let first = *needle.first()?;
    let mut i = from;
    loop {
        let rel = memchr(first, bytes.get(i..)?)?;
        let at = i + rel;
        if bytes[at..].starts_with(needle) {
            return Some(at);
        }
        i = at + 1;
    }
}

/// Find the next element tag's `<` within `[pos, bound)`, transparently
/// skipping comments, CDATA sections, processing instructions, and doctype
/// declarations. Returns `None` if nothing but trailing text remains before
/// `bound`.
pub(crate) fn find_next_tag(
    bytes: &[u8],
    mut pos: usize,
    bound: usize,
) -> Result<Option<usize>, Error> {
    loop {
        if pos >= bound {
            return Ok(None);
        }
        match memchr(b'<', &bytes[pos..bound]) {
            None => return Ok(None),
            Some(rel) => {
                let lt = pos + rel;
                if lt + 1 >= bytes.len() {
                    return Err(eof(bytes, lt));
                }
                match bytes[lt + 1] {
                    b'!' => {
                        pos = if bytes[lt..].starts_with(b"<!--") {
                            skip_comment(bytes, lt)?
                        } else if bytes[lt..].starts_with(b"<![CDATA[") {
                            skip_cdata(bytes, lt)?
                        } else {
                            skip_doctype(bytes, lt)?
                        };
                    }
                    b'?' => pos = skip_pi(bytes, lt)?,
                    _ => return Ok(Some(lt)),
                }
            }
        }
    }
}

/// Scan a complete element starting at `bytes[lt] == b'<'`, following
/// nested children (by depth, not by name) until the matching closer is
/// found. `depth_budget` bounds recursion cost (see `MAX_NESTING_DEPTH`).
pub(crate) fn scan_element(bytes: &[u8], lt: usize, depth_budget: usize) -> Result<ElementSpan, Error> {
    if depth_budget == 0 {
        return Err(malformed(bytes, lt, "maximum nesting depth exceeded"));
    }
    let head = parse_tag_head(bytes, lt)?;
    if head.is_closing {
        return Err(malformed(bytes, lt, "unexpected end tag"));
    }
    if head.self_closing {
        return Ok(ElementSpan {
            tag_start: lt,
            name: head.name,
            attrs: head.attrs,
            tag_end: head.tag_end,
            content: head.tag_end..head.tag_end,
            close_start: head.tag_end,
            close_end: head.tag_end,
            self_closing: true,
        });
    }

    let content_start = head.tag_end;
    let mut depth: usize = 0;
    let mut pos = content_start;
    loop {
        let lt2 = match find_next_tag(bytes, pos, bytes.len())? {
            Some(x) => x,
            None => return Err(eof(bytes, pos)),
        };
        let inner = parse_tag_head(bytes, lt2)?;
        if inner.is_closing {
            if depth == 0 {
                if &bytes[inner.name.clone()] != &bytes[head.name.clone()] {
                    return Err(malformed(bytes, lt2, "mismatched start and end tags"));
                }
                return Ok(ElementSpan {
                    tag_start: lt,
                    name: head.name,
                    attrs: head.attrs,
                    tag_end: head.tag_end,
                    content: content_start..lt2,
                    close_start: lt2,
                    close_end: inner.tag_end,
                    self_closing: false,
                });
            }
            depth -= 1;
            pos = inner.tag_end;
        } else if inner.self_closing {
            pos = inner.tag_end;
        } else {
            depth += 1;
            if depth >= depth_budget {
                return Err(malformed(bytes, lt2, "maximum nesting depth exceeded"));
            }
            pos = inner.tag_end;
        }
    }
}

/// Iterates the direct (depth-1) child elements of a content range.
pub(crate) struct ChildIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    bound: usize,
    depth_budget: usize,
}

impl<'a> ChildIter<'a> {
    pub fn new(bytes: &'a [u8], content: Range<usize>, depth_budget: usize) -> Self {
        ChildIter { bytes, pos: content.start, bound: content.end, depth_budget }
    }
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = Result<ElementSpan, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match find_next_tag(self.bytes, self.pos, self.bound) {
            Ok(Some(lt)) => match scan_element(self.bytes, lt, self.depth_budget) {
                Ok(span) => {
                    self.pos = span.close_end;
                    Some(Ok(span))
                }
                Err(e) => {
                    self.pos = self.bound;
                    Some(Err(e))
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.pos = self.bound;
                Some(Err(e))
            }
        }
    }
}

/// Concatenate direct (non-nested) text children of a content range,
/// entity-unescaped. Nested elements' own text is not included.
pub(crate) fn direct_text(bytes: &[u8], content: Range<usize>) -> String {
    let mut out = String::new();
    let mut pos = content.start;
    loop {
        match find_next_tag(bytes, pos, content.end) {
            Ok(Some(lt)) => {
                out.push_str(&crate::escape::unescape(&bytes[pos..lt]));
                match scan_element(bytes, lt, MAX_NESTING_DEPTH) {
                    Ok(span) => pos = span.close_end,
                    Err(_) => return out,
                }
            }
            Ok(None) => {
                out.push_str(&crate::escape::unescape(&bytes[pos..content.end]));
                return out;
            }
            Err(_) => return out,
        }
    }
}

/// A single parsed attribute; ranges are absolute offsets into the
/// document, not relative to the tag's attribute span.
#[derive(Debug, Clone)]
pub(crate) struct Attr {
    pub name: Range<usize>,
    pub value: Range<usize>,
    pub quote: u8,
}

/// Iterates the attributes of a tag's raw attribute span.
pub(crate) struct AttrIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    count: usize,
}

impl<'a> AttrIter<'a> {
    pub fn new(bytes: &'a [u8], attrs: Range<usize>) -> Self {
        AttrIter { bytes, pos: attrs.start, end: attrs.end, count: 0 }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<Attr, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.end && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= self.end {
            return None;
        }
        if self.count >= MAX_ATTRIBUTES {
            let at = self.pos;
            self.pos = self.end;
            return Some(Err(malformed(self.bytes, at, "element exceeds maximum attribute count")));
        }
        self.count += 1;
        let name_start = self.pos;
        while self.pos < self.end
            && self.bytes[self.pos] != b'='
            && !self.bytes[self.pos].is_ascii_whitespace()
        {
            self.pos += 1;
        }
        let name_end = self.pos;
        if name_start == name_end {
            self.pos = self.end;
            return Some(Err(malformed(self.bytes, name_start, "empty attribute name")));
        }
        while self.pos < self.end && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.bytes.get(self.pos) != Some(&b'=') {
            self.pos = self.end;
            return Some(Err(malformed(self.bytes, name_start, "expected '=' after attribute name")));
        }
        self.pos += 1;
        while self.pos < self.end && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let quote = match self.bytes.get(self.pos) {
            Some(&q @ (b'\'' | b'"')) => q,
            _ => {
                self.pos = self.end;
                return Some(Err(malformed(self.bytes, name_start, "expected quoted attribute value")));
            }
        };
        self.pos += 1;
        let value_start = self.pos;
        match memchr(quote, &self.bytes[self.pos..self.end]) {
            Some(rel) => {
                let value_end = value_start + rel;
                self.pos = value_end + 1;
                Some(Ok(Attr { name: name_start..name_end, value: value_start..value_end, quote }))
            }
            None => {
                self.pos = self.end;
                Some(Err(malformed(self.bytes, value_start, "unterminated attribute value")))
            }
        }
    }
}

enum Landmark {
    StartTag(usize),
    NonWhitespaceText(usize),
    Eof,
}

fn skip_to_landmark(bytes: &[u8], mut pos: usize) -> Result<Landmark, Error> {
    loop {
        match memchr(b'<', &bytes[pos..]) {
            None => {
                return Ok(match bytes[pos..].iter().position(|b| !b.is_ascii_whitespace()) {
                    Some(i) => Landmark::NonWhitespaceText(pos + i),
                    None => Landmark::Eof,
                });
            }
            Some(rel) => {
                let lt = pos + rel;
                if let Some(i) = bytes[pos..lt].iter().position(|b| !b.is_ascii_whitespace()) {
                    return Ok(Landmark::NonWhitespaceText(pos + i));
                }
                if lt + 1 >= bytes.len() {
                    return Err(eof(bytes, lt));
                }
                match bytes[lt + 1] {
                    b'!' => {
                        pos = if bytes[lt..].starts_with(b"<!--") {
                            skip_comment(bytes, lt)?
                        } else if bytes[lt..].starts_with(b"<![CDATA[") {
                            return Err(malformed(bytes, lt, "CDATA not allowed at document level"));
                        } else {
                            skip_doctype(bytes, lt)?
                        };
                    }
                    b'?' => pos = skip_pi(bytes, lt)?,
                    _ => return Ok(Landmark::StartTag(lt)),
                }
            }
        }
    }
}

/// Strict well-formedness check run by the mutator before splicing, so
/// edits on malformed input fail cleanly rather than corrupt the buffer.
/// Accepts multiple sibling roots at depth 0 (a forest), rejects
/// non-whitespace text between them.
pub(crate) fn validate_strict(bytes: &[u8]) -> Result<(), Error> {
    let mut pos = 0usize;
    let mut saw_root = false;
    loop {
        match skip_to_landmark(bytes, pos)? {
            Landmark::Eof => break,
            Landmark::NonWhitespaceText(at) => {
                return Err(malformed(bytes, at, "unexpected text at document level"))
            }
            Landmark::StartTag(lt) => {
                let root = scan_element(bytes, lt, MAX_NESTING_DEPTH)?;
                pos = root.close_end;
                saw_root = true;
            }
        }
    }
    if !saw_root {
        return Err(malformed(bytes, 0, "document has no root element"));
    }
    Ok(())
}

/// Find the first top-level element (skipping prolog/doctype/comments),
/// used as the implicit root of every query. Returns `None` for a document
/// with no element at all.
pub(crate) fn find_root(bytes: &[u8]) -> Result<Option<ElementSpan>, Error> {
    let mut pos = 0usize;
    loop {
        match skip_to_landmark(bytes, pos)? {
            Landmark::Eof => return Ok(None),
            Landmark::NonWhitespaceText(_) => return Ok(None),
            Landmark::StartTag(lt) => return Ok(Some(scan_element(bytes, lt, MAX_NESTING_DEPTH)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_simple_element() {
        let doc = b"<root><a>1</a></root>";
        let root = scan_element(doc, 0, MAX_NESTING_DEPTH).unwrap();
        assert_eq!(root.name_bytes(doc), b"root");
        assert!(!root.self_closing);
        let mut children = ChildIter::new(doc, root.content.clone(), MAX_NESTING_DEPTH);
        let a = children.next().unwrap().unwrap();
        assert_eq!(a.name_bytes(doc), b"a");
        assert_eq!(a.content_bytes(doc), b"1");
        assert!(children.next().is_none());
    }

    #[test]
    fn self_closing_has_empty_content() {
        let doc = b"<root><a/></root>";
        let root = scan_element(doc, 0, MAX_NESTING_DEPTH).unwrap();
        let a = ChildIter::new(doc, root.content.clone(), MAX_NESTING_DEPTH)
            .next()
            .unwrap()
            .unwrap();
        assert!(a.self_closing);
        assert_eq!(a.content_bytes(doc), b"");
    }

    #[test]
    fn rejects_mismatched_tags() {
        let doc = b"<root><a></b></root>";
        let root = scan_element(doc, 0, MAX_NESTING_DEPTH).unwrap();
        let err = ChildIter::new(doc, root.content.clone(), MAX_NESTING_DEPTH)
            .next()
            .unwrap();
        assert!(err.is_err());
    }

    #[test]
    fn skips_comments_and_pis() {
        let doc = b"<root><!-- hi --><?pi data?><a>1</a></root>";
        let root = scan_element(doc, 0, MAX_NESTING_DEPTH).unwrap();
        let mut children = ChildIter::new(doc, root.content.clone(), MAX_NESTING_DEPTH);
        let a = children.next().unwrap().unwrap();
        assert_eq!(a.name_bytes(doc), b"a");
    }

    #[test]
    fn attribute_iteration() {
        let doc = br#"<a x="1" y='2'>"#;
        let head = parse_tag_head(doc, 0).unwrap();
        let attrs: Vec<_> = AttrIter::new(doc, head.attrs).map(|r| r.unwrap()).collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(&doc[attrs[0].name.clone()], b"x");
        assert_eq!(&doc[attrs[0].value.clone()], b"1");
        assert_eq!(&doc[attrs[1].name.clone()], b"y");
        assert_eq!(&doc[attrs[1].value.clone()], b"2");
    }

    #[test]
    fn attribute_iteration_rejects_too_many_attributes() {
        let mut doc = String::from("<a");
        for i in 0..=MAX_ATTRIBUTES {
            doc.push_str(&format!(" a{i}=\"1\""));
        }
        doc.push('>');
        let head = parse_tag_head(doc.as_bytes(), 0).unwrap();
        let err = AttrIter::new(doc.as_bytes(), head.attrs).find_map(|r| r.err());
        assert!(err.is_some());
    }

    #[test]
    fn validate_strict_accepts_sibling_roots() {
        assert!(validate_strict(b"<a/><b/>").is_ok());
    }

    #[test]
    fn validate_strict_rejects_stray_text() {
        assert!(validate_strict(b"<a/>stray<b/>").is_err());
    }

    #[test]
    fn validate_strict_rejects_unclosed() {
        assert!(validate_strict(b"<root><user>").is_err());
    }
}

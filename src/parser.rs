//! Section Parser (spec §4.2, component C2).
//!
//! One scanner recognizes both heading markers and tag markers in a single
//! pass (design note §9: "Parser reentrancy in mixed shape") — the same
//! function handles `headings`, `tags`, and `mixed` shapes; which markers
//! actually occur in a given input determines which of those shapes it was.

use crate::error::{CoreError, CoreResult};
use crate::lines::{fenced_mask, split_lines_inclusive};
use crate::model::{Shape, TAG_DEPTH};
use regex::Regex;
use std::sync::OnceLock;

fn tag_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<([A-Za-z][A-Za-z0-9_-]*)(\s[^>]*)?>$").unwrap())
}

fn tag_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^</([A-Za-z][A-Za-z0-9_-]*)>$").unwrap())
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6}) (\S.*)$").unwrap())
}

/// A section still in tree shape, as produced by the parser, before it is
/// flattened and assigned `order_index`/`parent_id` for storage.
#[derive(Debug, Clone)]
pub struct ParsedSection {
    pub depth: i64,
    pub title: String,
    pub body: Vec<u8>,
    pub closing_suffix: Vec<u8>,
    pub line_start: usize,
    pub line_end: usize,
    pub children: Vec<ParsedSection>,
}

pub struct ParseOutput {
    pub header_blob: Vec<u8>,
    pub roots: Vec<ParsedSection>,
}

/// A section flattened into document order, ready for `Store::put_file`.
#[derive(Debug, Clone)]
pub struct FlatSection {
    pub parent_index: Option<usize>,
    pub depth: i64,
    pub title: String,
    pub body: Vec<u8>,
    pub closing_suffix: Vec<u8>,
    pub order_index: i64,
    pub line_start: i64,
    pub line_end: i64,
}

/// Top-level entry point: `parse(bytes, shape) -> (header_blob, ordered_sections)`.
pub fn parse(bytes: &[u8], shape: Shape) -> CoreResult<(Vec<u8>, Vec<FlatSection>)> {
    match shape {
        Shape::Opaque | Shape::Json | Shape::Shell | Shape::MultiFile => {
            let roots = vec![ParsedSection {
                depth: 0,
                title: "".to_string(),
                body: bytes.to_vec(),
                closing_suffix: Vec::new(),
                line_start: 1,
                line_end: count_lines(bytes),
                children: Vec::new(),
            }];
            let flat = flatten(roots);
            check_accounting(&[], &flat, bytes.len())?;
            Ok((Vec::new(), flat))
        }
        Shape::Headings | Shape::Tags | Shape::Mixed => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| CoreError::InputMalformed(format!("not valid utf-8: {e}")))?;
            let (header_blob, header_lines) = extract_header(text);
            let body_text = &text[header_blob.len()..];
            let roots = parse_body(body_text, header_lines)?;
            let flat = flatten(roots);
            check_accounting(&header_blob, &flat, bytes.len())?;
            Ok((header_blob, flat))
        }
    }
}

fn count_lines(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    bytes.iter().filter(|&&b| b == b'\n').count() + if bytes.last() == Some(&b'\n') { 0 } else { 1 }
}

/// Extract a leading `---` ... `---` header block (spec §4.2). Returns the
/// header bytes (empty if absent) and the number of lines it occupies, so
/// the caller can keep global line numbering consistent.
fn extract_header(text: &str) -> (Vec<u8>, usize) {
    let lines = split_lines_inclusive(text);
    if lines.is_empty() {
        return (Vec::new(), 0);
    }
    let is_delim = |l: &str| l.trim_end_matches(['\n', '\r']) == "---";
    if !is_delim(lines[0]) {
        return (Vec::new(), 0);
    }
    for (i, line) in lines.iter().enumerate().skip(1) {
        if is_delim(line) {
            let header_len: usize = lines[..=i].iter().map(|l| l.len()).sum();
            return (text.as_bytes()[..header_len].to_vec(), i + 1);
        }
    }
    (Vec::new(), 0)
}

enum FrameKind {
    Heading(i64, String),
    Tag(String),
}

struct Frame {
    kind: FrameKind,
    start: usize,
    line_start: usize,
    children: Vec<(usize, usize, ParsedSection)>, // (start, end, section)
}

/// Parse the body (everything after the header) with the unified
/// heading/tag scanner (spec §4.2 mixed-shape rule, §9 design note).
fn parse_body(body_text: &str, header_lines: usize) -> CoreResult<Vec<ParsedSection>> {
    let lines = split_lines_inclusive(body_text);
    let mask = fenced_mask(&lines);

    let mut offsets = Vec::with_capacity(lines.len() + 1);
    let mut acc = 0usize;
    for l in &lines {
        offsets.push(acc);
        acc += l.len();
    }
    offsets.push(acc); // sentinel: end of body_text

    let mut stack: Vec<Frame> = Vec::new();
    let mut roots: Vec<(usize, usize, ParsedSection)> = Vec::new();

    let finalize = |frame: Frame, end: usize, body_text: &str| -> ParsedSection {
        let first_child_start = frame.children.first().map(|(s, _, _)| *s);
        let body_end = first_child_start.unwrap_or(end);
        let body = body_text[frame.start..body_end].as_bytes().to_vec();

        let (closing_suffix, depth, title) = match frame.kind {
            FrameKind::Heading(d, title) => (Vec::new(), d, title),
            FrameKind::Tag(name) => {
                let suffix_start = frame
                    .children
                    .last()
                    .map(|(_, e, _)| *e)
                    .unwrap_or(body_end);
                let suffix = body_text[suffix_start..end].as_bytes().to_vec();
                (suffix, TAG_DEPTH, name)
            }
        };

        let line_end = line_number_for_offset(&offsets, end.saturating_sub(1)) + header_lines;
        ParsedSection {
            depth,
            title,
            body,
            closing_suffix,
            line_start: frame.line_start + header_lines,
            line_end,
            children: frame.children.into_iter().map(|(_, _, s)| s).collect(),
        }
    };

    let attach = |stack: &mut Vec<Frame>,
                  roots: &mut Vec<(usize, usize, ParsedSection)>,
                  start: usize,
                  end: usize,
                  section: ParsedSection| {
        if let Some(top) = stack.last_mut() {
            top.children.push((start, end, section));
        } else {
            roots.push((start, end, section));
        }
    };

    for (i, raw_line) in lines.iter().enumerate() {
        let start = offsets[i];
        let end = offsets[i + 1];
        let trimmed = raw_line.trim_end_matches(['\n', '\r']);
        let t = trimmed.trim();

        if mask[i] {
            continue;
        }

        if let Some(caps) = heading_re().captures(t) {
            let depth = caps[1].len() as i64;
            let title = caps[2].to_string();
            // Pop contiguous heading frames with depth >= this one; a tag
            // frame on top blocks popping (mixed-shape rule: tag content is
            // opaque to heading depth comparisons).
            while let Some(top) = stack.last() {
                match &top.kind {
                    FrameKind::Heading(d, _) if *d >= depth => {
                        let frame = stack.pop().unwrap();
                        let frame_start = frame.start;
                        let section = finalize(frame, start, body_text);
                        attach(&mut stack, &mut roots, frame_start, start, section);
                    }
                    _ => break,
                }
            }
            stack.push(Frame {
                kind: FrameKind::Heading(depth, title),
                start,
                line_start: i,
                children: Vec::new(),
            });
            continue;
        }

        if tag_open_re().is_match(t) {
            let name = tag_open_re().captures(t).unwrap()[1].to_string();
            stack.push(Frame {
                kind: FrameKind::Tag(name),
                start,
                line_start: i,
                children: Vec::new(),
            });
            continue;
        }

        if let Some(caps) = tag_close_re().captures(t) {
            let name = caps[1].to_string();
            // A heading sitting open on top of the matching tag frame closes
            // implicitly as the tag's child (mixed-shape rule, spec §4.2).
            while let Some(top) = stack.last() {
                match &top.kind {
                    FrameKind::Heading(_, _) => {
                        let frame = stack.pop().unwrap();
                        let frame_start = frame.start;
                        let section = finalize(frame, start, body_text);
                        attach(&mut stack, &mut roots, frame_start, start, section);
                    }
                    _ => break,
                }
            }
            match stack.last() {
                Some(top) => match &top.kind {
                    FrameKind::Tag(open_name) if *open_name == name => {
                        let frame = stack.pop().unwrap();
                        let frame_start = frame.start;
                        let section = finalize(frame, end, body_text);
                        attach(&mut stack, &mut roots, frame_start, end, section);
                    }
                    _ => {
                        return Err(CoreError::InputMalformed(format!(
                            "closing tag </{name}> does not match innermost open tag (overlapping or mismatched tags) at line {}",
                            i + header_lines + 1
                        )));
                    }
                },
                None => {
                    return Err(CoreError::InputMalformed(format!(
                        "closing tag </{name}> has no matching open tag at line {}",
                        i + header_lines + 1
                    )));
                }
            }
            continue;
        }
    }

    // Any tag frame left open at EOF is an unmatched open — fail fast.
    // Heading frames left open are normal; they simply end at EOF.
    let end = body_text.len();
    while let Some(frame) = stack.pop() {
        if let FrameKind::Tag(name) = &frame.kind {
            return Err(CoreError::InputMalformed(format!(
                "tag <{name}> opened at line {} is never closed",
                frame.line_start + header_lines + 1
            )));
        }
        let frame_start = frame.start;
        let section = finalize(frame, end, body_text);
        attach(&mut stack, &mut roots, frame_start, end, section);
    }

    Ok(roots.into_iter().map(|(_, _, s)| s).collect())
}

fn line_number_for_offset(offsets: &[usize], byte_offset: usize) -> usize {
    // offsets[i] is the start offset of line i (0-based); find the line
    // containing byte_offset via binary search over the sorted offsets.
    match offsets.binary_search(&byte_offset) {
        Ok(i) => i + 1,
        Err(0) => 1,
        Err(i) => i,
    }
}

/// Flatten a section tree into document order (pre-order DFS), assigning
/// dense `order_index` and `parent_index` (spec §3 invariants 2–3).
fn flatten(roots: Vec<ParsedSection>) -> Vec<FlatSection> {
    let mut out = Vec::new();
    fn visit(node: ParsedSection, parent_index: Option<usize>, out: &mut Vec<FlatSection>) {
        let my_index = out.len();
        out.push(FlatSection {
            parent_index,
            depth: node.depth,
            title: node.title,
            body: node.body,
            closing_suffix: node.closing_suffix,
            order_index: my_index as i64,
            line_start: node.line_start as i64,
            line_end: node.line_end as i64,
        });
        for child in node.children {
            visit(child, Some(my_index), out);
        }
    }
    for root in roots {
        visit(root, None, &mut out);
    }
    out
}

/// Parser self-check (spec §4.2): every byte of the input must be accounted
/// for in exactly one of header_blob, some section's body, or some
/// section's closing_suffix.
fn check_accounting(header_blob: &[u8], sections: &[FlatSection], total_len: usize) -> CoreResult<()> {
    let sum: usize = sections
        .iter()
        .map(|s| s.body.len() + s.closing_suffix.len())
        .sum();
    let accounted = header_blob.len() + sum;
    if accounted != total_len {
        return Err(CoreError::ByteAccountingFailure {
            offset: accounted.min(total_len),
            detail: format!(
                "accounted {accounted} bytes, input is {total_len} bytes (header={}, sections_sum={sum})",
                header_blob.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Shape;

    #[test]
    fn headings_round_trip_scenario() {
        let input = b"---\nname: x\n---\n# A\nalpha\n## B\nbeta\n# C\ngamma\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        assert_eq!(header, b"---\nname: x\n---\n");
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, "A");
        assert_eq!(sections[0].depth, 1);
        assert_eq!(sections[0].parent_index, None);
        assert_eq!(sections[1].title, "B");
        assert_eq!(sections[1].depth, 2);
        assert_eq!(sections[1].parent_index, Some(0));
        assert_eq!(sections[2].title, "C");
        assert_eq!(sections[2].parent_index, None);

        let reassembled: Vec<u8> = header
            .iter()
            .chain(sections.iter().flat_map(|s| s.body.iter()))
            .copied()
            .collect();
        assert_eq!(reassembled, input);
    }

    #[test]
    fn tag_leaf_round_trip() {
        let input = b"<skill>\npayload line 1\npayload line 2\n</skill>\n";
        let (header, sections) = parse(input, Shape::Tags).unwrap();
        assert!(header.is_empty());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].depth, TAG_DEPTH);
        assert_eq!(sections[0].title, "skill");
        assert_eq!(
            sections[0].body,
            b"<skill>\npayload line 1\npayload line 2\n".to_vec()
        );
        assert_eq!(sections[0].closing_suffix, b"</skill>\n".to_vec());
    }

    #[test]
    fn nested_tags_round_trip() {
        let input = b"<outer>\npre\n<inner>\nmid\n</inner>\npost\n</outer>\n";
        let (header, sections) = parse(input, Shape::Tags).unwrap();
        assert!(header.is_empty());
        assert_eq!(sections.len(), 2);
        let outer = &sections[0];
        let inner = &sections[1];
        assert_eq!(outer.title, "outer");
        assert_eq!(inner.title, "inner");
        assert_eq!(inner.parent_index, Some(0));
        assert_eq!(outer.body, b"<outer>\npre\n".to_vec());
        assert_eq!(outer.closing_suffix, b"post\n</outer>\n".to_vec());
        assert_eq!(inner.body, b"<inner>\nmid\n".to_vec());
        assert_eq!(inner.closing_suffix, b"</inner>\n".to_vec());
    }

    #[test]
    fn fenced_code_guards_headings() {
        let input = b"# Real\nbefore\n```\n# not a heading\n```\nafter\n";
        let (_, sections) = parse(input, Shape::Headings).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Real");
        assert_eq!(sections[0].body, input.to_vec());
    }

    #[test]
    fn mismatched_tag_fails_fast() {
        let input = b"<a>\ntext\n</b>\n";
        let err = parse(input, Shape::Tags).unwrap_err();
        assert!(matches!(err, CoreError::InputMalformed(_)));
    }

    #[test]
    fn unclosed_tag_fails_fast() {
        let input = b"<a>\ntext\n";
        let err = parse(input, Shape::Tags).unwrap_err();
        assert!(matches!(err, CoreError::InputMalformed(_)));
    }

    #[test]
    fn mixed_heading_inside_tag_is_child() {
        let input = b"<outer>\n# inside\nbody\n</outer>\n";
        let (_, sections) = parse(input, Shape::Mixed).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "outer");
        assert_eq!(sections[0].depth, TAG_DEPTH);
        assert_eq!(sections[1].title, "inside");
        assert_eq!(sections[1].parent_index, Some(0));
    }

    #[test]
    fn mixed_tag_inside_heading_is_child() {
        let input = b"# H\ntext\n<box>\nstuff\n</box>\nmore\n";
        let (_, sections) = parse(input, Shape::Mixed).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "H");
        assert_eq!(sections[1].title, "box");
        assert_eq!(sections[1].parent_index, Some(0));
    }

    #[test]
    fn opaque_whole_file_is_one_section() {
        let input = b"just plain text\nwith no structure at all\n";
        let (header, sections) = parse(input, Shape::Opaque).unwrap();
        assert!(header.is_empty());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].body, input.to_vec());
    }

    #[test]
    fn trailing_text_after_last_child_joins_last_child_body() {
        let input = b"# A\nhead\n## B\nchild\ntrailing text\n";
        let (_, sections) = parse(input, Shape::Headings).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].body, b"# A\nhead\n".to_vec());
        assert_eq!(sections[1].body, b"## B\nchild\ntrailing text\n".to_vec());
    }
}

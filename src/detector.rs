//! Format Detector (spec §4.1, component C1). Pure classification — never
//! mutates the input bytes.

use crate::lines::{fenced_mask, split_lines_inclusive};
use crate::model::Shape;
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
    RE.get_or_init(|| Regex::new(r"^#{1,6} \S").unwrap())
}

/// Classify raw input bytes plus a path hint (used only as a human-facing
/// hint; it carries no structural weight in the decision procedure).
pub fn detect_shape(bytes: &[u8], _path_hint: &str) -> Shape {
    if looks_like_json(bytes) {
        return Shape::Json;
    }

    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => return Shape::Opaque,
    };

    let lines = split_lines_inclusive(text);
    let mask = fenced_mask(&lines);

    let mut tag_depth = 0i32;
    let mut tags_found = false;
    let mut headings_found = false;

    for (i, line) in lines.iter().enumerate() {
        if mask[i] {
            continue;
        }
        let t = line.trim_end_matches(['\n', '\r']).trim();
        if tag_open_re().is_match(t) {
            tag_depth += 1;
        } else if tag_close_re().is_match(t) {
            if tag_depth > 0 {
                tag_depth -= 1;
                tags_found = true;
            }
        } else if heading_re().is_match(t) {
            headings_found = true;
        }
    }

    match (tags_found, headings_found) {
        (true, true) => Shape::Mixed,
        (true, false) => Shape::Tags,
        (false, true) => Shape::Headings,
        (false, false) => Shape::Opaque,
    }
}

fn looks_like_json(bytes: &[u8]) -> bool {
    let trimmed = {
        let mut i = 0;
        while i < bytes.len() && (bytes[i] as char).is_whitespace() {
            i += 1;
        }
        &bytes[i..]
    };
    if !matches!(trimmed.first(), Some(b'{') | Some(b'[')) {
        return false;
    }
    serde_json::from_slice::<serde_json::Value>(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_headings() {
        let input = b"# A\nalpha\n## B\nbeta\n";
        assert_eq!(detect_shape(input, "x.md"), Shape::Headings);
    }

    #[test]
    fn detects_tags() {
        let input = b"<skill>\npayload\n</skill>\n";
        assert_eq!(detect_shape(input, "x.txt"), Shape::Tags);
    }

    #[test]
    fn detects_mixed() {
        let input = b"<outer>\n# heading inside\nbody\n</outer>\n";
        assert_eq!(detect_shape(input, "x.txt"), Shape::Mixed);
    }

    #[test]
    fn detects_opaque() {
        let input = b"just some plain text\nwith no structure\n";
        assert_eq!(detect_shape(input, "x.txt"), Shape::Opaque);
    }

    #[test]
    fn detects_json() {
        let input = b"{\"a\": 1, \"b\": [1,2,3]}";
        assert_eq!(detect_shape(input, "x.json"), Shape::Json);
    }

    #[test]
    fn ignores_headings_inside_fence() {
        let input = b"# A\n```\n# not a heading\n```\nsome text\n";
        assert_eq!(detect_shape(input, "x.md"), Shape::Headings);
    }

    #[test]
    fn ignores_tags_inside_fence() {
        let input = b"plain text\n```\n<skill>\n</skill>\n```\nmore text\n";
        assert_eq!(detect_shape(input, "x.txt"), Shape::Opaque);
    }
}

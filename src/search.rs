//! Lexical search (spec §4.8). Rewrites a free-form query into FTS5 MATCH
//! syntax: a caller that already knows FTS5 syntax (quoted phrases, boolean
//! operators) gets it passed straight through; anything else is treated as
//! a bag of words and OR-joined so a multi-word query widens rather than
//! narrows the result set.

use crate::error::CoreResult;
use crate::model::Section;
use crate::store::Store;

const BOOLEAN_KEYWORDS: [&str; 3] = ["AND", "OR", "NEAR"];

pub fn rewrite_query(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains('"') {
        return trimmed.to_string();
    }
    if trimmed
        .split_whitespace()
        .any(|tok| BOOLEAN_KEYWORDS.contains(&tok))
    {
        return trimmed.to_string();
    }
    trimmed
        .split_whitespace()
        .map(sanitize_token)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn sanitize_token(tok: &str) -> String {
    tok.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

pub fn search(store: &Store, raw_query: &str, limit: usize) -> CoreResult<Vec<(Section, f64)>> {
    let fts_query = rewrite_query(raw_query);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }
    store.search_lexical(&fts_query, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_are_or_joined() {
        assert_eq!(rewrite_query("install guide"), "install OR guide");
    }

    #[test]
    fn quoted_phrase_passes_through() {
        assert_eq!(rewrite_query("\"exact phrase\""), "\"exact phrase\"");
    }

    #[test]
    fn boolean_operators_pass_through() {
        assert_eq!(rewrite_query("install AND configure"), "install AND configure");
    }

    #[test]
    fn empty_query_rewrites_to_empty() {
        assert_eq!(rewrite_query("   "), "");
    }

    #[test]
    fn search_end_to_end() {
        use crate::model::Shape;
        use crate::parser::parse;

        let input = b"# Installing\nrun cargo build\n# Testing\nrun cargo test\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        let store = Store::open_in_memory().unwrap();
        store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        let results = search(&store, "build", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.title, "Installing");
    }
}

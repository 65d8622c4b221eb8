//! Recomposer (spec §4.5): the inverse of the Parser. Emits a section's
//! body, then its children recursively in order, then its closing_suffix —
//! the same rule regardless of shape, which is what makes the heading-shape
//! "trailing text joins last child" rule (§4.2) sufficient on its own.

use crate::error::{CoreError, CoreResult};
use crate::model::Section;
use crate::parser::FlatSection;
use crate::store::Store;

/// Recompose directly from a freshly-parsed section list, without touching
/// the store. Used by the Validator for pipeline self-checks.
pub fn recompose_flat(header_blob: &[u8], sections: &[FlatSection]) -> Vec<u8> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); sections.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (i, s) in sections.iter().enumerate() {
        match s.parent_index {
            Some(p) => children[p].push(i),
            None => roots.push(i),
        }
    }

    let mut out = header_blob.to_vec();
    fn emit(i: usize, sections: &[FlatSection], children: &[Vec<usize>], out: &mut Vec<u8>) {
        out.extend_from_slice(&sections[i].body);
        for &c in &children[i] {
            emit(c, sections, children, out);
        }
        out.extend_from_slice(&sections[i].closing_suffix);
    }
    for r in roots {
        emit(r, sections, &children, &mut out);
    }
    out
}

/// Recompose a file already ingested into the store (spec §4.5 / §4.6
/// `recompose` entry point).
pub fn recompose_store(store: &Store, file_id: i64) -> CoreResult<Vec<u8>> {
    let file = store
        .get_file_by_id(file_id)?
        .ok_or_else(|| CoreError::NotFound(format!("file {file_id}")))?;
    let sections = store.sections_for_file(file_id)?;
    let mut out = file.header_blob.clone();
    emit_store_children(&sections, None, &mut out);
    Ok(out)
}

fn emit_store_children(sections: &[Section], parent_id: Option<i64>, out: &mut Vec<u8>) {
    for s in sections.iter().filter(|s| s.parent_id == parent_id) {
        out.extend_from_slice(&s.body);
        emit_store_children(sections, Some(s.id), out);
        out.extend_from_slice(&s.closing_suffix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Shape;
    use crate::parser::parse;

    #[test]
    fn recompose_flat_matches_original_bytes() {
        let input = b"---\nk: v\n---\n# A\nalpha\n## B\nbeta\ntrailing\n# C\ngamma\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        let out = recompose_flat(&header, &sections);
        assert_eq!(out, input.to_vec());
    }

    #[test]
    fn recompose_flat_matches_nested_tags() {
        let input = b"<outer>\npre\n<inner>\nmid\n</inner>\npost\n</outer>\n";
        let (header, sections) = parse(input, Shape::Tags).unwrap();
        let out = recompose_flat(&header, &sections);
        assert_eq!(out, input.to_vec());
    }

    #[test]
    fn recompose_store_matches_original_bytes() {
        let input = b"# A\nalpha\n## B\nbeta\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        let store = Store::open_in_memory().unwrap();
        let file_id = store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        let out = recompose_store(&store, file_id).unwrap();
        assert_eq!(out, input.to_vec());
    }
}

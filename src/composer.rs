//! Composer (spec §4.11): assembles a brand-new document out of sections
//! pulled from the store, in caller-specified order, with a fresh header
//! built from supplied metadata. Used to build derived documents (e.g. a
//! curated digest) without re-parsing anything.

use crate::error::{CoreError, CoreResult};
use crate::hasher::hash_bytes;
use crate::model::Section;
use crate::store::Store;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

pub struct ComposeRequest {
    pub section_ids: Vec<i64>,
    pub metadata: BTreeMap<String, String>,
}

/// Loads `req.section_ids`, rebuilds the parent/child hierarchy restricted
/// to that set (a selected section nests under another selected section
/// only if that parent was also selected; otherwise it becomes a root in
/// the composed output), and writes the result to `output_path`. Returns
/// the content hash of the bytes written.
pub fn compose(store: &Store, req: &ComposeRequest, output_path: &Path) -> CoreResult<String> {
    let mut sections = Vec::with_capacity(req.section_ids.len());
    for id in &req.section_ids {
        let section = store
            .get_section(*id)?
            .ok_or_else(|| CoreError::NotFound(format!("section {id}")))?;
        sections.push(section);
    }

    let selected_ids: HashSet<i64> = req.section_ids.iter().copied().collect();
    let index_of: HashMap<i64, usize> = sections.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

    let mut out = build_header(&req.metadata);
    for &id in &req.section_ids {
        let idx = index_of[&id];
        let parent_in_set = sections[idx]
            .parent_id
            .map(|p| selected_ids.contains(&p))
            .unwrap_or(false);
        if !parent_in_set {
            emit(idx, &sections, &index_of, &req.section_ids, &mut out);
        }
    }

    std::fs::write(output_path, &out)?;
    Ok(hash_bytes(&out))
}

fn emit(idx: usize, sections: &[Section], index_of: &HashMap<i64, usize>, order: &[i64], out: &mut Vec<u8>) {
    let s = &sections[idx];
    out.extend_from_slice(&s.body);
    for &child_id in order {
        if let Some(&ci) = index_of.get(&child_id) {
            if sections[ci].parent_id == Some(s.id) {
                emit(ci, sections, index_of, order, out);
            }
        }
    }
    out.extend_from_slice(&s.closing_suffix);
}

fn build_header(metadata: &BTreeMap<String, String>) -> Vec<u8> {
    if metadata.is_empty() {
        return Vec::new();
    }
    let mut s = String::from("---\n");
    for (k, v) in metadata {
        s.push_str(k);
        s.push_str(": ");
        s.push_str(v);
        s.push('\n');
    }
    s.push_str("---\n");
    s.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Shape;
    use crate::parser::parse;

    #[test]
    fn compose_subset_preserves_nesting() {
        let input = b"# A\nalpha\n## B\nbeta\n# C\ngamma\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        let store = Store::open_in_memory().unwrap();
        let file_id = store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        let all = store.sections_for_file(file_id).unwrap();
        let a = all.iter().find(|s| s.title == "A").unwrap();
        let b = all.iter().find(|s| s.title == "B").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("composed.md");
        let req = ComposeRequest {
            section_ids: vec![a.id, b.id],
            metadata: BTreeMap::new(),
        };
        let hash = compose(&store, &req, &out_path).unwrap();
        let bytes = std::fs::read(&out_path).unwrap();
        assert_eq!(bytes, b"# A\nalpha\n## B\nbeta\n".to_vec());
        assert_eq!(hash, hash_bytes(&bytes));
    }

    #[test]
    fn compose_writes_metadata_header() {
        let input = b"# A\nalpha\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        let store = Store::open_in_memory().unwrap();
        let file_id = store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        let all = store.sections_for_file(file_id).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("composed.md");
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "digest".to_string());
        let req = ComposeRequest {
            section_ids: vec![all[0].id],
            metadata,
        };
        compose(&store, &req, &out_path).unwrap();
        let bytes = std::fs::read(&out_path).unwrap();
        assert!(bytes.starts_with(b"---\nsource: digest\n---\n"));
    }
}

//! Embedded relational store (spec §4.4). SQLite via `rusqlite`, with an
//! FTS5 virtual table kept in sync by triggers so lexical search never runs
//! against a stale index (grounded on the files→sections→embeddings cascade
//! and FTS5 sync-trigger pattern used for local search indexes elsewhere in
//! the pack).

use crate::error::{CoreError, CoreResult};
use crate::model::{FileRecord, Section, Shape, TreeNode};
use crate::parser::FlatSection;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct Store {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    shape TEXT NOT NULL,
    header_blob BLOB NOT NULL,
    content_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    parent_id INTEGER REFERENCES sections(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    title TEXT NOT NULL,
    body BLOB NOT NULL,
    order_index INTEGER NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    closing_suffix BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sections_file ON sections(file_id);
CREATE INDEX IF NOT EXISTS idx_sections_parent ON sections(parent_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sections_file_order ON sections(file_id, order_index);

CREATE VIRTUAL TABLE IF NOT EXISTS sections_fts USING fts5(
    title, body,
    content='sections', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS sections_ai AFTER INSERT ON sections BEGIN
    INSERT INTO sections_fts(rowid, title, body) VALUES (new.id, new.title, CAST(new.body AS TEXT));
END;

CREATE TRIGGER IF NOT EXISTS sections_ad AFTER DELETE ON sections BEGIN
    INSERT INTO sections_fts(sections_fts, rowid, title, body) VALUES('delete', old.id, old.title, CAST(old.body AS TEXT));
END;

CREATE TRIGGER IF NOT EXISTS sections_au AFTER UPDATE ON sections BEGIN
    INSERT INTO sections_fts(sections_fts, rowid, title, body) VALUES('delete', old.id, old.title, CAST(old.body AS TEXT));
    INSERT INTO sections_fts(rowid, title, body) VALUES (new.id, new.title, CAST(new.body AS TEXT));
END;

CREATE TABLE IF NOT EXISTS embeddings (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    section_id INTEGER NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
    model_id TEXT NOT NULL,
    vector BLOB NOT NULL,
    PRIMARY KEY (section_id, model_id)
);
"#;

/// SQLITE_BUSY/SQLITE_LOCKED mean another connection holds the write lock or
/// is mid-transaction — retryable, unlike a generic rusqlite error, so it
/// gets its own `CoreError` variant (spec §7) instead of falling through the
/// blanket `#[from] rusqlite::Error` conversion.
fn map_sqlite_err(e: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &e {
        if matches!(
            ffi_err.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return CoreError::StoreBusy;
        }
    }
    CoreError::from(e)
}

impl Store {
    pub fn open(path: &Path) -> CoreResult<Store> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> CoreResult<Store> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Replace-on-conflict ingest (spec §4.6): any existing file at `path`
    /// (and its sections, cascading to embeddings) is removed before the
    /// new tree is inserted, inside one transaction.
    pub fn put_file(
        &self,
        path: &str,
        kind: &str,
        shape: Shape,
        header_blob: &[u8],
        content_hash: &str,
        sections: &[FlatSection],
        now: i64,
    ) -> CoreResult<i64> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction().map_err(map_sqlite_err)?;

        tx.execute("DELETE FROM files WHERE path = ?1", params![path])
            .map_err(map_sqlite_err)?;

        tx.execute(
            "INSERT INTO files (path, kind, shape, header_blob, content_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![path, kind, shape.as_str(), header_blob, content_hash, now],
        )
        .map_err(map_sqlite_err)?;
        let file_id = tx.last_insert_rowid();

        let mut inserted_ids: Vec<i64> = Vec::with_capacity(sections.len());
        for s in sections {
            let parent_id = match s.parent_index {
                Some(idx) => Some(inserted_ids[idx]),
                None => None,
            };
            tx.execute(
                "INSERT INTO sections (file_id, parent_id, depth, title, body, order_index, line_start, line_end, closing_suffix)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    file_id,
                    parent_id,
                    s.depth,
                    s.title,
                    s.body,
                    s.order_index,
                    s.line_start,
                    s.line_end,
                    s.closing_suffix,
                ],
            )
            .map_err(map_sqlite_err)?;
            inserted_ids.push(tx.last_insert_rowid());
        }

        tx.commit().map_err(map_sqlite_err)?;
        Ok(file_id)
    }

    pub fn delete_file(&self, path: &str) -> CoreResult<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let affected = conn
            .execute("DELETE FROM files WHERE path = ?1", params![path])
            .map_err(map_sqlite_err)?;
        Ok(affected > 0)
    }

    pub fn get_file_by_path(&self, path: &str) -> CoreResult<Option<FileRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT id, path, kind, shape, header_blob, content_hash, created_at, updated_at
             FROM files WHERE path = ?1",
            params![path],
            row_to_file,
        )
        .optional()
        .map_err(CoreError::from)
    }

    pub fn get_file_by_id(&self, file_id: i64) -> CoreResult<Option<FileRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT id, path, kind, shape, header_blob, content_hash, created_at, updated_at
             FROM files WHERE id = ?1",
            params![file_id],
            row_to_file,
        )
        .optional()
        .map_err(CoreError::from)
    }

    pub fn list_files(&self) -> CoreResult<Vec<FileRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, path, kind, shape, header_blob, content_hash, created_at, updated_at
             FROM files ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_file)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    pub fn get_section(&self, section_id: i64) -> CoreResult<Option<Section>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT id, file_id, parent_id, depth, title, body, order_index, line_start, line_end, closing_suffix
             FROM sections WHERE id = ?1",
            params![section_id],
            row_to_section,
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// Sections belonging to a file, in document order (order_index asc).
    pub fn sections_for_file(&self, file_id: i64) -> CoreResult<Vec<Section>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, file_id, parent_id, depth, title, body, order_index, line_start, line_end, closing_suffix
             FROM sections WHERE file_id = ?1 ORDER BY order_index ASC",
        )?;
        let rows = stmt.query_map(params![file_id], row_to_section)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    pub fn first_child(&self, section_id: i64) -> CoreResult<Option<Section>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT id, file_id, parent_id, depth, title, body, order_index, line_start, line_end, closing_suffix
             FROM sections WHERE parent_id = ?1 ORDER BY order_index ASC LIMIT 1",
            params![section_id],
            row_to_section,
        )
        .optional()
        .map_err(CoreError::from)
    }

    pub fn next_sibling(&self, section_id: i64) -> CoreResult<Option<Section>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let current: Option<(i64, Option<i64>, i64)> = conn
            .query_row(
                "SELECT file_id, parent_id, order_index FROM sections WHERE id = ?1",
                params![section_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((file_id, parent_id, order_index)) = current else {
            return Ok(None);
        };
        let result = match parent_id {
            Some(pid) => conn
                .query_row(
                    "SELECT id, file_id, parent_id, depth, title, body, order_index, line_start, line_end, closing_suffix
                     FROM sections WHERE parent_id = ?1 AND order_index > ?2 ORDER BY order_index ASC LIMIT 1",
                    params![pid, order_index],
                    row_to_section,
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT id, file_id, parent_id, depth, title, body, order_index, line_start, line_end, closing_suffix
                     FROM sections WHERE file_id = ?1 AND parent_id IS NULL AND order_index > ?2 ORDER BY order_index ASC LIMIT 1",
                    params![file_id, order_index],
                    row_to_section,
                )
                .optional()?,
        };
        Ok(result)
    }

    pub fn tree(&self, file_id: i64) -> CoreResult<Vec<TreeNode>> {
        let sections = self.sections_for_file(file_id)?;
        Ok(build_tree(&sections, None))
    }

    /// Lexical search via FTS5 (spec §4.8). `rank` is bm25() — smaller is
    /// more relevant, so we flip the sign before returning it to callers
    /// that treat higher as better (the blender, §4.9).
    pub fn search_lexical(&self, fts_query: &str, limit: usize) -> CoreResult<Vec<(Section, f64)>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT s.id, s.file_id, s.parent_id, s.depth, s.title, s.body, s.order_index,
                    s.line_start, s.line_end, s.closing_suffix, bm25(sections_fts) AS rank
             FROM sections_fts
             JOIN sections s ON s.id = sections_fts.rowid
             WHERE sections_fts MATCH ?1
             ORDER BY rank ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![fts_query, limit as i64], |r| {
            let section = row_to_section(r)?;
            let rank: f64 = r.get(10)?;
            Ok((section, -rank))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    pub fn upsert_embedding(
        &self,
        file_id: i64,
        section_id: i64,
        model_id: &str,
        vector: &[f32],
    ) -> CoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        conn.execute(
            "INSERT INTO embeddings (file_id, section_id, model_id, vector) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(section_id, model_id) DO UPDATE SET vector = excluded.vector",
            params![file_id, section_id, model_id, bytes],
        )
        .map_err(map_sqlite_err)?;
        Ok(())
    }

    pub fn embeddings_for_model(&self, model_id: &str) -> CoreResult<Vec<(i64, Vec<f32>)>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT section_id, vector FROM embeddings WHERE model_id = ?1")?;
        let rows = stmt.query_map(params![model_id], |r| {
            let section_id: i64 = r.get(0)?;
            let bytes: Vec<u8> = r.get(1)?;
            Ok((section_id, decode_vector(&bytes)))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn build_tree(sections: &[Section], parent_id: Option<i64>) -> Vec<TreeNode> {
    sections
        .iter()
        .filter(|s| s.parent_id == parent_id)
        .map(|s| TreeNode {
            id: s.id,
            title: s.title.clone(),
            depth: s.depth,
            order_index: s.order_index,
            children: build_tree(sections, Some(s.id)),
        })
        .collect()
}

fn row_to_file(r: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let shape_str: String = r.get(3)?;
    Ok(FileRecord {
        id: r.get(0)?,
        path: r.get(1)?,
        kind: r.get(2)?,
        shape: Shape::parse(&shape_str).unwrap_or(Shape::Opaque),
        header_blob: r.get(4)?,
        content_hash: r.get(5)?,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

fn row_to_section(r: &rusqlite::Row) -> rusqlite::Result<Section> {
    Ok(Section {
        id: r.get(0)?,
        file_id: r.get(1)?,
        parent_id: r.get(2)?,
        depth: r.get(3)?,
        title: r.get(4)?,
        body: r.get(5)?,
        order_index: r.get(6)?,
        line_start: r.get(7)?,
        line_end: r.get(8)?,
        closing_suffix: r.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn sample_sections() -> (Vec<u8>, Vec<FlatSection>) {
        let input = b"# A\nalpha\n## B\nbeta\n";
        parse(input, Shape::Headings).unwrap()
    }

    #[test]
    fn put_and_get_file_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let (header, sections) = sample_sections();
        let file_id = store
            .put_file("a.md", "guide", Shape::Headings, &header, "deadbeef", &sections, 100)
            .unwrap();
        let file = store.get_file_by_id(file_id).unwrap().unwrap();
        assert_eq!(file.path, "a.md");
        assert_eq!(file.shape, Shape::Headings);
    }

    #[test]
    fn put_file_cascades_on_replace() {
        let store = Store::open_in_memory().unwrap();
        let (header, sections) = sample_sections();
        store
            .put_file("a.md", "guide", Shape::Headings, &header, "hash1", &sections, 100)
            .unwrap();
        let file_id = store
            .put_file("a.md", "guide", Shape::Headings, &header, "hash2", &sections, 200)
            .unwrap();
        let got = store.sections_for_file(file_id).unwrap();
        assert_eq!(got.len(), 2);
        let file = store.get_file_by_path("a.md").unwrap().unwrap();
        assert_eq!(file.content_hash, "hash2");
    }

    #[test]
    fn delete_file_cascades_to_sections() {
        let store = Store::open_in_memory().unwrap();
        let (header, sections) = sample_sections();
        let file_id = store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        assert!(store.delete_file("a.md").unwrap());
        assert!(store.get_file_by_id(file_id).unwrap().is_none());
        assert!(store.sections_for_file(file_id).unwrap().is_empty());
    }

    #[test]
    fn first_child_and_next_sibling() {
        let store = Store::open_in_memory().unwrap();
        let input = b"# A\nalpha\n## B\nbeta\n## C\ngamma\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        let all = store.sections_for_file(1).unwrap();
        let root = all.iter().find(|s| s.title == "A").unwrap();
        let first = store.first_child(root.id).unwrap().unwrap();
        assert_eq!(first.title, "B");
        let sibling = store.next_sibling(first.id).unwrap().unwrap();
        assert_eq!(sibling.title, "C");
        assert!(store.next_sibling(sibling.id).unwrap().is_none());
    }

    #[test]
    fn lexical_search_finds_section() {
        let store = Store::open_in_memory().unwrap();
        let input = b"# Installing\nrun cargo build to compile\n# Testing\nrun cargo test\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        let results = store.search_lexical("compile", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.title, "Installing");
    }

    #[test]
    fn tree_nests_by_depth() {
        let store = Store::open_in_memory().unwrap();
        let input = b"# A\nalpha\n## B\nbeta\n";
        let (header, sections) = parse(input, Shape::Headings).unwrap();
        let file_id = store
            .put_file("a.md", "guide", Shape::Headings, &header, "h", &sections, 1)
            .unwrap();
        let tree = store.tree(file_id).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].title, "A");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].title, "B");
    }
}

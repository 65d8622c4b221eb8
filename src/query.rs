//! Query surface (spec §4.7, §6.1). Thin wrappers over the Store that fix
//! the NotFound contract: a section or file that doesn't exist is `None`,
//! never `Err` — `CoreError::NotFound` is reserved for operations where the
//! caller supplied an id that must already resolve (e.g. recompose).

use crate::error::CoreResult;
use crate::model::{Section, TreeNode};
use crate::store::Store;

pub fn get_section(store: &Store, section_id: i64) -> CoreResult<Option<Section>> {
    store.get_section(section_id)
}

pub fn first_child(store: &Store, section_id: i64) -> CoreResult<Option<Section>> {
    store.first_child(section_id)
}

pub fn next_sibling(store: &Store, section_id: i64) -> CoreResult<Option<Section>> {
    store.next_sibling(section_id)
}

pub fn tree(store: &Store, file_id: i64) -> CoreResult<Vec<TreeNode>> {
    store.tree(file_id)
}

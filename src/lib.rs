#[macro_export]
macro_rules! debug_log {
	($($arg:tt)*) => {{
		#[cfg(debug_assertions)]
		{
			eprintln!($($arg)*);
		}
	}};
}

pub mod blender;
pub mod composer;
pub mod config;
pub mod detector;
pub mod error;
pub mod hasher;
pub mod integrity;
pub mod lines;
pub mod model;
pub mod parser;
pub mod query;
pub mod recomposer;
pub mod search;
pub mod store;
pub mod validator;

use crate::error::CoreResult;
use crate::store::Store;

/// Ties the Format Detector, Parser, Hasher, and Store together into one
/// call (spec §4.6): `bytes -> shape -> sections -> stored file`. This is
/// the crate's primary entry point; everything else (query, search,
/// recompose, validate, compose) operates on what this produces.
pub fn ingest(store: &Store, path: &str, kind: &str, bytes: &[u8], now: i64) -> CoreResult<i64> {
    let shape = detector::detect_shape(bytes, path);
    let (header_blob, sections) = parser::parse(bytes, shape)?;
    let content_hash = hasher::hash_bytes(bytes);
    store.put_file(path, kind, shape, &header_blob, &content_hash, &sections, now)
}

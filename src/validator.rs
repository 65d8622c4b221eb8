//! Integrity Validator (spec §4.6, §4.10). Confirms the byte-perfect
//! round-trip guarantee holds for a given input: parse, recompose, rehash,
//! and compare.

use crate::hasher::hash_bytes;
use crate::model::Shape;
use crate::parser::parse;
use crate::recomposer::recompose_flat;
use crate::store::Store;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub expected_hash: String,
    pub actual_hash: String,
    /// First byte offset at which the recomposed output diverges from the
    /// input, if it diverges at all.
    pub mismatch_offset: Option<usize>,
}

/// Run the full parse → recompose → rehash cycle against raw bytes, with no
/// store involved. This is the cheapest possible self-check and is what the
/// Integrity Runner uses for a bulk sweep (spec §4.10).
pub fn validate_bytes(bytes: &[u8], shape: Shape) -> ValidationOutcome {
    let expected_hash = hash_bytes(bytes);
    let parsed = parse(bytes, shape);
    let (recomposed, parse_ok) = match parsed {
        Ok((header, sections)) => (recompose_flat(&header, &sections), true),
        Err(_) => (Vec::new(), false),
    };

    if !parse_ok {
        return ValidationOutcome {
            ok: false,
            expected_hash,
            actual_hash: String::new(),
            mismatch_offset: Some(0),
        };
    }

    let actual_hash = hash_bytes(&recomposed);
    let ok = actual_hash == expected_hash;
    let mismatch_offset = if ok {
        None
    } else {
        Some(first_divergence(bytes, &recomposed))
    };

    ValidationOutcome {
        ok,
        expected_hash,
        actual_hash,
        mismatch_offset,
    }
}

/// Validate a file already ingested into the store: recompose it from the
/// stored sections and compare against the `content_hash` recorded at
/// ingest time. A mismatch here is store corruption (spec §7), not a soft
/// "not found" result, so it is raised as `CoreError::StoreCorruption`
/// rather than returned as a failing `ValidationOutcome`.
pub fn validate_stored(store: &Store, file_id: i64) -> crate::error::CoreResult<ValidationOutcome> {
    use crate::error::CoreError;

    let file = store
        .get_file_by_id(file_id)?
        .ok_or_else(|| CoreError::NotFound(format!("file {file_id}")))?;
    let recomposed = crate::recomposer::recompose_store(store, file_id)?;
    let actual_hash = hash_bytes(&recomposed);
    if actual_hash != file.content_hash {
        return Err(CoreError::StoreCorruption { path: file.path.clone() });
    }
    Ok(ValidationOutcome {
        ok: true,
        expected_hash: file.content_hash,
        actual_hash,
        mismatch_offset: None,
    })
}

fn first_divergence(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).position(|(x, y)| x != y).unwrap_or(a.len().min(b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_input_round_trips() {
        let input = b"# A\nalpha\n## B\nbeta\n";
        let outcome = validate_bytes(input, Shape::Headings);
        assert!(outcome.ok);
        assert_eq!(outcome.expected_hash, outcome.actual_hash);
        assert!(outcome.mismatch_offset.is_none());
    }

    #[test]
    fn malformed_input_fails_validation() {
        let input = b"<a>\ntext\n</b>\n";
        let outcome = validate_bytes(input, Shape::Tags);
        assert!(!outcome.ok);
        assert_eq!(outcome.mismatch_offset, Some(0));
    }
}

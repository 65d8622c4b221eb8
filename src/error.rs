//! Typed error taxonomy for the library boundary (see spec §7).
//!
//! `anyhow` remains the error type at the CLI boundary; this enum is what
//! callers further up the stack (the CLI, a future handler, a test) match on
//! to decide whether something is retryable, soft, or fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Header delimiters unbalanced, or a tag open/close mismatch. The file
    /// is not ingested.
    #[error("input malformed: {0}")]
    InputMalformed(String),

    /// The parser's own self-check (§4.2 byte accounting) failed. This is a
    /// parser bug, not a user error.
    #[error("byte accounting failure at offset {offset}: {detail}")]
    ByteAccountingFailure { offset: usize, detail: String },

    /// No file at the given path, or no section at the given id.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write was attempted while another writer holds the store.
    #[error("store busy")]
    StoreBusy,

    /// The stored content hash no longer matches what recomposition
    /// produces. Fatal for that file.
    #[error("store corruption in {path}: hash mismatch")]
    StoreCorruption { path: String },

    /// Embedder timeout, rate-limit, or 5xx class. Retryable.
    #[error("external transient failure: {0}")]
    ExternalTransient(String),

    /// Embedder rejected the input outright (malformed, too large). Not
    /// retried.
    #[error("external permanent failure: {0}")]
    ExternalPermanent(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

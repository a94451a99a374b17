//! Error taxonomy for the engine (spec.md §7).
//!
//! The teacher crate gets away with a single `{code, message}` struct
//! because it only ever surfaces whatever WiredTiger's C layer reports.
//! This engine has its own failure modes (format validation, duplicate
//! keys, cancellation, use-after-release) so they get their own variants,
//! following `bsharp_il`'s use of `thiserror` for a layered error enum.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not a recordstore file (bad magic) at {path}")]
    InvalidFormat { path: PathBuf },

    #[error("unsupported file version {found} at {path} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: i16,
        expected: i16,
    },

    #[error("duplicate key: table `{table}` already has a live record with Id {id}")]
    DuplicateKey { table: String, id: i32 },

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("record codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("commit was cancelled")]
    Cancelled,

    #[error("context already released")]
    Disposed,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },
}

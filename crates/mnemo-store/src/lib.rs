//! Content-addressed blob storage for chain payloads.

mod fs_store;

pub use fs_store::FsStore;

use mnemo_canon::Digest;
use std::{io, path::PathBuf};

pub type StoreResult<T> = Result<T, StoreError>;

/// Bytes written over a blob when its entry is redacted. The digest and chain
/// position of the entry survive; only the payload is destroyed.
pub const REDACTION_SENTINEL: &[u8] = b"[redacted]";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("blob {0} not found")]
    NotFound(Digest),
    #[error("blob hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: Digest, actual: Digest },
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source: err,
    }
}

use thiserror::Error;

pub type ChainResult<T> = Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown seq {0}")]
    UnknownSeq(u64),
    #[error("supersede cycle: {0}")]
    CyclicSupersede(String),
    #[error("chain is locked by another writer")]
    WriteLocked,
    #[error("signature failure: {0}")]
    SignatureFailed(String),
    #[error("chain verification failed at seq {seq}: invariant {invariant}")]
    VerifyFailed { seq: u64, invariant: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt chain: {0}")]
    Corrupt(String),
    #[error("anchor backend '{provider}' unavailable: {reason}")]
    BackendUnavailable { provider: String, reason: String },
    #[error("anchor backend '{provider}' timed out")]
    BackendTimeout { provider: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store error: {0}")]
    Store(#[from] mnemo_store::StoreError),
    #[error("canonical encoding error: {0}")]
    Canon(#[from] mnemo_canon::CanonError),
    #[error("index error: {0}")]
    Index(#[from] rusqlite::Error),
}

impl ChainError {
    /// Stable machine-readable tag for each failure kind. CLI exit codes and
    /// error lines key off these, so they must not change.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::InvalidInput(_) => "invalid_input",
            ChainError::UnknownSeq(_) => "unknown_seq",
            ChainError::CyclicSupersede(_) => "cyclic_supersede",
            ChainError::WriteLocked => "write_locked",
            ChainError::SignatureFailed(_) => "signature_failed",
            ChainError::VerifyFailed { .. } => "verify_failed",
            ChainError::Io(_) => "io",
            ChainError::Corrupt(_) => "corrupt",
            ChainError::BackendUnavailable { .. } => "backend_unavailable",
            ChainError::BackendTimeout { .. } => "backend_timeout",
            ChainError::Conflict(_) => "conflict",
            ChainError::Store(mnemo_store::StoreError::HashMismatch { .. }) => "corrupt",
            ChainError::Store(mnemo_store::StoreError::NotFound(_)) => "corrupt",
            ChainError::Store(_) => "io",
            ChainError::Canon(_) => "corrupt",
            ChainError::Index(_) => "io",
        }
    }
}

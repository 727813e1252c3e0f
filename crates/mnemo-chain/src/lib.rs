//! Verifiable, append-only memory chain for AI agents.
//!
//! Every remembered fact is a signed, hash-linked, content-addressed entry
//! in an on-disk journal. A derived SQLite index serves recall, supersession
//! and block lookups, and can always be rebuilt from the journal. Anchor
//! backends bind chain state to external timestamping authorities.

pub mod anchor;
pub mod config;
pub mod entry;
pub mod error;
pub mod index;
pub mod journal;
pub mod keys;
pub mod ops;
pub mod verify;

pub use anchor::{AnchorBackend, AnchorRegistry, MockBackend, Receipt, ReceiptStatus};
pub use mnemo_canon::Digest;
pub use config::ChainConfig;
pub use entry::{BlockLabel, Entry, EntryKind, Links, Provenance, ProvenanceSource, Tier};
pub use error::{ChainError, ChainResult};
pub use index::DecayTier;
pub use journal::Head;
pub use ops::{
    BlockUpdateRequest, Chain, CommitReceipt, CommitRequest, RecallHit, RecallRequest,
    RethinkRequest,
};
pub use verify::VerifyReport;

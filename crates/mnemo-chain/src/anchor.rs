//! Pluggable anchoring: bind chain state to an external timestamping
//! authority and track the receipt lifecycle `pending → confirmed | failed`.
//!
//! Receipts live in per-provider sidecar files under `anchors/`, not in the
//! index, so a rebuild never loses them. No core write path ever waits on a
//! backend; confirmation happens in a later, idempotent upgrade pass.

use crate::error::{ChainError, ChainResult};
use chrono::{DateTime, Utc};
use mnemo_canon::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ANCHORS_DIR: &str = "anchors";

/// What a submission anchors: a specific entry, or the chain head.
#[derive(Debug, Clone, Copy)]
pub struct AnchorTarget {
    pub seq: u64,
    pub chain_hash: Digest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Persisted record of one submission and its eventual outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub provider: String,
    pub seq: u64,
    pub chain_hash: Digest,
    pub status: ReceiptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// How many upgrade passes have asked the authority about this receipt.
    #[serde(default)]
    pub verify_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub tx_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub fee: f64,
    pub available: bool,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend timed out")]
    Timeout,
    #[error("backend failure: {0}")]
    Failure(String),
}

/// One anchoring backend. Implementations are synchronous request/response;
/// long-latency confirmation is modeled by returning `Pending` from `verify`
/// until the authority settles.
pub trait AnchorBackend: Send + Sync {
    fn provider(&self) -> &str;
    fn is_available(&self) -> bool;
    fn estimate_cost(&self, count: u64) -> CostEstimate;
    fn submit(&self, target: &AnchorTarget) -> Result<SubmitOutcome, BackendError>;
    fn verify(&self, receipt: &Receipt) -> Result<VerifyOutcome, BackendError>;
}

/// Registry of backends keyed by provider tag, plus the sidecar persistence.
pub struct AnchorRegistry {
    dir: PathBuf,
    backends: BTreeMap<String, Box<dyn AnchorBackend>>,
}

impl AnchorRegistry {
    pub fn open(chain_dir: &Path) -> ChainResult<Self> {
        let dir = chain_dir.join(ANCHORS_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            backends: BTreeMap::new(),
        })
    }

    /// Register a backend. Idempotent by provider tag; the newest
    /// registration wins.
    pub fn register(&mut self, backend: Box<dyn AnchorBackend>) {
        self.backends.insert(backend.provider().to_owned(), backend);
    }

    pub fn providers(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    /// Submit a target to one backend. A successful submission persists
    /// exactly one `pending` receipt before returning; a backend failure
    /// persists a `failed` receipt instead and still returns it, so anchor
    /// trouble never blocks the chain.
    pub fn submit(&self, provider: &str, target: &AnchorTarget) -> ChainResult<Receipt> {
        let backend = self.backend(provider)?;
        if !backend.is_available() {
            return Err(ChainError::BackendUnavailable {
                provider: provider.to_owned(),
                reason: "backend reports unavailable".into(),
            });
        }
        let now = Utc::now();
        let receipt = match backend.submit(target) {
            Ok(outcome) => Receipt {
                provider: provider.to_owned(),
                seq: target.seq,
                chain_hash: target.chain_hash,
                status: ReceiptStatus::Pending,
                tx_ref: outcome.tx_ref,
                block_number: None,
                submitted_at: now,
                confirmed_at: None,
                verify_attempts: 0,
                error: None,
            },
            Err(err) => Receipt {
                provider: provider.to_owned(),
                seq: target.seq,
                chain_hash: target.chain_hash,
                status: ReceiptStatus::Failed,
                tx_ref: None,
                block_number: None,
                submitted_at: now,
                confirmed_at: None,
                verify_attempts: 0,
                error: Some(err.to_string()),
            },
        };
        let mut receipts = self.load_receipts(provider)?;
        receipts.push(receipt.clone());
        self.save_receipts(provider, &receipts)?;
        log::debug!(
            "anchor submit provider={provider} seq={} status={:?}",
            target.seq,
            receipt.status
        );
        Ok(receipt)
    }

    /// Walk pending receipts for every registered backend and ask the
    /// authority to settle them. Terminal receipts are untouched, so running
    /// this twice is a no-op. Returns how many receipts reached a terminal
    /// state.
    pub fn upgrade_pass(&self) -> ChainResult<u64> {
        let mut settled = 0;
        for (provider, backend) in &self.backends {
            let mut receipts = self.load_receipts(provider)?;
            let mut changed = false;
            for receipt in receipts.iter_mut() {
                if receipt.status != ReceiptStatus::Pending {
                    continue;
                }
                receipt.verify_attempts += 1;
                changed = true;
                match backend.verify(receipt) {
                    Ok(outcome) => {
                        if outcome.status != ReceiptStatus::Pending {
                            receipt.status = outcome.status;
                            receipt.block_number = outcome.block_number;
                            receipt.confirmed_at = outcome.timestamp;
                            receipt.error = outcome.error;
                            settled += 1;
                        }
                    }
                    Err(err) => {
                        log::warn!(
                            "anchor verify provider={provider} seq={} failed: {err}",
                            receipt.seq
                        );
                    }
                }
            }
            if changed {
                self.save_receipts(provider, &receipts)?;
            }
        }
        Ok(settled)
    }

    /// All persisted receipts, optionally narrowed to one seq. Reads every
    /// sidecar on disk, including providers with no registered backend.
    pub fn status(&self, seq: Option<u64>) -> ChainResult<Vec<Receipt>> {
        let mut receipts = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            let loaded: Vec<Receipt> = serde_json::from_slice(&bytes).map_err(|e| {
                ChainError::Corrupt(format!("anchor sidecar {path:?} unreadable: {e}"))
            })?;
            receipts.extend(loaded);
        }
        if let Some(seq) = seq {
            receipts.retain(|r| r.seq == seq);
        }
        receipts.sort_by(|a, b| (a.seq, &a.provider).cmp(&(b.seq, &b.provider)));
        Ok(receipts)
    }

    pub fn estimate_cost(&self, provider: &str, count: u64) -> ChainResult<CostEstimate> {
        Ok(self.backend(provider)?.estimate_cost(count))
    }

    fn backend(&self, provider: &str) -> ChainResult<&dyn AnchorBackend> {
        self.backends
            .get(provider)
            .map(Box::as_ref)
            .ok_or_else(|| ChainError::BackendUnavailable {
                provider: provider.to_owned(),
                reason: "no such provider registered".into(),
            })
    }

    fn sidecar_path(&self, provider: &str) -> PathBuf {
        self.dir.join(format!("{provider}.json"))
    }

    fn load_receipts(&self, provider: &str) -> ChainResult<Vec<Receipt>> {
        let path = self.sidecar_path(provider);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ChainError::Corrupt(format!("anchor sidecar {path:?} unreadable: {e}")))
    }

    fn save_receipts(&self, provider: &str, receipts: &[Receipt]) -> ChainResult<()> {
        let path = self.sidecar_path(provider);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(receipts).map_err(|e| {
                ChainError::Corrupt(format!("receipt encoding failed: {e}"))
            })?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Deterministic backend: accepts every submission, reports `pending` until
/// a receipt has been through `confirm_after` upgrade passes, then confirms
/// with fixed block metadata. Stateless across processes (the attempt count
/// lives on the receipt), so it works for tests and local smoke runs alike,
/// under the provider tag `mock`.
pub struct MockBackend {
    confirm_after: u32,
    available: bool,
}

impl MockBackend {
    pub fn new(confirm_after: u32) -> Self {
        Self {
            confirm_after,
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            confirm_after: 1,
            available: false,
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(2)
    }
}

impl AnchorBackend for MockBackend {
    fn provider(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn estimate_cost(&self, count: u64) -> CostEstimate {
        CostEstimate {
            fee: 0.0001 * count as f64,
            available: self.available,
        }
    }

    fn submit(&self, target: &AnchorTarget) -> Result<SubmitOutcome, BackendError> {
        if !self.available {
            return Err(BackendError::Unavailable("mock backend offline".into()));
        }
        Ok(SubmitOutcome {
            tx_ref: Some(format!("mock:{}:{}", target.seq, target.chain_hash)),
        })
    }

    fn verify(&self, receipt: &Receipt) -> Result<VerifyOutcome, BackendError> {
        if receipt.verify_attempts >= self.confirm_after {
            Ok(VerifyOutcome {
                status: ReceiptStatus::Confirmed,
                block_number: Some(42),
                timestamp: Some(Utc::now()),
                error: None,
            })
        } else {
            Ok(VerifyOutcome {
                status: ReceiptStatus::Pending,
                block_number: None,
                timestamp: None,
                error: None,
            })
        }
    }
}

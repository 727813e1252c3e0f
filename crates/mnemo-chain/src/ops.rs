//! Memory operations: the public write/read surface over journal, store,
//! index, and anchors. This module is the only writer of the journal.

use crate::anchor::{AnchorRegistry, AnchorTarget, Receipt};
use crate::config::ChainConfig;
use crate::entry::{
    BlockLabel, Entry, EntryKind, Links, Provenance, ProvenanceSource, RedactionNote, Tier,
    UnsignedEntry,
};
use crate::error::{ChainError, ChainResult};
use crate::index::{Index, IndexStats, INDEX_FILE};
use crate::journal::{FsJournal, WriterLock, HEAD_FILE, Head};
use crate::keys::{KEY_FILE, PUB_FILE, WriterKey};
use crate::verify::{self, VerifyReport};
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use mnemo_canon::{Digest, normalize_text};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Rough token estimate used for recall budgets: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

pub struct CommitRequest {
    pub content: String,
    pub entry_kind: EntryKind,
    pub tier: Tier,
    pub provenance: Provenance,
    pub links: Links,
    /// Writer-chosen timestamp; defaults to now.
    pub created_at: Option<DateTime<Utc>>,
}

impl CommitRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            entry_kind: EntryKind::Memory,
            tier: Tier::Ephemeral,
            provenance: Provenance::manual(0.5),
            links: Links::default(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReceipt {
    pub seq: u64,
    pub content_hash: Digest,
}

#[derive(Debug, Clone, Default)]
pub struct RecallRequest {
    pub query: String,
    pub max_tokens: Option<usize>,
    pub max_results: Option<usize>,
    pub tiers: Option<Vec<Tier>>,
    pub include_superseded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallHit {
    pub seq: u64,
    pub content: String,
    pub score: f64,
}

pub struct RethinkRequest {
    pub supersedes: Vec<u64>,
    pub new_understanding: String,
    pub reason: Option<String>,
    pub importance: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RethinkOutcome {
    pub consolidation_seq: u64,
    pub superseded_count: u64,
}

pub struct BlockUpdateRequest {
    pub label: BlockLabel,
    pub content: String,
    pub is_core: bool,
    pub importance: f64,
    pub created_at: Option<DateTime<Utc>>,
}

impl BlockUpdateRequest {
    pub fn new(label: BlockLabel, content: impl Into<String>) -> Self {
        Self {
            label,
            content: content.into(),
            is_core: true,
            importance: 1.0,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockUpdateOutcome {
    pub seq: u64,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedactOutcome {
    pub redaction_seq: u64,
    pub redacted_seq: u64,
}

/// Read-only composite view of one entry. Performs no touches.
#[derive(Debug, Clone, Serialize)]
pub struct Introspection {
    pub entry: Entry,
    pub source: ProvenanceSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<Vec<u64>>,
    pub anchor_receipts: Vec<Receipt>,
}

#[derive(Debug, Serialize)]
pub struct ChainStats {
    pub head_seq: Option<u64>,
    #[serde(flatten)]
    pub index: IndexStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    #[serde(flatten)]
    pub entry: Entry,
    pub content: String,
}

/// One open chain: journal + content store + index + anchor registry, bound
/// to the single writer key.
pub struct Chain {
    dir: PathBuf,
    config: ChainConfig,
    key: WriterKey,
    journal: FsJournal,
    store: mnemo_store::FsStore,
    index: Index,
    anchors: AnchorRegistry,
}

impl Chain {
    /// Create the chain directory and generate the writer keypair if absent.
    pub fn init(dir: &Path, key_path: Option<&Path>) -> ChainResult<()> {
        fs::create_dir_all(dir)?;
        let key_path = key_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.join(KEY_FILE));
        if !key_path.exists() {
            let key = WriterKey::generate()?;
            key.save(&key_path, &dir.join(PUB_FILE))?;
            log::info!("generated writer keypair at {key_path:?}");
        }
        Ok(())
    }

    pub fn open(dir: impl AsRef<Path>, config: ChainConfig) -> ChainResult<Self> {
        let dir = dir.as_ref();
        let key_path = dir.join(KEY_FILE);
        Self::open_with_key(dir, &key_path, config)
    }

    pub fn open_with_key(
        dir: impl AsRef<Path>,
        key_path: &Path,
        config: ChainConfig,
    ) -> ChainResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !key_path.exists() {
            return Err(ChainError::InvalidInput(format!(
                "no writer key at {key_path:?}; run `init` first"
            )));
        }
        let key = WriterKey::load(key_path)?;
        let store = mnemo_store::FsStore::open(&dir)?;
        let journal = FsJournal::open(&dir)?;
        let index = Index::open(&dir.join(INDEX_FILE))?;
        let anchors = AnchorRegistry::open(&dir)?;
        let mut chain = Self {
            dir,
            config,
            key,
            journal,
            store,
            index,
            anchors,
        };
        chain.forward_roll()?;
        Ok(chain)
    }

    /// Apply journal entries the index has not seen yet. Bounded by the
    /// journal tail; runs on every open so a crash between journal fsync and
    /// index commit heals here.
    fn forward_roll(&mut self) -> ChainResult<()> {
        let from = match self.index.applied_head()? {
            Some(applied) => applied + 1,
            None => 0,
        };
        let pending = self.journal.next_seq().saturating_sub(from);
        if pending > 0 {
            log::info!("forward-rolling {pending} journal entries into the index");
        }
        for seq in from..self.journal.next_seq() {
            let entry = self
                .journal
                .read(seq)
                .expect("scanned journal entries are dense")
                .clone();
            self.index.apply(&entry, &self.store)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn head(&self) -> Option<Head> {
        self.journal.head()
    }

    // ── Write paths ────────────────────────────────────────────────────────

    pub fn commit(&mut self, request: CommitRequest) -> ChainResult<CommitReceipt> {
        match request.entry_kind {
            EntryKind::Memory | EntryKind::Identity | EntryKind::Decision => {}
            other => {
                return Err(ChainError::InvalidInput(format!(
                    "entry kind '{other}' has a dedicated operation; commit accepts \
                     memory, identity, and decision entries"
                )));
            }
        }
        let entry = self.append_signed(
            request.entry_kind,
            request.tier,
            &request.content,
            request.provenance,
            request.links,
            request.created_at,
        )?;
        Ok(CommitReceipt {
            seq: entry.seq,
            content_hash: entry.content_hash,
        })
    }

    pub fn recall(&mut self, request: RecallRequest) -> ChainResult<Vec<RecallHit>> {
        let now = Utc::now();
        let rows = self
            .index
            .candidates(request.tiers.as_deref(), request.include_superseded)?;
        let query = request.query.trim();

        let mut scored: Vec<RecallHit> = Vec::new();
        for row in rows {
            let bytes = self.store.get(&row.content_hash)?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let lex = if query.is_empty() {
                0.0
            } else {
                let lex = self.config.lexical_score(query, &content);
                if lex <= 0.0 {
                    continue;
                }
                lex
            };
            let recency = (-row.age_days(now) / self.config.recall_half_life_days).exp();
            let access = row.access_count as f64 / (1.0 + row.access_count as f64);
            let score = 0.30 * recency + 0.40 * access + 0.30 * row.importance + lex;
            scored.push(RecallHit {
                seq: row.seq,
                content,
                score,
            });
        }
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.seq.cmp(&a.seq))
        });

        let budget = request.max_tokens.unwrap_or(self.config.max_tokens_default);
        let mut spent = 0usize;
        let mut hits = Vec::new();
        for hit in scored {
            let cost = estimate_tokens(&hit.content);
            if spent + cost > budget {
                break;
            }
            spent += cost;
            hits.push(hit);
            if request.max_results.is_some_and(|max| hits.len() >= max) {
                break;
            }
        }

        for hit in &hits {
            self.index.touch(hit.seq, now)?;
        }
        Ok(hits)
    }

    pub fn rethink(&mut self, request: RethinkRequest) -> ChainResult<RethinkOutcome> {
        if request.supersedes.is_empty() {
            return Err(ChainError::InvalidInput(
                "rethink requires at least one superseded seq".into(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        let next_seq = self.journal.next_seq();
        for &target in &request.supersedes {
            if !seen.insert(target) {
                return Err(ChainError::InvalidInput(format!(
                    "seq {target} listed twice in supersedes"
                )));
            }
            match self.journal.read(target) {
                Some(entry) => {
                    if entry.entry_kind == EntryKind::Redaction {
                        return Err(ChainError::InvalidInput(format!(
                            "seq {target} is a redaction entry and cannot be superseded"
                        )));
                    }
                }
                // The one reachable cycle: a consolidation naming the seq it
                // will itself occupy.
                None if target == next_seq => {
                    return Err(ChainError::CyclicSupersede(format!(
                        "seq {target} would be the consolidation entry itself"
                    )));
                }
                None => return Err(ChainError::UnknownSeq(target)),
            }
        }

        let provenance = Provenance {
            source: ProvenanceSource::Consolidation,
            trigger: request.reason,
            importance: request.importance.unwrap_or(0.5),
            emotion_tag: None,
        };
        let links = Links {
            supersedes: Some(request.supersedes.clone()),
            ..Links::default()
        };
        let entry = self.append_signed(
            EntryKind::Consolidation,
            Tier::Committed,
            &request.new_understanding,
            provenance,
            links,
            request.created_at,
        )?;
        Ok(RethinkOutcome {
            consolidation_seq: entry.seq,
            superseded_count: request.supersedes.len() as u64,
        })
    }

    pub fn block_update(&mut self, request: BlockUpdateRequest) -> ChainResult<BlockUpdateOutcome> {
        let prev_seq = self.index.block_latest(request.label)?;
        let version = match prev_seq {
            Some(prev) => {
                let prev_entry = self
                    .journal
                    .read(prev)
                    .ok_or(ChainError::UnknownSeq(prev))?;
                prev_entry.links.block_version.unwrap_or(0) + 1
            }
            None => 1,
        };
        let links = Links {
            block_label: Some(request.label),
            block_version: Some(version),
            prev_block_seq: prev_seq,
            is_core: request.is_core,
            ..Links::default()
        };
        let entry = self.append_signed(
            EntryKind::Block,
            Tier::Committed,
            &request.content,
            Provenance::manual(request.importance),
            links,
            request.created_at,
        )?;
        Ok(BlockUpdateOutcome {
            seq: entry.seq,
            version,
        })
    }

    /// Append a `redaction` entry naming `target` and destroy the target's
    /// payload. The target's signed header stays on the chain and keeps
    /// verifying.
    pub fn redact(&mut self, target: u64, reason: Option<String>) -> ChainResult<RedactOutcome> {
        let target_entry = self
            .journal
            .read(target)
            .ok_or(ChainError::UnknownSeq(target))?;
        if target_entry.entry_kind == EntryKind::Redaction {
            return Err(ChainError::InvalidInput(format!(
                "seq {target} is itself a redaction entry"
            )));
        }
        let target_hash = target_entry.content_hash;
        if let Some(row) = self.index.get(target)? {
            if row.redacted {
                return Err(ChainError::Conflict(format!("seq {target} already redacted")));
            }
        }

        let note = RedactionNote {
            redacts: target,
            reason,
        };
        let payload = serde_json::to_string(&note)
            .map_err(|e| ChainError::Corrupt(format!("redaction note encoding failed: {e}")))?;
        let entry = self.append_signed(
            EntryKind::Redaction,
            Tier::Committed,
            &payload,
            Provenance::manual(0.0),
            Links::default(),
            None,
        )?;
        self.store.redact(&target_hash)?;
        Ok(RedactOutcome {
            redaction_seq: entry.seq,
            redacted_seq: target,
        })
    }

    // ── Read paths ─────────────────────────────────────────────────────────

    pub fn introspect(&self, seq: u64) -> ChainResult<Introspection> {
        let entry = self
            .journal
            .read(seq)
            .ok_or(ChainError::UnknownSeq(seq))?
            .clone();
        let row = self.index.get(seq)?;
        let supersedes = self.index.consolidation_targets(seq)?;
        Ok(Introspection {
            source: entry.provenance.source,
            trigger: entry.provenance.trigger.clone(),
            superseded_by: row.and_then(|r| r.superseded_by),
            supersedes: (!supersedes.is_empty()).then_some(supersedes),
            anchor_receipts: self.anchors.status(Some(seq))?,
            entry,
        })
    }

    pub fn stats(&self) -> ChainResult<ChainStats> {
        Ok(ChainStats {
            head_seq: self.journal.head().map(|h| h.seq),
            index: self.index.stats(Utc::now(), &self.config)?,
        })
    }

    pub fn export(&self) -> ChainResult<Vec<ExportRecord>> {
        self.journal
            .entries()
            .iter()
            .map(|entry| {
                let bytes = self.store.get(&entry.content_hash)?;
                Ok(ExportRecord {
                    entry: entry.clone(),
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                })
            })
            .collect()
    }

    /// Seq of the newest non-superseded block under `label`, if any.
    pub fn block_latest(&self, label: BlockLabel) -> ChainResult<Option<u64>> {
        self.index.block_latest(label)
    }

    pub fn core_memories(&self) -> ChainResult<Vec<u64>> {
        Ok(self
            .index
            .core_memories()?
            .into_iter()
            .map(|row| row.seq)
            .collect())
    }

    // ── Verification & rebuild ─────────────────────────────────────────────

    pub fn verify(&self) -> ChainResult<VerifyReport> {
        verify::verify_chain(&self.dir, &self.key.verifying_key(), &self.store)
    }

    pub fn rebuild(&mut self) -> ChainResult<()> {
        verify::rebuild_index(
            &self.journal,
            &self.store,
            &mut self.index,
            &self.key.verifying_key(),
        )
    }

    // ── Anchoring ──────────────────────────────────────────────────────────

    pub fn register_anchor_backend(&mut self, backend: Box<dyn crate::anchor::AnchorBackend>) {
        self.anchors.register(backend);
    }

    /// Submit an entry (or the current head when `seq` is `None`) to one
    /// anchoring backend.
    pub fn anchor(&mut self, provider: &str, seq: Option<u64>) -> ChainResult<Receipt> {
        let target = match seq {
            Some(seq) => {
                let entry = self.journal.read(seq).ok_or(ChainError::UnknownSeq(seq))?;
                AnchorTarget {
                    seq,
                    chain_hash: entry.digest()?,
                }
            }
            None => {
                let head = self.journal.head().ok_or_else(|| {
                    ChainError::InvalidInput("cannot anchor an empty chain".into())
                })?;
                AnchorTarget {
                    seq: head.seq,
                    chain_hash: head.hash,
                }
            }
        };
        self.anchors.submit(provider, &target)
    }

    pub fn anchor_status(&self, seq: Option<u64>) -> ChainResult<Vec<Receipt>> {
        self.anchors.status(seq)
    }

    /// Ask one backend what anchoring `count` targets would cost, without
    /// submitting anything.
    pub fn estimate_anchor_cost(
        &self,
        provider: &str,
        count: u64,
    ) -> ChainResult<crate::anchor::CostEstimate> {
        self.anchors.estimate_cost(provider, count)
    }

    pub fn upgrade_anchors(&self) -> ChainResult<u64> {
        self.anchors.upgrade_pass()
    }

    // ── Internal write path ────────────────────────────────────────────────

    /// Shared tail of every write path: lock, head check, normalize, sign,
    /// blob write, journal append (the durability point), index projection.
    fn append_signed(
        &mut self,
        entry_kind: EntryKind,
        tier: Tier,
        content: &str,
        provenance: Provenance,
        links: Links,
        created_at: Option<DateTime<Utc>>,
    ) -> ChainResult<Entry> {
        let _lock = WriterLock::acquire(&self.dir)?;
        self.check_head_file()?;

        let normalized = normalize_text(content);
        if normalized.trim().is_empty() {
            return Err(ChainError::InvalidInput("content is empty".into()));
        }
        let content_hash = Digest::of_bytes(normalized.as_bytes());
        let unsigned = UnsignedEntry {
            seq: self.journal.next_seq(),
            prev_hash: self.journal.next_prev_hash(),
            content_hash,
            entry_kind,
            tier,
            created_at: created_at.unwrap_or_else(Utc::now),
            provenance,
            links,
        };
        let signature = self.key.sign(&unsigned.signing_bytes()?);
        let entry = unsigned.into_signed(signature);
        entry
            .validate_shape()
            .map_err(ChainError::InvalidInput)?;

        self.store.put(&normalized)?;
        self.journal.append(entry.clone())?;

        // Past the durability point: an index failure here leaves the entry
        // committed, and the next open forward-rolls it.
        if let Err(err) = self.index.apply(&entry, &self.store) {
            log::warn!(
                "index update for seq {} failed ({err}); will forward-roll on next open",
                entry.seq
            );
        }
        Ok(entry)
    }

    /// Guard against another process having advanced the chain since we
    /// loaded it: with the lock held, the durable head must match ours.
    fn check_head_file(&self) -> ChainResult<()> {
        let head_path = self.dir.join(HEAD_FILE);
        let on_disk: Option<Head> = fs::read(&head_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());
        if on_disk != self.journal.head() {
            return Err(ChainError::Corrupt(
                "head mismatch: chain advanced outside this handle".into(),
            ));
        }
        Ok(())
    }
}

//! Full-chain verification and index reconstruction.
//!
//! The journal is the sole source of truth; anything here can be recomputed
//! from it. Verification works on the raw `chain.jsonl` bytes so tampering
//! is caught exactly where it happened, without the recovery path of
//! `FsJournal::open` getting a chance to touch the file.

use crate::entry::{Entry, EntryKind, RedactionNote};
use crate::error::{ChainError, ChainResult};
use crate::index::Index;
use crate::journal::{CHAIN_FILE, FsJournal};
use ed25519_dalek::VerifyingKey;
use mnemo_canon::Digest;
use mnemo_store::{FsStore, REDACTION_SENTINEL};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VerifyFailure {
    pub seq: u64,
    pub invariant: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub ok: bool,
    pub entries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<VerifyFailure>,
    /// Failing entries after the first; the scan keeps going only to count.
    pub anomalies: u64,
}

/// Verify a chain directory using only its published public key
/// (`agent.pub`). Needs no writer key and takes no lock, so auditors without
/// the signing half can run it.
pub fn verify_chain_dir(dir: &Path) -> ChainResult<VerifyReport> {
    let pub_path = dir.join(crate::keys::PUB_FILE);
    if !pub_path.exists() {
        return Err(ChainError::InvalidInput(format!(
            "no public key at {pub_path:?}; run `init` first"
        )));
    }
    let public = crate::keys::load_verifying_key(&pub_path)?;
    let store = FsStore::open(dir)?;
    verify_chain(dir, &public, &store)
}

/// Walk the journal from 0 to head checking framing, linkage, signatures,
/// blob digests, supersede references, and block lineage. Reports the first
/// failure and the count of further failing entries.
pub fn verify_chain(
    dir: &Path,
    public: &VerifyingKey,
    store: &FsStore,
) -> ChainResult<VerifyReport> {
    let path = dir.join(CHAIN_FILE);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(err.into()),
    };
    // Lossy conversion keeps the scan total: a bit flip that breaks UTF-8
    // shows up as a framing failure at its seq rather than an I/O error.
    let text = String::from_utf8_lossy(&raw);
    let lines: Vec<&str> = text.lines().filter(|line| !line.is_empty()).collect();
    let parsed: Vec<Option<Entry>> = lines
        .iter()
        .map(|line| Entry::decode_line(line).ok())
        .collect();
    let redacted = redaction_targets(&parsed, store);

    let mut failures: Vec<VerifyFailure> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let seq = i as u64;
        if let Some(invariant) = check_entry(seq, line, &parsed, &lines, public, store, &redacted) {
            failures.push(VerifyFailure { seq, invariant });
        }
    }

    Ok(VerifyReport {
        ok: failures.is_empty(),
        entries: lines.len() as u64,
        failure: failures.first().copied(),
        anomalies: failures.len().saturating_sub(1) as u64,
    })
}

/// First violated invariant of one entry, or `None` when it is sound.
fn check_entry(
    seq: u64,
    line: &str,
    parsed: &[Option<Entry>],
    lines: &[&str],
    public: &VerifyingKey,
    store: &FsStore,
    redacted: &BTreeSet<u64>,
) -> Option<&'static str> {
    let i = seq as usize;
    let Some(entry) = &parsed[i] else {
        return Some("framing");
    };
    let framed = entry
        .canonical_line()
        .map(|canonical| canonical == line.as_bytes())
        .unwrap_or(false);
    if !framed {
        return Some("framing");
    }
    if entry.seq != seq {
        return Some("seq");
    }

    let expected_prev = if i == 0 {
        Digest::ZERO
    } else {
        Digest::of_bytes(lines[i - 1].as_bytes())
    };
    if entry.prev_hash != expected_prev {
        return Some("prev_hash");
    }
    if !entry.verify_signature(public) {
        return Some("signature");
    }
    if entry.payload_ref != entry.content_hash {
        return Some("content_hash");
    }
    match store.get(&entry.content_hash) {
        Ok(bytes) => {
            if bytes == REDACTION_SENTINEL
                && Digest::of_bytes(REDACTION_SENTINEL) != entry.content_hash
                && !redacted.contains(&seq)
            {
                return Some("content_hash");
            }
        }
        Err(_) => return Some("content_hash"),
    }
    if entry.validate_shape().is_err() {
        return Some("links");
    }

    if let Some(targets) = &entry.links.supersedes {
        for &target in targets {
            if target >= seq || parsed.get(target as usize).is_none_or(Option::is_none) {
                return Some("supersedes");
            }
        }
    }

    if entry.entry_kind == EntryKind::Block {
        let version = entry.links.block_version.unwrap_or(0);
        match entry.links.prev_block_seq {
            None => {
                if version != 1 {
                    return Some("block_link");
                }
            }
            Some(prev) => {
                if prev >= seq {
                    return Some("block_link");
                }
                let Some(Some(prev_entry)) = parsed.get(prev as usize) else {
                    return Some("block_link");
                };
                let lineage_ok = prev_entry.entry_kind == EntryKind::Block
                    && prev_entry.links.block_label == entry.links.block_label
                    && prev_entry.links.block_version.map(|v| v + 1) == Some(version);
                if !lineage_ok {
                    return Some("block_link");
                }
            }
        }
    }
    None
}

/// Seqs whose blobs are legitimately sentinels because a later redaction
/// entry names them.
fn redaction_targets(parsed: &[Option<Entry>], store: &FsStore) -> BTreeSet<u64> {
    let mut targets = BTreeSet::new();
    for entry in parsed.iter().flatten() {
        if entry.entry_kind != EntryKind::Redaction {
            continue;
        }
        let Ok(bytes) = store.get(&entry.content_hash) else {
            continue;
        };
        if let Ok(note) = serde_json::from_slice::<RedactionNote>(&bytes) {
            targets.insert(note.redacts);
        }
    }
    targets
}

/// Drop and repopulate the index from the journal, verifying linkage and
/// signatures on the way. Anchor receipts live in sidecar files and are
/// untouched.
pub fn rebuild_index(
    journal: &FsJournal,
    store: &FsStore,
    index: &mut Index,
    public: &VerifyingKey,
) -> ChainResult<()> {
    let redacted: BTreeSet<u64> = {
        let parsed: Vec<Option<Entry>> =
            journal.entries().iter().map(|e| Some(e.clone())).collect();
        redaction_targets(&parsed, store)
    };

    index.clear()?;
    let mut prev_hash = Digest::ZERO;
    for entry in journal.entries() {
        if entry.prev_hash != prev_hash {
            return Err(ChainError::VerifyFailed {
                seq: entry.seq,
                invariant: "prev_hash",
            });
        }
        if !entry.verify_signature(public) {
            return Err(ChainError::VerifyFailed {
                seq: entry.seq,
                invariant: "signature",
            });
        }
        match store.get(&entry.content_hash) {
            Ok(bytes) => {
                if bytes == REDACTION_SENTINEL
                    && Digest::of_bytes(REDACTION_SENTINEL) != entry.content_hash
                    && !redacted.contains(&entry.seq)
                {
                    return Err(ChainError::VerifyFailed {
                        seq: entry.seq,
                        invariant: "content_hash",
                    });
                }
            }
            Err(_) => {
                return Err(ChainError::VerifyFailed {
                    seq: entry.seq,
                    invariant: "content_hash",
                });
            }
        }
        index.apply(entry, store)?;
        prev_hash = entry.digest()?;
    }
    log::info!("rebuilt index from {} journal entries", journal.entries().len());
    Ok(())
}

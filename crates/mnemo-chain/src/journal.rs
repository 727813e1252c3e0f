//! Append-only signed journal: `chain.jsonl`, the `head` pointer, and the
//! advisory writer lock.
//!
//! Readers rely on the append-then-fsync-then-publish-head discipline: a
//! reader that observes a given head observes every prior entry fully. The
//! open scan recovers from a crashed append by truncating a torn final line;
//! complete lines are never dropped here (tampering is the verifier's call
//! to report, not ours to erase).

use crate::entry::Entry;
use crate::error::{ChainError, ChainResult};
use fs2::FileExt;
use mnemo_canon::Digest;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHAIN_FILE: &str = "chain.jsonl";
pub const HEAD_FILE: &str = "head";
pub const LOCK_FILE: &str = "chain.lock";

/// Durable pointer to the current tail: `{seq, hash}` of the last entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub seq: u64,
    pub hash: Digest,
}

/// Exclusive advisory lock on `chain.lock`, held for the duration of a write
/// path. Released on drop.
pub struct WriterLock {
    file: File,
}

impl WriterLock {
    pub fn acquire(dir: &Path) -> ChainResult<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file }),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                Err(ChainError::WriteLocked)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Filesystem journal: one canonical JSON entry per line.
#[derive(Debug)]
pub struct FsJournal {
    dir: PathBuf,
    path: PathBuf,
    entries: Vec<Entry>,
    head_digest: Option<Digest>,
}

impl FsJournal {
    /// Open the journal, scanning every line. A torn final line (partial
    /// append) is truncated away; a malformed line with entries after it is
    /// corruption and refuses to open. A stale `head` file is rewritten from
    /// the scan.
    pub fn open(dir: impl AsRef<Path>) -> ChainResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let path = dir.join(CHAIN_FILE);
        if !path.exists() {
            File::create(&path)?;
        }

        let raw = fs::read(&path)?;
        let text = String::from_utf8_lossy(&raw);
        let mut entries: Vec<Entry> = Vec::new();
        let mut valid_bytes: u64 = 0;
        let mut torn_at: Option<u64> = None;

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_end_matches('\n');
            if trimmed.is_empty() {
                valid_bytes += line.len() as u64;
                continue;
            }
            let parsed = Entry::decode_line(trimmed)
                .ok()
                .filter(|entry| frame_matches(entry, trimmed))
                .filter(|entry| entry.seq == entries.len() as u64);
            match parsed {
                Some(entry) => {
                    entries.push(entry);
                    valid_bytes += line.len() as u64;
                }
                None => {
                    torn_at = Some(valid_bytes);
                    break;
                }
            }
        }

        if let Some(offset) = torn_at {
            let tail = &raw[offset as usize..];
            if tail.iter().filter(|b| **b == b'\n').count() > if tail.ends_with(b"\n") { 1 } else { 0 } {
                return Err(ChainError::Corrupt(format!(
                    "malformed journal line at seq {} with entries after it",
                    entries.len()
                )));
            }
            log::warn!(
                "truncating torn journal tail at byte {offset} (seq {})",
                entries.len()
            );
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(offset)?;
            file.sync_all()?;
        } else if !raw.is_empty() && !raw.ends_with(b"\n") {
            // A crash can drop just the line terminator; restore it so the
            // next append starts on a fresh line.
            let mut file = OpenOptions::new().append(true).open(&path)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }

        let head_digest = match entries.last() {
            Some(entry) => Some(entry.digest()?),
            None => None,
        };
        let mut journal = Self {
            dir,
            path,
            entries,
            head_digest,
        };
        journal.reconcile_head_file()?;
        Ok(journal)
    }

    /// Next sequence an append will be assigned.
    pub fn next_seq(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Digest the next entry must carry as `prev_hash`.
    pub fn next_prev_hash(&self) -> Digest {
        self.head_digest.unwrap_or(Digest::ZERO)
    }

    pub fn head(&self) -> Option<Head> {
        let hash = self.head_digest?;
        Some(Head {
            seq: self.entries.len() as u64 - 1,
            hash,
        })
    }

    pub fn read(&self, seq: u64) -> Option<&Entry> {
        self.entries.get(seq as usize)
    }

    pub fn scan(&self, from: u64, to: u64) -> &[Entry] {
        let end = (to.saturating_add(1)).min(self.entries.len() as u64) as usize;
        let start = (from as usize).min(end);
        &self.entries[start..end]
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a fully-signed entry: write the line, fsync, then publish the
    /// head pointer. The caller holds the writer lock.
    pub fn append(&mut self, entry: Entry) -> ChainResult<()> {
        if entry.seq != self.next_seq() {
            return Err(ChainError::Corrupt(format!(
                "head mismatch: appending seq {} onto tail {}",
                entry.seq,
                self.next_seq()
            )));
        }
        if entry.prev_hash != self.next_prev_hash() {
            return Err(ChainError::Corrupt(format!(
                "head mismatch: prev_hash does not match tail at seq {}",
                entry.seq
            )));
        }
        let mut line = entry.canonical_line()?;
        line.push(b'\n');

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&line)?;
        file.sync_all()?;

        self.head_digest = Some(entry.digest()?);
        self.entries.push(entry);
        self.publish_head()
    }

    fn publish_head(&self) -> ChainResult<()> {
        let head = self
            .head()
            .expect("publish_head is only called after an append");
        let tmp = self.dir.join(format!("{HEAD_FILE}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(&head).map_err(|e| {
                ChainError::Corrupt(format!("head encoding failed: {e}"))
            })?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(HEAD_FILE))?;
        Ok(())
    }

    /// Rewrite the head file if it disagrees with the scanned tail, which
    /// happens when a crash lands between the journal fsync and the head
    /// publish.
    fn reconcile_head_file(&mut self) -> ChainResult<()> {
        let head_path = self.dir.join(HEAD_FILE);
        let on_disk: Option<Head> = fs::read(&head_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());
        match (self.head(), on_disk) {
            (Some(actual), Some(stored)) if actual == stored => Ok(()),
            (None, None) => Ok(()),
            (Some(actual), stored) => {
                if stored.is_some() {
                    log::warn!(
                        "head pointer out of date (stored {stored:?}); rewriting to seq {}",
                        actual.seq
                    );
                }
                self.publish_head()
            }
            (None, Some(_)) => {
                fs::remove_file(&head_path)?;
                Ok(())
            }
        }
    }
}

fn frame_matches(entry: &Entry, raw: &str) -> bool {
    entry
        .canonical_line()
        .map(|canonical| canonical == raw.as_bytes())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryKind, Links, Provenance, Tier, UnsignedEntry};
    use crate::keys::WriterKey;
    use tempfile::TempDir;

    fn signed(key: &WriterKey, seq: u64, prev: Digest, text: &str) -> Entry {
        let unsigned = UnsignedEntry {
            seq,
            prev_hash: prev,
            content_hash: Digest::of_bytes(text.as_bytes()),
            entry_kind: EntryKind::Memory,
            tier: Tier::Ephemeral,
            created_at: "2026-02-02T00:00:00Z".parse().unwrap(),
            provenance: Provenance::manual(0.5),
            links: Links::default(),
        };
        let sig = key.sign(&unsigned.signing_bytes().unwrap());
        unsigned.into_signed(sig)
    }

    fn append_n(journal: &mut FsJournal, key: &WriterKey, n: usize) {
        for i in 0..n {
            let entry = signed(
                key,
                journal.next_seq(),
                journal.next_prev_hash(),
                &format!("entry {i}"),
            );
            journal.append(entry).unwrap();
        }
    }

    #[test]
    fn appends_and_recovers_entries() {
        let tmp = TempDir::new().unwrap();
        let key = WriterKey::generate().unwrap();
        {
            let mut journal = FsJournal::open(tmp.path()).unwrap();
            assert_eq!(journal.next_seq(), 0);
            assert_eq!(journal.next_prev_hash(), Digest::ZERO);
            append_n(&mut journal, &key, 3);
        }

        let journal = FsJournal::open(tmp.path()).unwrap();
        assert_eq!(journal.next_seq(), 3);
        assert_eq!(journal.read(1).unwrap().seq, 1);
        assert_eq!(
            journal.head().unwrap().hash,
            journal.read(2).unwrap().digest().unwrap()
        );
        assert_eq!(journal.scan(1, 2).len(), 2);
    }

    #[test]
    fn truncates_torn_tail() {
        let tmp = TempDir::new().unwrap();
        let key = WriterKey::generate().unwrap();
        {
            let mut journal = FsJournal::open(tmp.path()).unwrap();
            append_n(&mut journal, &key, 2);
        }
        let path = tmp.path().join(CHAIN_FILE);
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 10).unwrap();

        let journal = FsJournal::open(tmp.path()).unwrap();
        assert_eq!(journal.next_seq(), 1);
        // The truncated file reopens cleanly.
        let again = FsJournal::open(tmp.path()).unwrap();
        assert_eq!(again.next_seq(), 1);
    }

    #[test]
    fn refuses_malformed_line_mid_journal() {
        let tmp = TempDir::new().unwrap();
        let key = WriterKey::generate().unwrap();
        {
            let mut journal = FsJournal::open(tmp.path()).unwrap();
            append_n(&mut journal, &key, 3);
        }
        let path = tmp.path().join(CHAIN_FILE);
        let text = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = text.lines().map(str::to_owned).collect();
        lines[1] = "{not json".into();
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        assert!(matches!(
            FsJournal::open(tmp.path()),
            Err(ChainError::Corrupt(_))
        ));
    }

    #[test]
    fn stale_head_file_is_rewritten() {
        let tmp = TempDir::new().unwrap();
        let key = WriterKey::generate().unwrap();
        {
            let mut journal = FsJournal::open(tmp.path()).unwrap();
            append_n(&mut journal, &key, 2);
        }
        // Simulate a crash between append fsync and head publish.
        let stale = Head {
            seq: 0,
            hash: Digest::ZERO,
        };
        fs::write(
            tmp.path().join(HEAD_FILE),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let journal = FsJournal::open(tmp.path()).unwrap();
        assert_eq!(journal.head().unwrap().seq, 1);
        let published: Head =
            serde_json::from_slice(&fs::read(tmp.path().join(HEAD_FILE)).unwrap()).unwrap();
        assert_eq!(published.seq, 1);
    }

    #[test]
    fn writer_lock_is_exclusive() {
        let tmp = TempDir::new().unwrap();
        let lock = WriterLock::acquire(tmp.path()).unwrap();
        assert!(matches!(
            WriterLock::acquire(tmp.path()),
            Err(ChainError::WriteLocked)
        ));
        drop(lock);
        WriterLock::acquire(tmp.path()).unwrap();
    }
}

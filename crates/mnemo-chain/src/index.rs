//! Derived, rebuildable projection of the journal in SQLite.
//!
//! The journal is the sole source of truth; every row here can be
//! reconstructed by replaying it. Rows are mutated only by recall touches,
//! consolidation, block updates, and redaction flags.

use crate::config::ChainConfig;
use crate::entry::{BlockLabel, Entry, EntryKind, RedactionNote, Tier};
use crate::error::ChainResult;
use chrono::{DateTime, Utc};
use mnemo_canon::Digest;
use mnemo_store::FsStore;
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use serde::Serialize;
use std::path::Path;

pub const INDEX_FILE: &str = "memory.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    seq            INTEGER PRIMARY KEY,
    kind           TEXT NOT NULL,
    tier           TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    importance     REAL NOT NULL,
    is_core        INTEGER NOT NULL DEFAULT 0,
    block_label    TEXT,
    block_version  INTEGER,
    content_hash   TEXT NOT NULL,
    is_superseded  INTEGER NOT NULL DEFAULT 0,
    superseded_by  INTEGER,
    redacted       INTEGER NOT NULL DEFAULT 0,
    access_count   INTEGER NOT NULL DEFAULT 0,
    last_accessed  TEXT
);
CREATE TABLE IF NOT EXISTS consolidations (
    consolidation_seq INTEGER NOT NULL,
    superseded_seq    INTEGER NOT NULL,
    PRIMARY KEY (consolidation_seq, superseded_seq)
);
CREATE TABLE IF NOT EXISTS block_latest (
    label TEXT PRIMARY KEY,
    seq   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_kind ON entries (kind);
CREATE INDEX IF NOT EXISTS idx_entries_superseded ON entries (is_superseded);
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayTier {
    Hot,
    Warm,
    Cold,
}

impl DecayTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayTier::Hot => "hot",
            DecayTier::Warm => "warm",
            DecayTier::Cold => "cold",
        }
    }
}

/// Projected columns for one entry.
#[derive(Debug, Clone)]
pub struct IndexRow {
    pub seq: u64,
    pub kind: EntryKind,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub importance: f64,
    pub is_core: bool,
    pub block_label: Option<BlockLabel>,
    pub block_version: Option<u64>,
    pub content_hash: Digest,
    pub is_superseded: bool,
    pub superseded_by: Option<u64>,
    pub redacted: bool,
    pub access_count: u64,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl IndexRow {
    /// Days since the row was last touched or created.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let base = self.last_accessed.map_or(self.created_at, |accessed| {
            accessed.max(self.created_at)
        });
        (now - base).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Derived freshness label; any touch reheats the base to `now`.
    pub fn decay_tier(&self, now: DateTime<Utc>, config: &ChainConfig) -> DecayTier {
        let age = self.age_days(now);
        if age <= config.decay_hot_days {
            DecayTier::Hot
        } else if age <= config.decay_warm_days {
            DecayTier::Warm
        } else {
            DecayTier::Cold
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct IndexStats {
    pub entries: u64,
    pub by_kind: Vec<(String, u64)>,
    pub by_tier: Vec<(String, u64)>,
    pub by_decay: Vec<(String, u64)>,
}

pub struct Index {
    conn: Connection,
}

impl Index {
    pub fn open(path: &Path) -> ChainResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Highest journal seq already applied, used by the start-up forward-roll.
    pub fn applied_head(&self) -> ChainResult<Option<u64>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'applied_head'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Project a journal entry into the index. Idempotent, so the forward
    /// roll and rebuild can replay entries that were already applied.
    pub fn apply(&mut self, entry: &Entry, store: &FsStore) -> ChainResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO entries
               (seq, kind, tier, created_at, importance, is_core, block_label,
                block_version, content_hash, is_superseded, superseded_by,
                redacted, access_count, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, 0, 0, NULL)",
            params![
                entry.seq,
                entry.entry_kind.as_str(),
                entry.tier.as_str(),
                entry.created_at.to_rfc3339(),
                entry.provenance.importance,
                entry.links.is_core,
                entry.links.block_label.map(|l| l.as_str()),
                entry.links.block_version,
                entry.content_hash.to_hex(),
            ],
        )?;

        match entry.entry_kind {
            EntryKind::Consolidation => {
                for target in entry.links.supersedes.as_deref().unwrap_or(&[]) {
                    tx.execute(
                        "INSERT OR REPLACE INTO consolidations
                           (consolidation_seq, superseded_seq) VALUES (?1, ?2)",
                        params![entry.seq, target],
                    )?;
                    mark_superseded_on(&tx, *target, entry.seq)?;
                    // Consolidating the live block of a label moves the memo
                    // back to the newest block still standing.
                    let label: Option<String> = tx
                        .query_row(
                            "SELECT block_label FROM entries
                             WHERE seq = ?1 AND kind = 'block'",
                            params![target],
                            |row| row.get(0),
                        )
                        .optional()?
                        .flatten();
                    if let Some(label) = label {
                        let live: Option<u64> = tx.query_row(
                            "SELECT MAX(seq) FROM entries
                             WHERE kind = 'block' AND block_label = ?1
                               AND is_superseded = 0",
                            params![label],
                            |row| row.get(0),
                        )?;
                        match live {
                            Some(seq) => {
                                tx.execute(
                                    "INSERT OR REPLACE INTO block_latest (label, seq)
                                     VALUES (?1, ?2)",
                                    params![label, seq],
                                )?;
                            }
                            None => {
                                tx.execute(
                                    "DELETE FROM block_latest WHERE label = ?1",
                                    params![label],
                                )?;
                            }
                        }
                    }
                }
            }
            EntryKind::Block => {
                if let Some(prev) = entry.links.prev_block_seq {
                    mark_superseded_on(&tx, prev, entry.seq)?;
                }
                if let Some(label) = entry.links.block_label {
                    tx.execute(
                        "INSERT OR REPLACE INTO block_latest (label, seq) VALUES (?1, ?2)",
                        params![label.as_str(), entry.seq],
                    )?;
                }
            }
            EntryKind::Redaction => match redaction_target(entry, store) {
                Some(target) => {
                    tx.execute(
                        "UPDATE entries SET redacted = 1 WHERE seq = ?1",
                        params![target],
                    )?;
                }
                None => {
                    log::warn!("redaction entry {} has an unreadable target note", entry.seq);
                }
            },
            _ => {}
        }

        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('applied_head', ?1)",
            params![entry.seq.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn mark_superseded(&mut self, seq: u64, by: u64) -> ChainResult<()> {
        mark_superseded_on(&self.conn, seq, by)
    }

    /// Record an access: bump the counter and reset the decay base.
    pub fn touch(&mut self, seq: u64, now: DateTime<Utc>) -> ChainResult<()> {
        self.conn.execute(
            "UPDATE entries
             SET access_count = access_count + 1, last_accessed = ?1
             WHERE seq = ?2",
            params![now.to_rfc3339(), seq],
        )?;
        Ok(())
    }

    pub fn get(&self, seq: u64) -> ChainResult<Option<IndexRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_ROW} WHERE seq = ?1"),
                params![seq],
                row_from_sql,
            )
            .optional()?;
        Ok(row)
    }

    /// Rows eligible for recall scoring. Redacted rows and redaction
    /// bookkeeping entries never surface.
    pub fn candidates(
        &self,
        tiers: Option<&[Tier]>,
        include_superseded: bool,
    ) -> ChainResult<Vec<IndexRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_ROW}
             WHERE redacted = 0 AND kind != 'redaction'
               AND (is_superseded = 0 OR ?1)
             ORDER BY seq"
        ))?;
        let rows = stmt
            .query_map(params![include_superseded], row_from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match tiers {
            Some(tiers) => rows
                .into_iter()
                .filter(|row| tiers.contains(&row.tier))
                .collect(),
            None => rows,
        })
    }

    pub fn block_latest(&self, label: BlockLabel) -> ChainResult<Option<u64>> {
        let seq: Option<u64> = self
            .conn
            .query_row(
                "SELECT seq FROM block_latest WHERE label = ?1",
                params![label.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq)
    }

    /// Non-superseded entries flagged `is_core`, always offered to context
    /// assemblers.
    pub fn core_memories(&self) -> ChainResult<Vec<IndexRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_ROW}
             WHERE is_core = 1 AND is_superseded = 0 AND redacted = 0
             ORDER BY seq"
        ))?;
        let rows = stmt
            .query_map([], row_from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The seqs a consolidation entry supersedes.
    pub fn consolidation_targets(&self, seq: u64) -> ChainResult<Vec<u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT superseded_seq FROM consolidations
             WHERE consolidation_seq = ?1 ORDER BY superseded_seq",
        )?;
        let rows = stmt
            .query_map(params![seq], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self, now: DateTime<Utc>, config: &ChainConfig) -> ChainResult<IndexStats> {
        let entries: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        let by_kind = self.grouped("kind")?;
        let by_tier = self.grouped("tier")?;

        let mut hot = 0u64;
        let mut warm = 0u64;
        let mut cold = 0u64;
        let mut stmt = self.conn.prepare(&format!("{SELECT_ROW} ORDER BY seq"))?;
        for row in stmt.query_map([], row_from_sql)? {
            match row?.decay_tier(now, config) {
                DecayTier::Hot => hot += 1,
                DecayTier::Warm => warm += 1,
                DecayTier::Cold => cold += 1,
            }
        }

        Ok(IndexStats {
            entries,
            by_kind,
            by_tier,
            by_decay: vec![
                ("hot".into(), hot),
                ("warm".into(), warm),
                ("cold".into(), cold),
            ],
        })
    }

    fn grouped(&self, column: &str) -> ChainResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM entries GROUP BY {column} ORDER BY {column}"
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Drop every derived row. Rebuild replays the journal afterwards.
    pub fn clear(&mut self) -> ChainResult<()> {
        self.conn.execute_batch(
            "DELETE FROM entries;
             DELETE FROM consolidations;
             DELETE FROM block_latest;
             DELETE FROM meta;",
        )?;
        Ok(())
    }
}

/// Shared by `Index::mark_superseded` and the projection transaction in
/// `apply`, which cannot call a `&mut self` method while the transaction
/// borrows the connection.
fn mark_superseded_on(conn: &Connection, seq: u64, by: u64) -> ChainResult<()> {
    conn.execute(
        "UPDATE entries SET is_superseded = 1, superseded_by = ?1 WHERE seq = ?2",
        params![by, seq],
    )?;
    Ok(())
}

const SELECT_ROW: &str = "SELECT seq, kind, tier, created_at, importance, is_core,
        block_label, block_version, content_hash, is_superseded, superseded_by,
        redacted, access_count, last_accessed
 FROM entries";

fn row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexRow> {
    let kind: String = row.get(1)?;
    let tier: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let block_label: Option<String> = row.get(6)?;
    let content_hash: String = row.get(8)?;
    let last_accessed: Option<String> = row.get(13)?;

    Ok(IndexRow {
        seq: row.get(0)?,
        kind: parse_col(1, &kind)?,
        tier: parse_col(2, &tier)?,
        created_at: parse_time(3, &created_at)?,
        importance: row.get(4)?,
        is_core: row.get(5)?,
        block_label: block_label.as_deref().map(|l| parse_col(6, l)).transpose()?,
        block_version: row.get(7)?,
        content_hash: parse_col(8, &content_hash)?,
        is_superseded: row.get(9)?,
        superseded_by: row.get(10)?,
        redacted: row.get(11)?,
        access_count: row.get(12)?,
        last_accessed: last_accessed
            .as_deref()
            .map(|t| parse_time(13, t))
            .transpose()?,
    })
}

fn parse_col<T>(idx: usize, text: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse()
        .map_err(|e: T::Err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn redaction_target(entry: &Entry, store: &FsStore) -> Option<u64> {
    let bytes = store.get(&entry.content_hash).ok()?;
    let note: RedactionNote = serde_json::from_slice(&bytes).ok()?;
    Some(note.redacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Links, Provenance, UnsignedEntry};
    use crate::keys::WriterKey;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        store: FsStore,
        key: WriterKey,
        index: Index,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::open(tmp.path()).unwrap();
        let index = Index::open(&tmp.path().join(INDEX_FILE)).unwrap();
        Fixture {
            _tmp: tmp,
            store,
            key: WriterKey::generate().unwrap(),
            index,
        }
    }

    fn signed(fx: &Fixture, seq: u64, kind: EntryKind, text: &str, links: Links) -> Entry {
        let content_hash = fx.store.put(text).unwrap();
        let unsigned = UnsignedEntry {
            seq,
            prev_hash: Digest::ZERO,
            content_hash,
            entry_kind: kind,
            tier: Tier::Committed,
            created_at: "2026-02-02T00:00:00Z".parse().unwrap(),
            provenance: Provenance::manual(0.5),
            links,
        };
        let sig = fx.key.sign(&unsigned.signing_bytes().unwrap());
        unsigned.into_signed(sig)
    }

    #[test]
    fn apply_projects_consolidation_edges() {
        let mut fx = fixture();
        for (seq, text) in [(0, "a"), (1, "b")] {
            let entry = signed(&fx, seq, EntryKind::Memory, text, Links::default());
            fx.index.apply(&entry, &fx.store).unwrap();
        }
        let consolidation = signed(&fx, 2, EntryKind::Consolidation, "a+b", Links {
            supersedes: Some(vec![0, 1]),
            ..Links::default()
        });
        fx.index.apply(&consolidation, &fx.store).unwrap();

        for seq in [0, 1] {
            let row = fx.index.get(seq).unwrap().unwrap();
            assert!(row.is_superseded);
            assert_eq!(row.superseded_by, Some(2));
        }
        assert_eq!(fx.index.consolidation_targets(2).unwrap(), vec![0, 1]);
        assert_eq!(fx.index.applied_head().unwrap(), Some(2));
    }

    #[test]
    fn mark_superseded_flips_the_row() {
        let mut fx = fixture();
        let entry = signed(&fx, 0, EntryKind::Memory, "standalone", Links::default());
        fx.index.apply(&entry, &fx.store).unwrap();

        fx.index.mark_superseded(0, 9).unwrap();
        let row = fx.index.get(0).unwrap().unwrap();
        assert!(row.is_superseded);
        assert_eq!(row.superseded_by, Some(9));
    }

    #[test]
    fn touch_reheats_the_decay_tier() {
        let mut fx = fixture();
        let entry = signed(&fx, 0, EntryKind::Memory, "cooling fact", Links::default());
        fx.index.apply(&entry, &fx.store).unwrap();

        let config = ChainConfig::default();
        let later = entry.created_at + Duration::days(40);
        let row = fx.index.get(0).unwrap().unwrap();
        assert_eq!(row.decay_tier(later, &config), DecayTier::Cold);
        assert_eq!(row.access_count, 0);

        fx.index.touch(0, later).unwrap();
        let row = fx.index.get(0).unwrap().unwrap();
        assert_eq!(row.decay_tier(later, &config), DecayTier::Hot);
        assert_eq!(row.access_count, 1);
        assert_eq!(row.last_accessed, Some(later));
    }

    #[test]
    fn block_rows_feed_the_latest_memo() {
        let mut fx = fixture();
        let first = signed(&fx, 0, EntryKind::Block, "persona v1", Links {
            block_label: Some(BlockLabel::Persona),
            block_version: Some(1),
            is_core: true,
            ..Links::default()
        });
        let second = signed(&fx, 1, EntryKind::Block, "persona v2", Links {
            block_label: Some(BlockLabel::Persona),
            block_version: Some(2),
            prev_block_seq: Some(0),
            is_core: true,
            ..Links::default()
        });
        fx.index.apply(&first, &fx.store).unwrap();
        fx.index.apply(&second, &fx.store).unwrap();

        assert_eq!(fx.index.block_latest(BlockLabel::Persona).unwrap(), Some(1));
        let row = fx.index.get(0).unwrap().unwrap();
        assert!(row.is_superseded);
        assert_eq!(row.superseded_by, Some(1));
    }
}

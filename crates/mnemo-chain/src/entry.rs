//! The atomic chain record and its closed set of kinds.
//!
//! The wire shape is one canonical JSON object per `chain.jsonl` line with
//! fields in the order fixed by the struct declarations below. The signing
//! bytes are the canonical encoding of every field before `signature`; the
//! entry digest (the successor's `prev_hash` and the head hash) covers the
//! full line including the signature.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use mnemo_canon::{CanonError, Digest, to_canonical_json};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Memory,
    Identity,
    Decision,
    Redaction,
    Consolidation,
    Block,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Memory => "memory",
            EntryKind::Identity => "identity",
            EntryKind::Decision => "decision",
            EntryKind::Redaction => "redaction",
            EntryKind::Consolidation => "consolidation",
            EntryKind::Block => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Committed,
    Relationship,
    Ephemeral,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Committed => "committed",
            Tier::Relationship => "relationship",
            Tier::Ephemeral => "ephemeral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    Manual,
    Auto,
    Consolidation,
    Heartbeat,
}

/// Labeled slots for persistent core context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLabel {
    Persona,
    UserProfile,
    Goals,
    Knowledge,
}

impl BlockLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockLabel::Persona => "persona",
            BlockLabel::UserProfile => "user_profile",
            BlockLabel::Goals => "goals",
            BlockLabel::Knowledge => "knowledge",
        }
    }
}

#[derive(Debug, Error)]
#[error("unrecognized {what} '{value}'")]
pub struct EnumParseError {
    what: &'static str,
    value: String,
}

macro_rules! impl_from_str {
    ($ty:ident, $what:literal, { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(EnumParseError { what: $what, value: s.to_owned() }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_from_str!(EntryKind, "entry kind", {
    "memory" => Memory,
    "identity" => Identity,
    "decision" => Decision,
    "redaction" => Redaction,
    "consolidation" => Consolidation,
    "block" => Block,
});

impl_from_str!(Tier, "tier", {
    "committed" => Committed,
    "relationship" => Relationship,
    "ephemeral" => Ephemeral,
});

impl_from_str!(BlockLabel, "block label", {
    "persona" => Persona,
    "user_profile" => UserProfile,
    "goals" => Goals,
    "knowledge" => Knowledge,
});

impl ProvenanceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvenanceSource::Manual => "manual",
            ProvenanceSource::Auto => "auto",
            ProvenanceSource::Consolidation => "consolidation",
            ProvenanceSource::Heartbeat => "heartbeat",
        }
    }
}

impl_from_str!(ProvenanceSource, "provenance source", {
    "manual" => Manual,
    "auto" => Auto,
    "consolidation" => Consolidation,
    "heartbeat" => Heartbeat,
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Provenance {
    pub source: ProvenanceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    pub importance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_tag: Option<String>,
}

impl Provenance {
    pub fn manual(importance: f64) -> Self {
        Self {
            source: ProvenanceSource::Manual,
            trigger: None,
            importance,
            emotion_tag: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_label: Option<BlockLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_block_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entities: Option<Vec<String>>,
    #[serde(default)]
    pub is_core: bool,
}

/// Ed25519 signature carried on the wire as 128 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EntrySignature(pub [u8; 64]);

impl EntrySignature {
    pub fn to_signature(&self) -> Signature {
        Signature::from_bytes(&self.0)
    }
}

impl From<Signature> for EntrySignature {
    fn from(sig: Signature) -> Self {
        EntrySignature(sig.to_bytes())
    }
}

impl fmt::Debug for EntrySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntrySignature({})", hex::encode(self.0))
    }
}

impl Serialize for EntrySignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for EntrySignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))?;
        Ok(EntrySignature(arr))
    }
}

/// One signed, hash-linked record of the chain. Field order here is the wire
/// order; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    pub seq: u64,
    pub prev_hash: Digest,
    pub content_hash: Digest,
    pub payload_ref: Digest,
    pub entry_kind: EntryKind,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub provenance: Provenance,
    pub links: Links,
    pub signature: EntrySignature,
}

/// Borrowed view of everything before `signature`, in wire order. These are
/// the bytes the writer key signs.
#[derive(Serialize)]
struct SigningView<'a> {
    seq: u64,
    prev_hash: &'a Digest,
    content_hash: &'a Digest,
    payload_ref: &'a Digest,
    entry_kind: EntryKind,
    tier: Tier,
    created_at: &'a DateTime<Utc>,
    provenance: &'a Provenance,
    links: &'a Links,
}

/// Header fields of an entry before it has been signed.
pub struct UnsignedEntry {
    pub seq: u64,
    pub prev_hash: Digest,
    pub content_hash: Digest,
    pub entry_kind: EntryKind,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub provenance: Provenance,
    pub links: Links,
}

impl UnsignedEntry {
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CanonError> {
        to_canonical_json(&SigningView {
            seq: self.seq,
            prev_hash: &self.prev_hash,
            content_hash: &self.content_hash,
            payload_ref: &self.content_hash,
            entry_kind: self.entry_kind,
            tier: self.tier,
            created_at: &self.created_at,
            provenance: &self.provenance,
            links: &self.links,
        })
    }

    pub fn into_signed(self, signature: EntrySignature) -> Entry {
        Entry {
            seq: self.seq,
            prev_hash: self.prev_hash,
            content_hash: self.content_hash,
            payload_ref: self.content_hash,
            entry_kind: self.entry_kind,
            tier: self.tier,
            created_at: self.created_at,
            provenance: self.provenance,
            links: self.links,
            signature,
        }
    }
}

impl Entry {
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CanonError> {
        to_canonical_json(&SigningView {
            seq: self.seq,
            prev_hash: &self.prev_hash,
            content_hash: &self.content_hash,
            payload_ref: &self.payload_ref,
            entry_kind: self.entry_kind,
            tier: self.tier,
            created_at: &self.created_at,
            provenance: &self.provenance,
            links: &self.links,
        })
    }

    /// The canonical wire line, without the trailing newline.
    pub fn canonical_line(&self) -> Result<Vec<u8>, CanonError> {
        to_canonical_json(self)
    }

    /// Digest of the full canonical line; the successor's `prev_hash`.
    pub fn digest(&self) -> Result<Digest, CanonError> {
        Ok(Digest::of_bytes(&self.canonical_line()?))
    }

    pub fn decode_line(line: &str) -> Result<Entry, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn verify_signature(&self, key: &VerifyingKey) -> bool {
        let Ok(bytes) = self.signing_bytes() else {
            return false;
        };
        key.verify(&bytes, &self.signature.to_signature()).is_ok()
    }

    /// Per-kind structural validation shared by the write path and verifier.
    pub fn validate_shape(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.provenance.importance) {
            return Err(format!(
                "importance {} out of range [0.0, 1.0]",
                self.provenance.importance
            ));
        }
        match self.entry_kind {
            EntryKind::Consolidation => {
                match &self.links.supersedes {
                    Some(targets) if !targets.is_empty() => {}
                    _ => return Err("consolidation entry must supersede at least one seq".into()),
                }
                if self.links.block_label.is_some() {
                    return Err("consolidation entry cannot carry a block label".into());
                }
            }
            EntryKind::Block => {
                if self.links.block_label.is_none() {
                    return Err("block entry requires a block label".into());
                }
                match self.links.block_version {
                    Some(v) if v >= 1 => {}
                    _ => return Err("block entry requires block_version >= 1".into()),
                }
                if self.links.supersedes.is_some() {
                    return Err("block entry cannot carry supersedes links".into());
                }
            }
            _ => {
                if self.links.supersedes.is_some() {
                    return Err(format!(
                        "{} entry cannot carry supersedes links",
                        self.entry_kind
                    ));
                }
                if self.links.block_label.is_some() || self.links.prev_block_seq.is_some() {
                    return Err(format!(
                        "{} entry cannot carry block links",
                        self.entry_kind
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Payload document carried by a `redaction` entry, naming its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionNote {
    pub redacts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::WriterKey;

    fn sample(kind: EntryKind, links: Links) -> Entry {
        let key = WriterKey::generate().unwrap();
        let content = Digest::of_bytes(b"payload");
        let unsigned = UnsignedEntry {
            seq: 4,
            prev_hash: Digest::of_bytes(b"previous line"),
            content_hash: content,
            entry_kind: kind,
            tier: Tier::Committed,
            created_at: "2026-02-02T00:00:00Z".parse().unwrap(),
            provenance: Provenance {
                source: ProvenanceSource::Auto,
                trigger: Some("conversation".into()),
                importance: 0.8,
                emotion_tag: None,
            },
            links,
        };
        let sig = key.sign(&unsigned.signing_bytes().unwrap());
        unsigned.into_signed(sig)
    }

    #[test]
    fn wire_round_trip_for_all_kinds() {
        let cases = [
            (EntryKind::Memory, Links::default()),
            (EntryKind::Identity, Links { is_core: true, ..Links::default() }),
            (EntryKind::Decision, Links::default()),
            (EntryKind::Redaction, Links::default()),
            (
                EntryKind::Consolidation,
                Links { supersedes: Some(vec![0, 2]), ..Links::default() },
            ),
            (
                EntryKind::Block,
                Links {
                    block_label: Some(BlockLabel::Persona),
                    block_version: Some(2),
                    prev_block_seq: Some(1),
                    is_core: true,
                    ..Links::default()
                },
            ),
        ];
        for (kind, links) in cases {
            let entry = sample(kind, links);
            let line = entry.canonical_line().unwrap();
            let decoded = Entry::decode_line(std::str::from_utf8(&line).unwrap()).unwrap();
            assert_eq!(entry, decoded, "round trip for {kind}");
            assert_eq!(decoded.canonical_line().unwrap(), line);
        }
    }

    #[test]
    fn wire_field_order_is_fixed() {
        let entry = sample(EntryKind::Memory, Links::default());
        let line = String::from_utf8(entry.canonical_line().unwrap()).unwrap();
        let positions: Vec<usize> = [
            "\"seq\"",
            "\"prev_hash\"",
            "\"content_hash\"",
            "\"payload_ref\"",
            "\"entry_kind\"",
            "\"tier\"",
            "\"created_at\"",
            "\"provenance\"",
            "\"links\"",
            "\"signature\"",
        ]
        .iter()
        .map(|field| line.find(field).expect("field present"))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn signature_verifies_and_detects_header_changes() {
        let key = WriterKey::generate().unwrap();
        let entry = {
            let unsigned = UnsignedEntry {
                seq: 0,
                prev_hash: Digest::ZERO,
                content_hash: Digest::of_bytes(b"x"),
                entry_kind: EntryKind::Memory,
                tier: Tier::Ephemeral,
                created_at: "2026-02-02T00:00:00Z".parse().unwrap(),
                provenance: Provenance::manual(0.5),
                links: Links::default(),
            };
            let sig = key.sign(&unsigned.signing_bytes().unwrap());
            unsigned.into_signed(sig)
        };
        assert!(entry.verify_signature(&key.verifying_key()));

        let mut tampered = entry.clone();
        tampered.provenance.importance = 0.9;
        assert!(!tampered.verify_signature(&key.verifying_key()));
    }

    #[test]
    fn shape_validation_rejects_misplaced_links() {
        let entry = sample(EntryKind::Memory, Links {
            supersedes: Some(vec![1]),
            ..Links::default()
        });
        assert!(entry.validate_shape().is_err());

        let entry = sample(EntryKind::Consolidation, Links {
            supersedes: Some(vec![]),
            ..Links::default()
        });
        assert!(entry.validate_shape().is_err());

        let entry = sample(EntryKind::Block, Links {
            block_label: Some(BlockLabel::Goals),
            block_version: Some(0),
            ..Links::default()
        });
        assert!(entry.validate_shape().is_err());
    }
}

//! Canonical encoding helpers, digests, and text normalization.
//!
//! Everything that gets hashed or signed goes through this crate so the byte
//! representation is fixed in exactly one place: canonical JSON (struct fields
//! in declaration order, no whitespace, NFC strings, lowercase-hex digests).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::{UnicodeNormalization, is_nfc};

/// Serialize a value into its canonical byte encoding.
///
/// `serde_json` emits struct fields in declaration order with no whitespace,
/// so the output is deterministic as long as value types use structs (or
/// ordered maps) and pre-normalized strings.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonError> {
    Ok(serde_json::to_vec(value)?)
}

/// Normalize payload text: Unicode NFC, then strip trailing newlines so that
/// benign re-encodings of the same content land on the same digest.
pub fn normalize_text(text: &str) -> String {
    let composed: String = if is_nfc(text) {
        text.to_owned()
    } else {
        text.nfc().collect()
    };
    composed.trim_end_matches(['\n', '\r']).to_owned()
}

/// 32-byte SHA-256 digest used both as blob key and as chain link.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// The all-zero digest that anchors `seq = 0`.
    pub const ZERO: Digest = Digest([0u8; 32]);

    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Digest(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = CanonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| CanonError::InvalidDigest(s.to_owned()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CanonError::InvalidDigest(s.to_owned()))?;
        Ok(Digest(arr))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CanonError {
    #[error("canonical JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid digest string '{0}'")]
    InvalidDigest(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u64,
    }

    #[test]
    fn canonical_encoding_is_deterministic() {
        let a = Record {
            name: "alpha".into(),
            count: 7,
        };
        let b = Record {
            name: "alpha".into(),
            count: 7,
        };
        assert_eq!(
            to_canonical_json(&a).unwrap(),
            to_canonical_json(&b).unwrap()
        );
        assert_eq!(
            to_canonical_json(&a).unwrap(),
            br#"{"name":"alpha","count":7}"#.to_vec()
        );
    }

    #[test]
    fn digest_hex_round_trip() {
        let d = Digest::of_bytes(b"hello");
        let parsed: Digest = d.to_hex().parse().unwrap();
        assert_eq!(d, parsed);
        assert_eq!(d.to_hex().len(), 64);
    }

    #[test]
    fn zero_digest_is_all_zero_hex() {
        assert_eq!(Digest::ZERO.to_hex(), "0".repeat(64));
    }

    #[test]
    fn rejects_malformed_digest_strings() {
        assert!("xyz".parse::<Digest>().is_err());
        assert!("abcd".parse::<Digest>().is_err());
    }

    #[test]
    fn normalization_composes_and_trims() {
        // "é" decomposed (e + combining acute) vs composed.
        let decomposed = "caf\u{0065}\u{0301}\n\n";
        let composed = "caf\u{00e9}";
        assert_eq!(normalize_text(decomposed), composed);
        assert_eq!(normalize_text("plain\r\n"), "plain");
        // Idempotent.
        assert_eq!(normalize_text(composed), normalize_text(&normalize_text(composed)));
    }

    #[test]
    fn normalized_variants_share_a_digest() {
        let a = normalize_text("nai\u{0308}ve\n");
        let b = normalize_text("na\u{00ef}ve");
        assert_eq!(Digest::of_bytes(a.as_bytes()), Digest::of_bytes(b.as_bytes()));
    }
}

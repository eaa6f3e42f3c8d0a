//! Content-hash keys.
//!
//! A key is a 64-byte Blake2b-512 digest. Leaves are keyed by the hash of
//! their bytes; roots are keyed by the hash of the concatenated leaf keys,
//! so the two never collide.

use std::fmt;
use std::str::FromStr;

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

use crate::error::CasError;

/// Width of a content-hash key in bytes.
pub const KEY_SIZE: usize = 64;

/// A fixed-width content digest.
///
/// Value type: cheap to copy, comparable, hashable. The canonical string
/// form is lowercase hex; an optional store prefix is prepended verbatim
/// when addressing the object store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Hash a byte slice into a key.
    pub fn hash(data: &[u8]) -> Self {
        let mut hasher: Blake2bVar = new_hasher();
        hasher.update(data);
        finalize(hasher)
    }

    /// Build a key from exactly [`KEY_SIZE`] raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CasError> {
        if bytes.len() != KEY_SIZE {
            return Err(CasError::InvalidKey {
                message: format!("expected {} bytes, got {}", KEY_SIZE, bytes.len()),
            });
        }
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Parse a key from its hex string form.
    pub fn from_hex(s: &str) -> Result<Self, CasError> {
        let bytes: Vec<u8> = hex::decode(s).map_err(|e| CasError::InvalidKey {
            message: format!("invalid hex: {}", e),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Hex string with the store prefix prepended verbatim.
    ///
    /// # Arguments
    /// * `prefix` - Per-store key prefix, may be empty
    pub fn string_with_prefix(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests are unwieldy in logs; show a recognizable head.
        write!(f, "Key({}..)", &hex::encode(&self.0[..8]))
    }
}

impl FromStr for Key {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Incremental hasher producing the root key from leaf keys.
///
/// Feed leaf keys in input order; the result depends only on the sequence
/// of keys, never on upload scheduling.
pub struct KeyAccumulator {
    hasher: Blake2bVar,
}

impl KeyAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self {
            hasher: new_hasher(),
        }
    }

    /// Absorb the next leaf key.
    pub fn push(&mut self, key: &Key) {
        self.hasher.update(key.as_bytes());
    }

    /// Finish and return the root key.
    pub fn finalize(self) -> Key {
        finalize(self.hasher)
    }
}

impl Default for KeyAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn new_hasher() -> Blake2bVar {
    // KEY_SIZE is within blake2b's output range, so this cannot fail.
    Blake2bVar::new(KEY_SIZE).expect("valid blake2b output size")
}

fn finalize(hasher: Blake2bVar) -> Key {
    let mut out = [0u8; KEY_SIZE];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer sized to hasher");
    Key(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(Key::hash(b"hello"), Key::hash(b"hello"));
        assert_ne!(Key::hash(b"hello"), Key::hash(b"world"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let key: Key = Key::hash(b"payload");
        let parsed: Key = key.to_string().parse().unwrap();
        assert_eq!(key, parsed);
        assert_eq!(key.to_string().len(), KEY_SIZE * 2);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_width() {
        assert!(Key::from_bytes(&[0u8; 32]).is_err());
        assert!(Key::from_bytes(&[0u8; 65]).is_err());
        assert!(Key::from_bytes(&[0u8; 64]).is_ok());
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(Key::from_hex("not hex").is_err());
        assert!(Key::from_hex("abcd").is_err());
    }

    #[test]
    fn test_string_with_prefix() {
        let key: Key = Key::hash(b"x");
        assert_eq!(
            key.string_with_prefix("blobs-"),
            format!("blobs-{}", key)
        );
        assert_eq!(key.string_with_prefix(""), key.to_string());
    }

    #[test]
    fn test_accumulator_matches_concat_hash() {
        let a: Key = Key::hash(b"leaf a");
        let b: Key = Key::hash(b"leaf b");

        let mut acc = KeyAccumulator::new();
        acc.push(&a);
        acc.push(&b);

        let mut concat: Vec<u8> = Vec::new();
        concat.extend_from_slice(a.as_bytes());
        concat.extend_from_slice(b.as_bytes());

        assert_eq!(acc.finalize(), Key::hash(&concat));
    }

    #[test]
    fn test_leaf_and_root_domains_differ() {
        // A single-leaf root hashes the leaf *key*, not the leaf bytes.
        let data: &[u8] = b"some content";
        let leaf: Key = Key::hash(data);
        let mut acc = KeyAccumulator::new();
        acc.push(&leaf);
        assert_ne!(acc.finalize(), leaf);
    }
}

//! Content-addressed hashing.
//!
//! All hashing in the consensus layer goes through blake3. The same canonical
//! sbor encoding is used for hashing and for the wire, so a hash computed on
//! one node is reproducible on every other.

use sbor::prelude::*;
use std::fmt;

/// A 32-byte blake3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct Hash(pub [u8; 32]);

/// Error parsing a fixed-length value from a hex string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("wrong length: expected {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },
}

impl Hash {
    /// The all-zero hash. Used as "no hash" sentinel.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary content.
    pub fn from_bytes(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Adopt 32 bytes that are already a hash (no re-hashing).
    pub fn from_hash_bytes(bytes: &[u8; 32]) -> Self {
        Hash(*bytes)
    }

    /// Parse from a hex string (with or without `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HexError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(HexError::WrongLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", hex::encode(&self.0[..4]), hex::encode(&self.0[28..]))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Compute a binary merkle root over leaf hashes.
///
/// Odd layers duplicate the last element. An empty slice yields `Hash::ZERO`;
/// a single leaf is its own root.
pub fn compute_merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    let mut layer: Vec<Hash> = leaves.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            let mut hasher = blake3::Hasher::new();
            hasher.update(pair[0].as_bytes());
            hasher.update(right.as_bytes());
            next.push(Hash(*hasher.finalize().as_bytes()));
        }
        layer = next;
    }
    layer[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(Hash::from_bytes(b"abc"), Hash::from_bytes(b"abc"));
        assert_ne!(Hash::from_bytes(b"abc"), Hash::from_bytes(b"abd"));
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash::from_bytes(b"round trip");
        assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
        assert_eq!(Hash::from_hex(&format!("0x{}", h.to_hex())).unwrap(), h);
    }

    #[test]
    fn hex_rejects_bad_input() {
        assert!(matches!(Hash::from_hex("zz"), Err(HexError::InvalidHex(_))));
        assert!(matches!(
            Hash::from_hex("abcd"),
            Err(HexError::WrongLength { got: 2, .. })
        ));
    }

    #[test]
    fn merkle_root_empty_and_single() {
        assert_eq!(compute_merkle_root(&[]), Hash::ZERO);
        let leaf = Hash::from_bytes(b"leaf");
        assert_eq!(compute_merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn merkle_root_changes_with_leaves() {
        let a = Hash::from_bytes(b"a");
        let b = Hash::from_bytes(b"b");
        let c = Hash::from_bytes(b"c");
        let root_ab = compute_merkle_root(&[a, b]);
        let root_abc = compute_merkle_root(&[a, b, c]);
        assert_ne!(root_ab, root_abc);
        // Order matters.
        assert_ne!(compute_merkle_root(&[a, b]), compute_merkle_root(&[b, a]));
    }
}

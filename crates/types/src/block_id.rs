//! Block references.

use crate::hash::Hash;
use sbor::prelude::*;
use std::fmt;

/// Commitment to a block's chunked transport encoding: the part count and
/// the merkle root over part hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub struct PartSetHeader {
    pub total: u32,
    pub hash: Hash,
}

impl PartSetHeader {
    pub fn new(total: u32, hash: Hash) -> Self {
        Self { total, hash }
    }

    pub fn zero() -> Self {
        Self {
            total: 0,
            hash: Hash::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.hash.is_zero()
    }
}

impl fmt::Display for PartSetHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.total, self.hash)
    }
}

/// Canonical reference to a block: its hash plus the part-set commitment.
///
/// The zero value (empty hash, zero parts header) denotes "no block" and is
/// distinct from any real block. Votes for the zero BlockId are nil votes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, BasicSbor)]
pub struct BlockId {
    pub hash: Vec<u8>,
    pub parts_header: PartSetHeader,
}

impl BlockId {
    pub fn new(hash: Hash, parts_header: PartSetHeader) -> Self {
        Self {
            hash: hash.as_bytes().to_vec(),
            parts_header,
        }
    }

    /// The "no block" reference.
    pub fn zero() -> Self {
        Self {
            hash: Vec::new(),
            parts_header: PartSetHeader::zero(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hash.is_empty() && self.parts_header.is_zero()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "nil-BlockId")
        } else {
            write!(f, "{}:{}", hex::encode(&self.hash), self.parts_header)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_iff_empty_hash_and_zero_header() {
        assert!(BlockId::zero().is_zero());

        let real = BlockId::new(
            Hash::from_bytes(b"block"),
            PartSetHeader::new(4, Hash::from_bytes(b"parts")),
        );
        assert!(!real.is_zero());

        // Hash set but parts header zero: not zero.
        let half = BlockId::new(Hash::from_bytes(b"block"), PartSetHeader::zero());
        assert!(!half.is_zero());

        // Empty hash but non-zero parts header: not zero either.
        let other_half = BlockId {
            hash: Vec::new(),
            parts_header: PartSetHeader::new(1, Hash::from_bytes(b"p")),
        };
        assert!(!other_half.is_zero());
    }

    #[test]
    fn zero_never_equals_non_zero() {
        let real = BlockId::new(
            Hash::from_bytes(b"block"),
            PartSetHeader::new(1, Hash::from_bytes(b"p")),
        );
        assert_ne!(BlockId::zero(), real);
    }

    #[test]
    fn equality_is_structural() {
        let a = BlockId::new(
            Hash::from_bytes(b"x"),
            PartSetHeader::new(2, Hash::from_bytes(b"y")),
        );
        let b = BlockId::new(
            Hash::from_bytes(b"x"),
            PartSetHeader::new(2, Hash::from_bytes(b"y")),
        );
        let c = BlockId::new(
            Hash::from_bytes(b"x"),
            PartSetHeader::new(3, Hash::from_bytes(b"y")),
        );
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

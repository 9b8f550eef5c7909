//! Aggregated quorum certificates.

use crate::block_id::BlockId;
use crate::crypto::Signature;
use crate::hash::Hash;
use crate::signer_bitfield::SignerBitfield;
use sbor::prelude::*;
use std::sync::OnceLock;

/// An aggregated quorum certificate attesting a block at a height/round.
///
/// The bitfield records which validator indices (address-sorted order of the
/// validator set authoritative at `height`) contributed to the aggregate
/// signature. Commits are immutable once constructed; the hash is computed
/// lazily and cached forever.
#[derive(Debug, Clone, BasicSbor)]
pub struct Commit {
    pub block_id: BlockId,
    pub height: u64,
    pub round: u64,
    pub signature: Signature,
    pub bitfield: SignerBitfield,

    #[sbor(skip)]
    hash: OnceLock<Hash>,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.block_id == other.block_id
            && self.height == other.height
            && self.round == other.round
            && self.signature == other.signature
            && self.bitfield == other.bitfield
    }
}

impl Eq for Commit {}

impl Commit {
    pub fn new(
        block_id: BlockId,
        height: u64,
        round: u64,
        signature: Signature,
        bitfield: SignerBitfield,
    ) -> Self {
        Self {
            block_id,
            height,
            round,
            signature,
            bitfield,
            hash: OnceLock::new(),
        }
    }

    /// Number of validator slots the bitfield covers.
    pub fn size(&self) -> usize {
        self.bitfield.size()
    }

    /// Number of validators that contributed to the aggregate.
    pub fn num_commits(&self) -> usize {
        self.bitfield.count()
    }

    /// Structural check that needs no validator set: a commit can never be
    /// for the nil block.
    pub fn validate_basic(&self) -> Result<(), &'static str> {
        if self.block_id.is_zero() {
            return Err("commit cannot be for nil block");
        }
        Ok(())
    }

    /// Deterministic hash over the canonical encoding. Cached after the
    /// first call; commits are never mutated, so the cache never invalidates.
    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| {
            let encoded =
                sbor::basic_encode(self).expect("commit encoding is infallible for valid fields");
            Hash::from_bytes(&encoded)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_id::PartSetHeader;

    fn commit(height: u64) -> Commit {
        let mut bitfield = SignerBitfield::new(4);
        bitfield.set(0);
        bitfield.set(2);
        Commit::new(
            BlockId::new(
                Hash::from_bytes(b"block"),
                PartSetHeader::new(3, Hash::from_bytes(b"parts")),
            ),
            height,
            1,
            Signature::zero(),
            bitfield,
        )
    }

    #[test]
    fn hash_is_idempotent() {
        let c = commit(10);
        assert_eq!(c.hash(), c.hash());
    }

    #[test]
    fn hash_changes_iff_fields_change() {
        assert_eq!(commit(10).hash(), commit(10).hash());
        assert_ne!(commit(10).hash(), commit(11).hash());

        let base = commit(10);
        let mut other = commit(10);
        other.bitfield.set(3);
        // Mutation through a fresh value; constructed commits stay immutable.
        let other = Commit::new(
            other.block_id,
            other.height,
            other.round,
            other.signature,
            other.bitfield,
        );
        assert_ne!(base.hash(), other.hash());
    }

    #[test]
    fn encoding_round_trips() {
        let c = commit(7);
        let bytes = sbor::basic_encode(&c).unwrap();
        let decoded: Commit = sbor::basic_decode(&bytes).unwrap();
        assert_eq!(c, decoded);
        assert_eq!(c.hash(), decoded.hash());
    }

    #[test]
    fn num_commits_is_popcount() {
        let c = commit(1);
        assert_eq!(c.size(), 4);
        assert_eq!(c.num_commits(), 2);
    }

    #[test]
    fn nil_commit_fails_basic_validation() {
        let c = Commit::new(
            BlockId::zero(),
            1,
            0,
            Signature::zero(),
            SignerBitfield::new(4),
        );
        assert!(c.validate_basic().is_err());
        assert!(commit(1).validate_basic().is_ok());
    }
}

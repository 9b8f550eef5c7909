//! The consensus block envelope.
//!
//! Consensus treats the application payload as opaque bytes; the envelope
//! adds the metadata consensus itself needs: the chain, height, epoch,
//! roster hash, and the commit observed for the previous block.

use crate::block_id::BlockId;
use crate::commit::Commit;
use crate::hash::Hash;
use crate::part_set::{PartSet, PartSetError};
use sbor::prelude::*;

/// Hard cap on the encoded size of a block. Enforced before decoding so a
/// peer cannot make us deserialize arbitrarily large input.
pub const MAX_BLOCK_SIZE: usize = 22_020_096;

/// Part size used when chunking a block for gossip.
pub const DEFAULT_PART_SIZE: usize = 65_536;

/// Proof that a block on a sibling chain committed some data, carried along
/// with the block that acts on it.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct CrossChainProof {
    /// Chain the proof originates from.
    pub chain_id: String,
    /// Height of the proven block on that chain.
    pub height: u64,
    /// Hash of the proven block.
    pub block_hash: Hash,
    /// Opaque proof bytes, interpreted by the application.
    pub data: Vec<u8>,
}

/// Consensus metadata attached to every block. The block's identity is the
/// hash of this structure.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlockExtra {
    pub chain_id: String,
    pub height: u64,
    /// Proposal time, unix milliseconds.
    pub time_ms: u64,
    /// Epoch this block was proposed under.
    pub epoch_number: u64,
    /// Hash of the validator set that is expected to commit this block.
    pub validators_hash: Hash,
    /// The commit for the previous block, as seen by the proposer. Absent
    /// only at the first block.
    pub seen_commit: Option<Commit>,
    pub seen_commit_hash: Hash,
    /// Encoded epoch announcement, when the proposer announces one.
    pub epoch_bytes: Vec<u8>,
    /// Hash of the application payload carried by this block.
    pub payload_hash: Hash,
}

impl BlockExtra {
    pub fn hash(&self) -> Hash {
        let encoded =
            sbor::basic_encode(self).expect("block extra encoding is infallible for valid fields");
        Hash::from_bytes(&encoded)
    }
}

/// A full block: opaque payload plus the consensus envelope.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ConsensusBlock {
    pub payload: Vec<u8>,
    pub extra: BlockExtra,
    pub proofs: Vec<CrossChainProof>,
}

/// Error decoding or validating a block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("encoded block is {size} bytes, above the {MAX_BLOCK_SIZE} byte cap")]
    TooLarge { size: usize },
    #[error("block failed to decode: {0}")]
    Decode(String),
    #[error("block failed to encode: {0}")]
    Encode(String),
    #[error("expected height {expected}, block has {got}")]
    WrongHeight { expected: u64, got: u64 },
    #[error("expected chain id {expected:?}, block has {got:?}")]
    WrongChainId { expected: String, got: String },
    #[error("payload hash does not match payload")]
    PayloadHashMismatch,
    #[error("seen commit hash does not match the carried commit")]
    SeenCommitHashMismatch,
    #[error("block above the first height carries no seen commit")]
    MissingSeenCommit,
    #[error("seen commit is for height {got}, expected {expected}")]
    WrongSeenCommitHeight { expected: u64, got: u64 },
    #[error(transparent)]
    PartSet(#[from] PartSetError),
}

impl ConsensusBlock {
    /// Assemble a block for proposing, filling in the derived hashes.
    pub fn make_block(
        payload: Vec<u8>,
        mut extra: BlockExtra,
        proofs: Vec<CrossChainProof>,
    ) -> Self {
        extra.payload_hash = Hash::from_bytes(&payload);
        extra.seen_commit_hash = extra
            .seen_commit
            .as_ref()
            .map(|c| c.hash())
            .unwrap_or(Hash::ZERO);
        Self {
            payload,
            extra,
            proofs,
        }
    }

    /// The block's identity: the hash of its envelope. The payload is
    /// covered indirectly through `payload_hash`.
    pub fn hash(&self) -> Hash {
        self.extra.hash()
    }

    pub fn height(&self) -> u64 {
        self.extra.height
    }

    /// Whether this block is the one a `BlockId` points at.
    pub fn hashes_to(&self, id: &BlockId) -> bool {
        !id.is_zero() && id.hash == self.hash().0.to_vec()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BlockError> {
        let encoded = sbor::basic_encode(self).map_err(|e| BlockError::Encode(format!("{e:?}")))?;
        if encoded.len() > MAX_BLOCK_SIZE {
            return Err(BlockError::TooLarge {
                size: encoded.len(),
            });
        }
        Ok(encoded)
    }

    /// Decode a block, rejecting oversized input before touching the codec.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
        if bytes.len() > MAX_BLOCK_SIZE {
            return Err(BlockError::TooLarge { size: bytes.len() });
        }
        sbor::basic_decode(bytes).map_err(|e| BlockError::Decode(format!("{e:?}")))
    }

    /// Chunk the encoded block into a part set for gossip.
    pub fn make_part_set(&self, part_size: usize) -> Result<PartSet, BlockError> {
        let bytes = self.to_bytes()?;
        Ok(PartSet::from_data(&bytes, part_size)?)
    }

    /// Stateless structural checks against the previous block's envelope.
    ///
    /// Does not verify the seen commit's signatures; that needs the
    /// validator set of the previous height and lives with the caller.
    pub fn validate_basic(&self, prev: &BlockExtra) -> Result<(), BlockError> {
        if self.extra.chain_id != prev.chain_id {
            return Err(BlockError::WrongChainId {
                expected: prev.chain_id.clone(),
                got: self.extra.chain_id.clone(),
            });
        }
        if self.extra.height != prev.height + 1 {
            return Err(BlockError::WrongHeight {
                expected: prev.height + 1,
                got: self.extra.height,
            });
        }
        if self.extra.payload_hash != Hash::from_bytes(&self.payload) {
            return Err(BlockError::PayloadHashMismatch);
        }
        match &self.extra.seen_commit {
            Some(commit) => {
                if commit.hash() != self.extra.seen_commit_hash {
                    return Err(BlockError::SeenCommitHashMismatch);
                }
                if commit.height != prev.height {
                    return Err(BlockError::WrongSeenCommitHeight {
                        expected: prev.height,
                        got: commit.height,
                    });
                }
            }
            // The first block has no predecessor commit to carry.
            None if prev.height == 0 => {}
            None => return Err(BlockError::MissingSeenCommit),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_id::PartSetHeader;
    use crate::crypto::Signature;
    use crate::signer_bitfield::SignerBitfield;

    fn commit_for(height: u64) -> Commit {
        let id = BlockId::new(
            Hash::from_bytes(b"prev"),
            PartSetHeader::new(1, Hash::from_bytes(b"prev-parts")),
        );
        let mut bitfield = SignerBitfield::new(4);
        bitfield.set(0);
        bitfield.set(1);
        bitfield.set(2);
        Commit::new(id, height, 0, Signature::zero(), bitfield)
    }

    fn extra_at(height: u64) -> BlockExtra {
        BlockExtra {
            chain_id: "test-chain".into(),
            height,
            time_ms: 1_700_000_000_000,
            epoch_number: 1,
            validators_hash: Hash::from_bytes(b"roster"),
            seen_commit: Some(commit_for(height - 1)),
            seen_commit_hash: Hash::ZERO,
            epoch_bytes: Vec::new(),
            payload_hash: Hash::ZERO,
        }
    }

    fn block_at(height: u64) -> ConsensusBlock {
        ConsensusBlock::make_block(b"payload".to_vec(), extra_at(height), Vec::new())
    }

    #[test]
    fn make_block_fills_derived_hashes() {
        let block = block_at(5);
        assert_eq!(block.extra.payload_hash, Hash::from_bytes(b"payload"));
        assert_eq!(
            block.extra.seen_commit_hash,
            block.extra.seen_commit.as_ref().unwrap().hash()
        );
    }

    #[test]
    fn round_trips_through_bytes() {
        let block = block_at(5);
        let bytes = block.to_bytes().unwrap();
        assert_eq!(ConsensusBlock::from_bytes(&bytes).unwrap(), block);
    }

    #[test]
    fn oversized_input_rejected_before_decoding() {
        let bytes = vec![0u8; MAX_BLOCK_SIZE + 1];
        assert_eq!(
            ConsensusBlock::from_bytes(&bytes),
            Err(BlockError::TooLarge {
                size: MAX_BLOCK_SIZE + 1
            })
        );
    }

    #[test]
    fn hashes_to_matches_own_id_only() {
        let block = block_at(5);
        let parts = block.make_part_set(16).unwrap();
        let id = BlockId::new(block.hash(), *parts.header());
        assert!(block.hashes_to(&id));
        assert!(!block.hashes_to(&BlockId::zero()));

        let other = BlockId::new(Hash::from_bytes(b"other"), *parts.header());
        assert!(!block.hashes_to(&other));
    }

    #[test]
    fn part_set_reassembles_the_block() {
        let block = block_at(5);
        let parts = block.make_part_set(16).unwrap();
        let bytes = parts.assemble().unwrap();
        assert_eq!(ConsensusBlock::from_bytes(&bytes).unwrap(), block);
    }

    #[test]
    fn validate_basic_accepts_well_formed_successor() {
        let prev = block_at(5);
        let mut extra = extra_at(6);
        extra.seen_commit = Some(commit_for(5));
        let block = ConsensusBlock::make_block(b"next".to_vec(), extra, Vec::new());
        assert!(block.validate_basic(&prev.extra).is_ok());
    }

    #[test]
    fn validate_basic_rejects_height_gap() {
        let prev = block_at(5);
        let block = block_at(7);
        assert_eq!(
            block.validate_basic(&prev.extra),
            Err(BlockError::WrongHeight {
                expected: 6,
                got: 7
            })
        );
    }

    #[test]
    fn validate_basic_rejects_wrong_chain() {
        let prev = block_at(5);
        let mut extra = extra_at(6);
        extra.chain_id = "other-chain".into();
        let block = ConsensusBlock::make_block(Vec::new(), extra, Vec::new());
        assert!(matches!(
            block.validate_basic(&prev.extra),
            Err(BlockError::WrongChainId { .. })
        ));
    }

    #[test]
    fn validate_basic_rejects_tampered_payload() {
        let prev = block_at(5);
        let mut block = block_at(6);
        block.payload = b"tampered".to_vec();
        assert_eq!(
            block.validate_basic(&prev.extra),
            Err(BlockError::PayloadHashMismatch)
        );
    }

    #[test]
    fn validate_basic_rejects_missing_or_mismatched_seen_commit() {
        let prev = block_at(5);

        let mut extra = extra_at(6);
        extra.seen_commit = None;
        let block = ConsensusBlock::make_block(Vec::new(), extra, Vec::new());
        assert_eq!(
            block.validate_basic(&prev.extra),
            Err(BlockError::MissingSeenCommit)
        );

        let mut extra = extra_at(6);
        extra.seen_commit = Some(commit_for(3));
        let block = ConsensusBlock::make_block(Vec::new(), extra, Vec::new());
        assert_eq!(
            block.validate_basic(&prev.extra),
            Err(BlockError::WrongSeenCommitHeight {
                expected: 5,
                got: 3
            })
        );
    }
}

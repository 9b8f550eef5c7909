//! Consensus votes.

use neatcon_types::{
    precommit_sign_bytes, prevote_sign_bytes, verify_signature, Address, BlockId, PublicKey,
    Signature,
};
use sbor::prelude::*;
use std::fmt;

/// The two vote kinds of a round. Distinct signing domains keep a prevote
/// from ever being replayed as a precommit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub enum VoteType {
    Prevote,
    Precommit,
}

/// A signed vote for a block (or nil) at a position.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Vote {
    pub vote_type: VoteType,
    pub height: u64,
    pub round: u64,
    /// The voted value; the zero id is a nil vote.
    pub block_id: BlockId,
    pub voter: Address,
    pub signature: Signature,
}

impl Vote {
    /// Whether this is a nil vote (against the round's proposal).
    pub fn is_nil(&self) -> bool {
        self.block_id.is_zero()
    }

    /// The canonical bytes this vote's signature is made over.
    pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        match self.vote_type {
            VoteType::Prevote => {
                prevote_sign_bytes(chain_id, self.height, self.round, &self.block_id)
            }
            VoteType::Precommit => {
                precommit_sign_bytes(chain_id, self.height, self.round, &self.block_id)
            }
        }
    }

    /// Verify the signature against the claimed voter's public key. The
    /// caller resolves the key from the validator set.
    pub fn verify(&self, chain_id: &str, public_key: &PublicKey) -> bool {
        verify_signature(&self.sign_bytes(chain_id), public_key, &self.signature)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}/{} {} by {}",
            self.vote_type, self.height, self.round, self.block_id, self.voter
        )
    }
}

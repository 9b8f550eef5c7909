//! Block proposals.

use neatcon_types::{proposal_sign_bytes, verify_signature, Address, BlockId, PublicKey, Signature};
use sbor::prelude::*;
use std::fmt;

/// A signed proposal of a block for a round.
///
/// The block itself travels separately as parts; the proposal pins down
/// which `BlockId` the round is about and carries the proof-of-lock round
/// when the proposer is re-proposing a locked value.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Proposal {
    pub height: u64,
    pub round: u64,
    pub block_id: BlockId,
    /// Round in which the proposed value gathered a prevote quorum, when
    /// the proposer is re-proposing a locked value.
    pub pol_round: Option<u64>,
    pub proposer: Address,
    pub signature: Signature,
}

impl Proposal {
    pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        let mut bytes = proposal_sign_bytes(chain_id, self.height, self.round, &self.block_id);
        match self.pol_round {
            Some(round) => {
                bytes.push(1);
                bytes.extend_from_slice(&round.to_le_bytes());
            }
            None => bytes.push(0),
        }
        bytes
    }

    pub fn verify(&self, chain_id: &str, public_key: &PublicKey) -> bool {
        verify_signature(&self.sign_bytes(chain_id), public_key, &self.signature)
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Proposal {}/{} {} by {}",
            self.height, self.round, self.block_id, self.proposer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neatcon_types::{keypair_from_seed, Hash, PartSetHeader};

    #[test]
    fn verify_covers_pol_round() {
        let kp = keypair_from_seed(1);
        let mut proposal = Proposal {
            height: 4,
            round: 1,
            block_id: BlockId::new(
                Hash::from_bytes(b"block"),
                PartSetHeader::new(1, Hash::from_bytes(b"parts")),
            ),
            pol_round: Some(0),
            proposer: Address::from_public_key(&kp.public_key()),
            signature: Signature::zero(),
        };
        proposal.signature = kp.sign(&proposal.sign_bytes("chain"));
        assert!(proposal.verify("chain", &kp.public_key()));

        let mut tampered = proposal.clone();
        tampered.pol_round = None;
        assert!(!tampered.verify("chain", &kp.public_key()));
    }
}

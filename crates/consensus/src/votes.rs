//! Per-round vote collection.
//!
//! One `VoteSet` holds the votes of a single (height, round, kind) against
//! the authoritative validator set. Byzantine input — unknown voters, bad
//! signatures, conflicting double votes — is rejected with a reason and
//! counted, never folded into the tally and never a crash.

use neatcon_core::{Vote, VoteType};
use neatcon_types::{
    Address, BlockId, Commit, Signature, SignerBitfield, ValidatorSet, VotePower,
};
use std::collections::HashMap;
use tracing::debug;

/// Why a vote was not added.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteSetError {
    #[error("vote is for {got_height}/{got_round} {got_kind:?}, set is {height}/{round} {kind:?}")]
    WrongPosition {
        height: u64,
        round: u64,
        kind: VoteType,
        got_height: u64,
        got_round: u64,
        got_kind: VoteType,
    },
    #[error("vote from unknown validator {0}")]
    UnknownValidator(Address),
    #[error("invalid signature on vote from {0}")]
    InvalidSignature(Address),
    #[error("conflicting vote from {0} (double vote dropped)")]
    ConflictingVote(Address),
    #[error("cannot build a commit without a two-thirds block")]
    NoQuorum,
    #[error("signature aggregation failed: {0}")]
    Aggregation(String),
}

/// Votes of one (height, round, kind), bound to a validator set.
pub struct VoteSet {
    chain_id: String,
    height: u64,
    round: u64,
    kind: VoteType,
    validators: ValidatorSet,
    /// One slot per validator, in set order.
    votes: Vec<Option<Vote>>,
    bitfield: SignerBitfield,
    tallied_power: VotePower,
    power_by_block: HashMap<BlockId, VotePower>,
    /// Byzantine votes dropped so far (conflicting double votes).
    byzantine_count: u64,
}

impl VoteSet {
    pub fn new(
        chain_id: impl Into<String>,
        height: u64,
        round: u64,
        kind: VoteType,
        validators: ValidatorSet,
    ) -> Self {
        let size = validators.len();
        Self {
            chain_id: chain_id.into(),
            height,
            round,
            kind,
            validators,
            votes: vec![None; size],
            bitfield: SignerBitfield::new(size),
            tallied_power: 0,
            power_by_block: HashMap::new(),
            byzantine_count: 0,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn kind(&self) -> VoteType {
        self.kind
    }

    pub fn byzantine_count(&self) -> u64 {
        self.byzantine_count
    }

    /// Add a verified-or-rejected vote. `Ok(true)` means the tally changed;
    /// `Ok(false)` is an exact duplicate.
    pub fn add_vote(&mut self, vote: Vote) -> Result<bool, VoteSetError> {
        if vote.height != self.height || vote.round != self.round || vote.vote_type != self.kind {
            return Err(VoteSetError::WrongPosition {
                height: self.height,
                round: self.round,
                kind: self.kind,
                got_height: vote.height,
                got_round: vote.round,
                got_kind: vote.vote_type,
            });
        }
        let index = self
            .validators
            .index_of(&vote.voter)
            .ok_or(VoteSetError::UnknownValidator(vote.voter))?;
        if let Some(existing) = &self.votes[index] {
            if existing.block_id == vote.block_id {
                return Ok(false);
            }
            self.byzantine_count += 1;
            debug!(voter = %vote.voter, "conflicting double vote dropped");
            return Err(VoteSetError::ConflictingVote(vote.voter));
        }
        let validator = self
            .validators
            .get(index)
            .ok_or(VoteSetError::UnknownValidator(vote.voter))?;
        if !vote.verify(&self.chain_id, &validator.public_key) {
            return Err(VoteSetError::InvalidSignature(vote.voter));
        }
        let power = validator.voting_power;
        self.bitfield.set(index);
        self.tallied_power += power;
        *self.power_by_block.entry(vote.block_id.clone()).or_insert(0) += power;
        self.votes[index] = Some(vote);
        Ok(true)
    }

    /// Power tallied so far, across all voted values.
    pub fn tallied_power(&self) -> VotePower {
        self.tallied_power
    }

    /// Whether any single value (including nil) has a two-thirds quorum.
    pub fn has_two_thirds(&self) -> bool {
        self.two_thirds_block().is_some()
    }

    /// The value with a two-thirds quorum, if any. At most one value can
    /// cross the threshold.
    pub fn two_thirds_block(&self) -> Option<BlockId> {
        let total = self.validators.total_voting_power();
        self.power_by_block
            .iter()
            .find(|(_, power)| **power * 3 > total * 2)
            .map(|(block_id, _)| block_id.clone())
    }

    /// Whether the whole set (any mix of values) crossed two thirds —
    /// the signal to enter the wait step on a split vote.
    pub fn two_thirds_any(&self) -> bool {
        self.tallied_power * 3 > self.validators.total_voting_power() * 2
    }

    /// Aggregate the precommit signatures for the quorum block into a
    /// commit. Only the votes for that exact block contribute.
    pub fn make_commit(&self) -> Result<Commit, VoteSetError> {
        debug_assert_eq!(self.kind, VoteType::Precommit);
        let block_id = self.two_thirds_block().ok_or(VoteSetError::NoQuorum)?;
        if block_id.is_zero() {
            return Err(VoteSetError::NoQuorum);
        }
        let mut bitfield = SignerBitfield::new(self.validators.len());
        let mut signatures = Vec::new();
        for (index, slot) in self.votes.iter().enumerate() {
            if let Some(vote) = slot {
                if vote.block_id == block_id {
                    bitfield.set(index);
                    signatures.push(vote.signature);
                }
            }
        }
        let signature = Signature::aggregate(&signatures)
            .map_err(|e| VoteSetError::Aggregation(e.to_string()))?;
        Ok(Commit::new(
            block_id,
            self.height,
            self.round,
            signature,
            bitfield,
        ))
    }
}

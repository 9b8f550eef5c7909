//! Commit-reveal votes for the next epoch's roster.
//!
//! A validator candidate first commits to `H(address || pubkey || amount ||
//! salt)` on chain, then reveals the tuple in a later transaction. Only
//! revealed votes influence the dry-run roster computation; commitments that
//! are never revealed simply expire with the epoch.

use neatcon_types::{Address, Hash, PublicKey};
use sbor::prelude::*;
use std::cmp::Ordering;

/// The commitment hash a vote must reveal to.
pub fn vote_hash(address: &Address, public_key: &PublicKey, amount: u128, salt: &str) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(address.as_bytes());
    hasher.update(&public_key.0);
    hasher.update(&amount.to_be_bytes());
    hasher.update(salt.as_bytes());
    Hash::from_hash_bytes(hasher.finalize().as_bytes())
}

/// One pending vote to join or adjust the next epoch's roster.
///
/// `public_key`, `amount` and `salt` stay empty until the reveal phase.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct EpochValidatorVote {
    pub address: Address,
    pub public_key: Option<PublicKey>,
    pub amount: u128,
    pub salt: String,
    pub vote_hash: Hash,
    /// Transaction that carried the commitment, for query surfaces.
    pub tx_hash: Hash,
}

impl EpochValidatorVote {
    pub fn is_revealed(&self) -> bool {
        self.public_key.is_some()
    }
}

/// Error mutating the vote set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    #[error("no commitment found for {0}")]
    UnknownVote(Address),
    #[error("revealed tuple does not hash to the commitment from {0}")]
    RevealMismatch(Address),
}

/// All pending votes for one epoch transition, at most one per address.
#[derive(Debug, Clone, Default, PartialEq, Eq, BasicSbor)]
pub struct EpochValidatorVoteSet {
    votes: Vec<EpochValidatorVote>,
}

impl EpochValidatorVoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn votes(&self) -> &[EpochValidatorVote] {
        &self.votes
    }

    /// Commit phase: record a commitment, replacing any previous one from
    /// the same address.
    pub fn store_vote(&mut self, vote: EpochValidatorVote) {
        match self.votes.iter_mut().find(|v| v.address == vote.address) {
            Some(existing) => *existing = vote,
            None => self.votes.push(vote),
        }
    }

    /// Reveal phase: disclose the committed tuple. Fails if there is no
    /// commitment from that address or the tuple hashes differently.
    pub fn reveal_vote(
        &mut self,
        address: &Address,
        public_key: PublicKey,
        amount: u128,
        salt: &str,
    ) -> Result<(), VoteError> {
        let vote = self
            .votes
            .iter_mut()
            .find(|v| v.address == *address)
            .ok_or(VoteError::UnknownVote(*address))?;
        if vote_hash(address, &public_key, amount, salt) != vote.vote_hash {
            return Err(VoteError::RevealMismatch(*address));
        }
        vote.public_key = Some(public_key);
        vote.amount = amount;
        vote.salt = salt.to_string();
        Ok(())
    }

    pub fn vote_by_address(&self, address: &Address) -> Option<&EpochValidatorVote> {
        self.votes.iter().find(|v| v.address == *address)
    }

    /// The revealed votes only, in insertion order.
    pub fn revealed_votes(&self) -> impl Iterator<Item = &EpochValidatorVote> {
        self.votes.iter().filter(|v| v.is_revealed())
    }

    /// Revealed votes ranked by the roster tie-break: descending amount,
    /// then ascending raw-byte address. Addresses are unique per set, so
    /// this is a total order.
    pub fn ranked_votes(&self) -> Vec<&EpochValidatorVote> {
        let mut ranked: Vec<&EpochValidatorVote> = self.revealed_votes().collect();
        ranked.sort_by(|a, b| compare_votes(a, b));
        ranked
    }
}

/// Roster tie-break comparator.
pub fn compare_votes(a: &EpochValidatorVote, b: &EpochValidatorVote) -> Ordering {
    b.amount
        .cmp(&a.amount)
        .then_with(|| a.address.cmp(&b.address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neatcon_types::keypair_from_seed;

    fn committed_vote(seed: u64, amount: u128, salt: &str) -> (EpochValidatorVote, PublicKey) {
        let kp = keypair_from_seed(seed);
        let address = Address::from_public_key(&kp.public_key());
        let vote = EpochValidatorVote {
            address,
            public_key: None,
            amount: 0,
            salt: String::new(),
            vote_hash: vote_hash(&address, &kp.public_key(), amount, salt),
            tx_hash: Hash::from_bytes(&seed.to_le_bytes()),
        };
        (vote, kp.public_key())
    }

    #[test]
    fn reveal_matches_commitment() {
        let (vote, key) = committed_vote(1, 100, "pepper");
        let address = vote.address;
        let mut set = EpochValidatorVoteSet::new();
        set.store_vote(vote);

        // Wrong amount is rejected, the commitment stays unrevealed.
        assert_eq!(
            set.reveal_vote(&address, key, 99, "pepper"),
            Err(VoteError::RevealMismatch(address))
        );
        assert!(!set.vote_by_address(&address).unwrap().is_revealed());

        set.reveal_vote(&address, key, 100, "pepper").unwrap();
        let revealed = set.vote_by_address(&address).unwrap();
        assert!(revealed.is_revealed());
        assert_eq!(revealed.amount, 100);
        assert_eq!(revealed.salt, "pepper");
    }

    #[test]
    fn reveal_without_commitment_fails() {
        let kp = keypair_from_seed(9);
        let address = Address::from_public_key(&kp.public_key());
        let mut set = EpochValidatorVoteSet::new();
        assert_eq!(
            set.reveal_vote(&address, kp.public_key(), 1, "s"),
            Err(VoteError::UnknownVote(address))
        );
    }

    #[test]
    fn recommit_replaces_previous_commitment() {
        let (first, _) = committed_vote(1, 100, "a");
        let (second, key) = committed_vote(1, 200, "b");
        let address = first.address;
        let mut set = EpochValidatorVoteSet::new();
        set.store_vote(first);
        set.store_vote(second);
        assert_eq!(set.len(), 1);

        // Only the latest commitment can be revealed.
        assert!(set.reveal_vote(&address, key, 100, "a").is_err());
        set.reveal_vote(&address, key, 200, "b").unwrap();
    }

    #[test]
    fn ranking_is_amount_desc_then_address_asc() {
        let mut set = EpochValidatorVoteSet::new();
        let mut keys = Vec::new();
        for (seed, amount) in [(1u64, 50u128), (2, 100), (3, 50), (4, 100)] {
            let (vote, key) = committed_vote(seed, amount, "s");
            keys.push((vote.address, key, amount));
            set.store_vote(vote);
        }
        for (address, key, amount) in &keys {
            set.reveal_vote(address, *key, *amount, "s").unwrap();
        }

        let ranked = set.ranked_votes();
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            assert!(
                pair[0].amount > pair[1].amount
                    || (pair[0].amount == pair[1].amount && pair[0].address < pair[1].address)
            );
        }
    }

    #[test]
    fn unrevealed_votes_are_not_ranked() {
        let (vote, _) = committed_vote(1, 100, "s");
        let mut set = EpochValidatorVoteSet::new();
        set.store_vote(vote);
        assert!(set.ranked_votes().is_empty());
    }
}

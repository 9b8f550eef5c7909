//! Dry-run roster computation.
//!
//! A pure function from (current roster, revealed votes, chain state) to the
//! next roster. Nothing is persisted; rotation later applies the same
//! computation for real. Every node must reach the same roster from the same
//! inputs, so iteration order and tie-breaks are fixed.

use crate::vote_set::EpochValidatorVoteSet;
use neatcon_types::{Address, Validator, ValidatorSet};

/// Read-only view of chain state the dry run needs.
pub trait ChainState {
    /// The amount the address has deposited to back its roster membership.
    fn deposit_balance(&self, address: &Address) -> u128;
}

/// Failure resolving votes against chain state. Fatal to rotation; the
/// caller must halt participation rather than guess a roster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DryRunError {
    #[error("{address} voted {amount} but has only {balance} deposited")]
    InsufficientDeposit {
        address: Address,
        amount: u128,
        balance: u128,
    },
    #[error("roster would be empty after applying votes")]
    EmptyRoster,
}

/// Apply the revealed votes to a copy of the roster.
///
/// A vote with a positive amount joins or re-weights the validator (power =
/// amount, checked against the deposit balance); a zero amount removes it.
/// When more than `max_validators` remain, the lowest-ranked entries (power
/// descending, then address ascending) are dropped.
pub fn dry_run_update_validator_set(
    state: &dyn ChainState,
    validators: &ValidatorSet,
    vote_set: Option<&EpochValidatorVoteSet>,
    max_validators: usize,
) -> Result<ValidatorSet, DryRunError> {
    let mut next = validators.clone();
    if let Some(votes) = vote_set {
        for vote in votes.ranked_votes() {
            let Some(public_key) = vote.public_key else {
                continue;
            };
            if vote.amount == 0 {
                next.remove(&vote.address);
                continue;
            }
            let balance = state.deposit_balance(&vote.address);
            if balance < vote.amount {
                return Err(DryRunError::InsufficientDeposit {
                    address: vote.address,
                    amount: vote.amount,
                    balance,
                });
            }
            next.upsert(Validator::new(public_key, vote.amount));
        }
    }
    if next.is_empty() {
        return Err(DryRunError::EmptyRoster);
    }
    if next.len() > max_validators {
        let mut ranked: Vec<Validator> = next.validators().to_vec();
        ranked.sort_by(|a, b| {
            b.voting_power
                .cmp(&a.voting_power)
                .then_with(|| a.address.cmp(&b.address))
        });
        ranked.truncate(max_validators);
        next = ValidatorSet::new(ranked).expect("truncating cannot introduce duplicates");
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote_set::{vote_hash, EpochValidatorVote};
    use neatcon_types::{keypair_from_seed, Hash, KeyPair};
    use std::collections::HashMap;

    struct FakeState {
        balances: HashMap<Address, u128>,
    }

    impl ChainState for FakeState {
        fn deposit_balance(&self, address: &Address) -> u128 {
            self.balances.get(address).copied().unwrap_or(0)
        }
    }

    fn roster(seeds: &[u64]) -> ValidatorSet {
        ValidatorSet::new(
            seeds
                .iter()
                .map(|&s| Validator::new(keypair_from_seed(s).public_key(), 10))
                .collect(),
        )
        .unwrap()
    }

    fn revealed(set: &mut EpochValidatorVoteSet, kp: &KeyPair, amount: u128) -> Address {
        let address = Address::from_public_key(&kp.public_key());
        set.store_vote(EpochValidatorVote {
            address,
            public_key: None,
            amount: 0,
            salt: String::new(),
            vote_hash: vote_hash(&address, &kp.public_key(), amount, "s"),
            tx_hash: Hash::ZERO,
        });
        set.reveal_vote(&address, kp.public_key(), amount, "s").unwrap();
        address
    }

    fn state_for(addresses: &[(Address, u128)]) -> FakeState {
        FakeState {
            balances: addresses.iter().copied().collect(),
        }
    }

    #[test]
    fn positive_vote_upserts_with_power_equal_to_amount() {
        let current = roster(&[1, 2]);
        let newcomer = keypair_from_seed(3);
        let mut votes = EpochValidatorVoteSet::new();
        let address = revealed(&mut votes, &newcomer, 25);
        let state = state_for(&[(address, 100)]);

        let next =
            dry_run_update_validator_set(&state, &current, Some(&votes), 10).unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next.by_address(&address).unwrap().voting_power, 25);
        // Inputs are untouched.
        assert_eq!(current.len(), 2);
    }

    #[test]
    fn zero_vote_removes_the_validator() {
        let kp = keypair_from_seed(1);
        let current = roster(&[1, 2]);
        let mut votes = EpochValidatorVoteSet::new();
        let address = revealed(&mut votes, &kp, 0);
        let state = state_for(&[]);

        let next =
            dry_run_update_validator_set(&state, &current, Some(&votes), 10).unwrap();
        assert_eq!(next.len(), 1);
        assert!(!next.has_address(&address));
    }

    #[test]
    fn insufficient_deposit_is_fatal() {
        let current = roster(&[1]);
        let kp = keypair_from_seed(2);
        let mut votes = EpochValidatorVoteSet::new();
        let address = revealed(&mut votes, &kp, 50);
        let state = state_for(&[(address, 49)]);

        assert_eq!(
            dry_run_update_validator_set(&state, &current, Some(&votes), 10),
            Err(DryRunError::InsufficientDeposit {
                address,
                amount: 50,
                balance: 49
            })
        );
    }

    #[test]
    fn roster_cap_drops_lowest_power_first() {
        let current = roster(&[1, 2]); // power 10 each
        let whale = keypair_from_seed(3);
        let mut votes = EpochValidatorVoteSet::new();
        let whale_address = revealed(&mut votes, &whale, 100);
        let state = state_for(&[(whale_address, 100)]);

        let next =
            dry_run_update_validator_set(&state, &current, Some(&votes), 2).unwrap();
        assert_eq!(next.len(), 2);
        assert!(next.has_address(&whale_address));
    }

    #[test]
    fn removing_every_validator_is_an_error() {
        let kp = keypair_from_seed(1);
        let current = roster(&[1]);
        let mut votes = EpochValidatorVoteSet::new();
        revealed(&mut votes, &kp, 0);
        let state = state_for(&[]);

        assert_eq!(
            dry_run_update_validator_set(&state, &current, Some(&votes), 10),
            Err(DryRunError::EmptyRoster)
        );
    }

    #[test]
    fn no_votes_returns_the_same_roster() {
        let current = roster(&[1, 2, 3]);
        let state = state_for(&[]);
        let next = dry_run_update_validator_set(&state, &current, None, 10).unwrap();
        assert_eq!(next, current);
    }
}

//! Validator roster and commit verification.

use crate::crypto::{fast_aggregate_verify, PublicKey};
use crate::commit::Commit;
use crate::hash::Hash;
use crate::identifiers::{Address, VotePower};
use crate::signer_bitfield::SignerBitfield;
use crate::signing::precommit_sign_bytes;
use sbor::prelude::*;
use std::fmt;

/// One consensus validator.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Validator {
    pub address: Address,
    pub public_key: PublicKey,
    pub voting_power: VotePower,
    /// Epochs this validator stays in the roster before its deposit-backed
    /// membership expires (0 = no scheduled exit).
    pub remaining_epoch: u64,
}

impl Validator {
    pub fn new(public_key: PublicKey, voting_power: VotePower) -> Self {
        Self {
            address: Address::from_public_key(&public_key),
            public_key,
            voting_power,
            remaining_epoch: 0,
        }
    }
}

/// Error constructing a validator set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorSetError {
    #[error("duplicate validator address {0}")]
    DuplicateAddress(Address),
}

/// A commit verification failure. Every rejection carries its reason;
/// callers must not treat these as interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("commit is for the nil block")]
    ZeroBlockId,
    #[error("bitfield size {got} does not match validator set size {expected}")]
    BitfieldSizeMismatch { expected: usize, got: usize },
    #[error("bitfield byte storage does not match its declared size")]
    MalformedBitfield,
    #[error("insufficient voting power: signed {signed} of total {total} (need > 2/3)")]
    InsufficientPower { signed: VotePower, total: VotePower },
    #[error("aggregate signature verification failed")]
    InvalidAggregateSignature,
}

/// The signers behind a commit bitfield: their public keys (fold these for
/// the aggregate verification key) and addresses, in validator order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSigners {
    pub public_keys: Vec<PublicKey>,
    pub addresses: Vec<Address>,
    pub signed_power: VotePower,
}

/// An address-sorted roster of validators with weighted voting power.
///
/// The order is canonical (ascending raw-byte address) so that bitfield
/// indices mean the same thing on every node.
#[derive(Debug, Clone, Default, PartialEq, Eq, BasicSbor)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    /// Build a set, sorting by address. Duplicate addresses are an error.
    pub fn new(mut validators: Vec<Validator>) -> Result<Self, ValidatorSetError> {
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        for pair in validators.windows(2) {
            if pair[0].address == pair[1].address {
                return Err(ValidatorSetError::DuplicateAddress(pair[0].address));
            }
        }
        Ok(Self { validators })
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn total_voting_power(&self) -> VotePower {
        self.validators.iter().map(|v| v.voting_power).sum()
    }

    pub fn has_address(&self, address: &Address) -> bool {
        self.index_of(address).is_some()
    }

    pub fn by_address(&self, address: &Address) -> Option<&Validator> {
        self.index_of(address).map(|i| &self.validators[i])
    }

    /// Position of an address in canonical order.
    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.validators
            .binary_search_by(|v| v.address.cmp(address))
            .ok()
    }

    pub fn get(&self, index: usize) -> Option<&Validator> {
        self.validators.get(index)
    }

    /// Deterministic hash of the roster (canonical encoding).
    pub fn hash(&self) -> Hash {
        let encoded = sbor::basic_encode(self)
            .expect("validator set encoding is infallible for valid fields");
        Hash::from_bytes(&encoded)
    }

    /// Replace or insert a validator, keeping canonical order.
    pub fn upsert(&mut self, validator: Validator) {
        match self
            .validators
            .binary_search_by(|v| v.address.cmp(&validator.address))
        {
            Ok(i) => self.validators[i] = validator,
            Err(i) => self.validators.insert(i, validator),
        }
    }

    /// Remove a validator by address. Returns whether it was present.
    pub fn remove(&mut self, address: &Address) -> bool {
        match self.index_of(address) {
            Some(i) => {
                self.validators.remove(i);
                true
            }
            None => false,
        }
    }

    /// Resolve the signers behind a bitfield.
    ///
    /// Fails if the bitfield was built against a different-sized set; the
    /// addresses come out in validator order, exactly the set bits.
    pub fn aggregate_signers(
        &self,
        bitfield: &SignerBitfield,
    ) -> Result<CommitSigners, CommitError> {
        if bitfield.size() != self.len() {
            return Err(CommitError::BitfieldSizeMismatch {
                expected: self.len(),
                got: bitfield.size(),
            });
        }
        if !bitfield.is_well_formed() {
            return Err(CommitError::MalformedBitfield);
        }
        let mut public_keys = Vec::with_capacity(bitfield.count());
        let mut addresses = Vec::with_capacity(bitfield.count());
        let mut signed_power: VotePower = 0;
        for index in bitfield.iter_set() {
            let validator = &self.validators[index];
            public_keys.push(validator.public_key);
            addresses.push(validator.address);
            signed_power += validator.voting_power;
        }
        Ok(CommitSigners {
            public_keys,
            addresses,
            signed_power,
        })
    }

    /// Whether `signed` power exceeds 2/3 of the set's total power.
    pub fn has_quorum(&self, signed: VotePower) -> bool {
        signed * 3 > self.total_voting_power() * 2
    }

    /// Verify that a commit was produced by this validator set and meets
    /// quorum.
    ///
    /// Checks, in order: non-nil block id, bitfield shape, power-weighted
    /// quorum (> 2/3 of total, not a signer count), and the aggregate BLS
    /// signature against the canonical precommit sign-bytes.
    pub fn verify_commit(
        &self,
        chain_id: &str,
        height: u64,
        commit: &Commit,
    ) -> Result<(), CommitError> {
        if commit.block_id.is_zero() {
            return Err(CommitError::ZeroBlockId);
        }
        let signers = self.aggregate_signers(&commit.bitfield)?;
        if !self.has_quorum(signers.signed_power) {
            return Err(CommitError::InsufficientPower {
                signed: signers.signed_power,
                total: self.total_voting_power(),
            });
        }
        let message = precommit_sign_bytes(chain_id, height, commit.round, &commit.block_id);
        if !fast_aggregate_verify(&message, &signers.public_keys, &commit.signature) {
            return Err(CommitError::InvalidAggregateSignature);
        }
        Ok(())
    }
}

impl fmt::Display for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorSet[{}]{{", self.len())?;
        for v in &self.validators {
            write!(f, " {}:{}", v.address, v.voting_power)?;
        }
        write!(f, " }}")
    }
}

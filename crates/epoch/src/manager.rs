//! The epoch lifecycle manager.
//!
//! Owns the locally current epoch and the proposed next one. Query paths
//! (API, validation) read concurrently with the round driver's mutations,
//! so both live behind one `RwLock`; every mutation persists before the
//! lock is released, keeping the store authoritative across restarts.

use crate::dry_run::{dry_run_update_validator_set, ChainState, DryRunError};
use crate::epoch::{
    load_epoch, save_epoch, update_epoch_end_time, Epoch, EpochDecodeError, EpochDoc, EpochStatus,
    GenesisError,
};
use crate::reward_scheme::{RewardScheme, RewardSchemeDoc};
use crate::store::{KvStore, StoreError};
use crate::vote_set::{EpochValidatorVote, EpochValidatorVoteSet, VoteError};
use neatcon_types::{Address, PublicKey, ValidatorSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Height at which a fresh chain processes its first epoch announcement.
pub const BOOTSTRAP_HEIGHT: u64 = 2;

/// Storage key for the number of the locally current epoch.
const CURRENT_EPOCH_KEY: &[u8] = b"EPOCH:CURRENT";

/// Errors from epoch lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EpochError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Decode(#[from] EpochDecodeError),
    #[error(transparent)]
    Genesis(#[from] GenesisError),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("candidate epoch {candidate} does not follow current epoch {current}")]
    NonSequentialNumber { current: u64, candidate: u64 },
    #[error("no next epoch is known")]
    NoNextEpoch,
    #[error("epoch {0} is Saved and immutable")]
    Immutable(u64),
    #[error("dry-run roster computation failed: {0}")]
    DryRunFailed(#[from] DryRunError),
    #[error("current epoch pointer is missing or corrupt")]
    MissingCurrentEpoch,
}

struct Inner {
    current: Epoch,
    next: Option<Epoch>,
}

/// Creates, persists, and rotates epoch records.
pub struct EpochManager {
    store: Arc<dyn KvStore>,
    max_validators: usize,
    inner: RwLock<Inner>,
}

impl EpochManager {
    /// Restore from the store, or bootstrap from the genesis documents on
    /// first start.
    pub fn load_or_init(
        store: Arc<dyn KvStore>,
        epoch_doc: &EpochDoc,
        reward_doc: &RewardSchemeDoc,
        max_validators: usize,
    ) -> Result<Self, EpochError> {
        let current = match store.get(CURRENT_EPOCH_KEY)? {
            Some(bytes) => {
                let number = decode_number(&bytes).ok_or(EpochError::MissingCurrentEpoch)?;
                load_epoch(store.as_ref(), number).ok_or(EpochError::MissingCurrentEpoch)?
            }
            None => {
                let genesis = Epoch::genesis(epoch_doc)?;
                save_epoch(store.as_ref(), &genesis)?;
                RewardScheme::from_doc(reward_doc).save(store.as_ref())?;
                store.put(CURRENT_EPOCH_KEY, &genesis.number.to_be_bytes())?;
                info!(number = genesis.number, "bootstrapped genesis epoch");
                genesis
            }
        };
        let next = load_epoch(store.as_ref(), current.number + 1);
        Ok(Self {
            store,
            max_validators,
            inner: RwLock::new(Inner { current, next }),
        })
    }

    pub fn current(&self) -> Epoch {
        self.read().current.clone()
    }

    pub fn current_number(&self) -> u64 {
        self.read().current.number
    }

    pub fn next(&self) -> Option<Epoch> {
        self.read().next.clone()
    }

    pub fn max_validators(&self) -> usize {
        self.max_validators
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// The validator set authoritative at `height`, if known locally.
    ///
    /// `None` is the retryable "epoch unavailable" condition, not a
    /// validation failure: the height may belong to an epoch this node has
    /// not learned yet.
    pub fn epoch_for_height(&self, height: u64) -> Option<Epoch> {
        let inner = self.read();
        if inner.current.contains(height) {
            return Some(inner.current.clone());
        }
        if let Some(next) = &inner.next {
            if next.contains(height) {
                return Some(next.clone());
            }
        }
        if height < inner.current.start_block {
            let mut number = inner.current.number;
            while number > 0 {
                number -= 1;
                let epoch = load_epoch(self.store.as_ref(), number)?;
                if epoch.contains(height) {
                    return Some(epoch);
                }
                if height > epoch.end_block {
                    return None;
                }
            }
            None
        } else {
            let mut number = inner
                .next
                .as_ref()
                .map(|n| n.number)
                .unwrap_or(inner.current.number);
            loop {
                number += 1;
                let epoch = load_epoch(self.store.as_ref(), number)?;
                if epoch.contains(height) {
                    return Some(epoch);
                }
                if height < epoch.start_block {
                    return None;
                }
            }
        }
    }

    /// Attach a proposed next epoch. Valid only for `current.number + 1`.
    pub fn set_next_epoch(&self, candidate: Epoch) -> Result<(), EpochError> {
        let mut inner = self.write();
        if candidate.number != inner.current.number + 1 {
            return Err(EpochError::NonSequentialNumber {
                current: inner.current.number,
                candidate: candidate.number,
            });
        }
        save_epoch(self.store.as_ref(), &candidate)?;
        inner.next = Some(candidate);
        Ok(())
    }

    /// Propose the successor epoch from the current one: same roster, the
    /// following height range, status `ProposedNotVoted`.
    pub fn propose_next_epoch(&self, start_time_ms: u64) -> Result<Epoch, EpochError> {
        let mut inner = self.write();
        let current = &inner.current;
        let length = current.end_block - current.start_block + 1;
        let candidate = Epoch {
            number: current.number + 1,
            start_block: current.end_block + 1,
            end_block: current.end_block + length,
            start_time_ms,
            end_time_ms: 0,
            status: EpochStatus::ProposedNotVoted,
            validators: current.validators.clone(),
            validator_vote_set: Some(EpochValidatorVoteSet::new()),
        };
        save_epoch(self.store.as_ref(), &candidate)?;
        debug!(number = candidate.number, "proposed next epoch");
        inner.next = Some(candidate.clone());
        Ok(candidate)
    }

    /// Finalize the next epoch's roster.
    pub fn finalize_next_epoch(&self, roster: ValidatorSet) -> Result<(), EpochError> {
        let mut inner = self.write();
        let next = inner.next.as_mut().ok_or(EpochError::NoNextEpoch)?;
        if next.status == EpochStatus::Saved {
            return Err(EpochError::Immutable(next.number));
        }
        next.validators = roster;
        next.status = EpochStatus::VotedNotSaved;
        save_epoch(self.store.as_ref(), next)?;
        Ok(())
    }

    /// Process the epoch announcement a committed block carried.
    ///
    /// An announcement of `current + 1` installs the next epoch right after
    /// the current epoch started (or at the bootstrap height) and finalizes
    /// its roster at `end_block`. An announcement of the current number
    /// adopts the proposer's start time and backfills the previous epoch's
    /// end time, keeping adjacent time windows consistent across nodes.
    pub fn apply_block_announcement(
        &self,
        block_height: u64,
        announced: &Epoch,
    ) -> Result<(), EpochError> {
        let mut inner = self.write();
        let current_number = inner.current.number;
        if announced.number == current_number + 1 {
            if block_height == inner.current.start_block + 1 || block_height == BOOTSTRAP_HEIGHT {
                let mut next = announced.clone();
                next.status = EpochStatus::VotedNotSaved;
                save_epoch(self.store.as_ref(), &next)?;
                save_epoch(self.store.as_ref(), &inner.current)?;
                info!(number = next.number, height = block_height, "installed next epoch");
                inner.next = Some(next);
            } else if block_height == inner.current.end_block {
                let next = inner.next.as_mut().ok_or(EpochError::NoNextEpoch)?;
                next.validators = announced.validators.clone();
                next.status = EpochStatus::VotedNotSaved;
                save_epoch(self.store.as_ref(), next)?;
                info!(number = next.number, "finalized next epoch roster");
            } else {
                debug!(
                    height = block_height,
                    announced = announced.number,
                    "ignoring next-epoch announcement outside transition heights"
                );
            }
        } else if announced.number == current_number {
            inner.current.start_time_ms = announced.start_time_ms;
            save_epoch(self.store.as_ref(), &inner.current)?;
            if current_number > 0 {
                update_epoch_end_time(
                    self.store.as_ref(),
                    current_number - 1,
                    announced.start_time_ms,
                )?;
            }
        } else {
            warn!(
                announced = announced.number,
                current = current_number,
                "ignoring announcement for unrelated epoch"
            );
        }
        Ok(())
    }

    /// Dry-run recompute of the next roster, one block before the epoch
    /// ends. The result replaces the next epoch's roster, and the return
    /// value tells the caller whether the local key is in it (the signal to
    /// start participating).
    ///
    /// A dry-run failure is fatal to rotation: the caller must halt
    /// participation rather than guess a roster.
    pub fn prepare_rotation(
        &self,
        chain_state: &dyn ChainState,
        local_address: &Address,
    ) -> Result<bool, EpochError> {
        let mut inner = self.write();
        let roster = dry_run_update_validator_set(
            chain_state,
            &inner.current.validators,
            inner.current.validator_vote_set.as_ref(),
            self.max_validators,
        )?;
        let participating = roster.has_address(local_address);
        if let Some(next) = inner.next.as_mut() {
            if next.status != EpochStatus::Saved {
                next.validators = roster;
                next.status = EpochStatus::VotedNotSaved;
                save_epoch(self.store.as_ref(), next)?;
            }
        }
        Ok(participating)
    }

    /// Make the next epoch current. Called at `end_block + 1`; never
    /// implicit — saving a next epoch does not rotate.
    pub fn rotate(&self) -> Result<Epoch, EpochError> {
        let mut inner = self.write();
        let mut next = inner.next.take().ok_or(EpochError::NoNextEpoch)?;
        next.status = EpochStatus::Saved;
        next.validator_vote_set
            .get_or_insert_with(EpochValidatorVoteSet::new);
        save_epoch(self.store.as_ref(), &next)?;
        self.store
            .put(CURRENT_EPOCH_KEY, &next.number.to_be_bytes())?;
        info!(number = next.number, "rotated to next epoch");
        inner.current = next;
        Ok(inner.current.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("epoch lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("epoch lock poisoned")
    }
}

/// Epoch-vote application, consumed by the transaction layer when it
/// decodes epoch-related transactions.
pub trait EpochVoteApplier: Send + Sync {
    /// Commit phase: record a vote commitment for the next roster.
    fn vote_next_epoch(&self, vote: EpochValidatorVote) -> Result<(), EpochError>;
    /// Reveal phase: disclose a previously committed tuple.
    fn reveal_vote(
        &self,
        address: &Address,
        public_key: PublicKey,
        amount: u128,
        salt: &str,
    ) -> Result<(), EpochError>;
    /// Replace the next epoch's roster wholesale.
    fn update_next_epoch(&self, roster: ValidatorSet) -> Result<(), EpochError>;
}

impl EpochVoteApplier for EpochManager {
    fn vote_next_epoch(&self, vote: EpochValidatorVote) -> Result<(), EpochError> {
        let mut inner = self.write();
        inner
            .current
            .validator_vote_set
            .get_or_insert_with(EpochValidatorVoteSet::new)
            .store_vote(vote);
        save_epoch(self.store.as_ref(), &inner.current)?;
        Ok(())
    }

    fn reveal_vote(
        &self,
        address: &Address,
        public_key: PublicKey,
        amount: u128,
        salt: &str,
    ) -> Result<(), EpochError> {
        let mut inner = self.write();
        inner
            .current
            .validator_vote_set
            .get_or_insert_with(EpochValidatorVoteSet::new)
            .reveal_vote(address, public_key, amount, salt)?;
        save_epoch(self.store.as_ref(), &inner.current)?;
        Ok(())
    }

    fn update_next_epoch(&self, roster: ValidatorSet) -> Result<(), EpochError> {
        self.finalize_next_epoch(roster)
    }
}

fn decode_number(bytes: &[u8]) -> Option<u64> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(array))
}

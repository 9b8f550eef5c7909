//! Epoch lifecycle management for NeatCon.
//!
//! An epoch is a contiguous range of block heights governed by one fixed
//! validator roster. This crate owns the epoch records, their persistence,
//! the commit-reveal voting that shapes the next roster, and the dry-run
//! computation that every node runs to agree on it.
//!
//! The [`EpochManager`] is the one mutator; query paths read concurrently
//! through its `RwLock`. The persistent store is the source of truth: every
//! mutation is written through before it becomes visible.

mod dry_run;
mod epoch;
mod manager;
mod reward_scheme;
mod store;
mod vote_set;

pub use dry_run::{dry_run_update_validator_set, ChainState, DryRunError};
pub use epoch::{
    epoch_key, load_epoch, save_epoch, update_epoch_end_time, Epoch, EpochDecodeError, EpochDoc,
    EpochStatus, GenesisError, ValidatorDoc, EPOCH_KEY_PREFIX,
};
pub use manager::{EpochError, EpochManager, EpochVoteApplier, BOOTSTRAP_HEIGHT};
pub use reward_scheme::{RewardScheme, RewardSchemeDoc, REWARD_SCHEME_KEY};
pub use store::{KvStore, MemoryStore, StoreError};
pub use vote_set::{
    compare_votes, vote_hash, EpochValidatorVote, EpochValidatorVoteSet, VoteError,
};

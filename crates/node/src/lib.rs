//! Production node assembly for NeatCon.
//!
//! Wires the deterministic round driver to real I/O: a RocksDB-backed
//! store, a tokio event loop, and the read-only query surface an RPC
//! layer exposes.

mod query;
mod runner;
mod storage;

pub use query::{
    compute_vote_hash, BlockExtraView, CommitView, EpochView, EpochVoteView, EpochVotesView,
    QueryError, QueryService, ValidatorView,
};
pub use runner::{
    block_key, load_block, load_last_state, Runner, RunnerError, RunnerHandle, ShutdownHandle,
};
pub use storage::{RocksDbStore, StorageError};

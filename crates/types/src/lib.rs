//! Core types for NeatCon consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, BLS keys and signatures
//! - **Identifiers**: Address, voting power
//! - **Consensus types**: BlockId, PartSet, Commit, Validator/ValidatorSet
//! - **Block envelope**: the consensus metadata carried with every block
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod crypto;
mod hash;
mod identifiers;
mod signing;

// Consensus types
mod block;
mod block_id;
mod commit;
mod part_set;
mod signer_bitfield;
mod validator;

pub use crypto::{
    fast_aggregate_verify, keypair_from_seed, verify_signature, AggregateError, KeyPair,
    PublicKey, Signature,
};
pub use hash::{compute_merkle_root, Hash, HexError};
pub use identifiers::{Address, VotePower};
pub use signing::{
    prevote_sign_bytes, precommit_sign_bytes, proposal_sign_bytes, DOMAIN_PRECOMMIT,
    DOMAIN_PREVOTE, DOMAIN_PROPOSAL,
};

pub use block::{
    BlockError, BlockExtra, ConsensusBlock, CrossChainProof, DEFAULT_PART_SIZE, MAX_BLOCK_SIZE,
};
pub use block_id::{BlockId, PartSetHeader};
pub use commit::Commit;
pub use part_set::{Part, PartSet, PartSetError};
pub use signer_bitfield::SignerBitfield;
pub use validator::{CommitError, CommitSigners, Validator, ValidatorSet, ValidatorSetError};

//! Read-only query surface.
//!
//! Serde view types over the live epoch state and over committed block
//! envelopes, with binary values rendered as hex strings. This is what an
//! RPC layer would serialize back to callers; nothing here mutates.

use neatcon_epoch::{
    dry_run_update_validator_set, load_epoch, vote_hash, ChainState, DryRunError, Epoch,
    EpochManager, EpochStatus, EpochValidatorVote,
};
use neatcon_types::{Address, BlockExtra, Commit, CommitError, HexError, PublicKey, Validator};
use serde::Serialize;
use std::sync::Arc;

/// Error from a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("epoch {0} is not known")]
    UnknownEpoch(u64),
    #[error("no commit in the given block envelope")]
    NoCommit,
    #[error(transparent)]
    Hex(#[from] HexError),
    #[error("malformed input: {0}")]
    Decode(String),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    DryRun(#[from] DryRunError),
}

#[derive(Debug, Serialize)]
pub struct ValidatorView {
    pub address: String,
    pub public_key: String,
    pub voting_power: u128,
    pub remaining_epoch: u64,
}

impl From<&Validator> for ValidatorView {
    fn from(v: &Validator) -> Self {
        Self {
            address: v.address.to_hex(),
            public_key: v.public_key.to_hex(),
            voting_power: v.voting_power,
            remaining_epoch: v.remaining_epoch,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EpochView {
    pub number: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub status: &'static str,
    pub validators: Vec<ValidatorView>,
}

impl From<&Epoch> for EpochView {
    fn from(epoch: &Epoch) -> Self {
        Self {
            number: epoch.number,
            start_block: epoch.start_block,
            end_block: epoch.end_block,
            start_time_ms: epoch.start_time_ms,
            end_time_ms: epoch.end_time_ms,
            status: match epoch.status {
                EpochStatus::ProposedNotVoted => "proposed_not_voted",
                EpochStatus::VotedNotSaved => "voted_not_saved",
                EpochStatus::Saved => "saved",
            },
            validators: epoch.validators.validators().iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EpochVoteView {
    pub address: String,
    /// Present once the vote has been revealed.
    pub public_key: Option<String>,
    pub amount: u128,
    pub salt: String,
    pub vote_hash: String,
    pub tx_hash: String,
}

impl From<&EpochValidatorVote> for EpochVoteView {
    fn from(vote: &EpochValidatorVote) -> Self {
        Self {
            address: vote.address.to_hex(),
            public_key: vote.public_key.as_ref().map(|pk| pk.to_hex()),
            amount: vote.amount,
            salt: vote.salt.clone(),
            vote_hash: vote.vote_hash.to_hex(),
            tx_hash: vote.tx_hash.to_hex(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EpochVotesView {
    /// The epoch the votes elect, one past the collecting epoch.
    pub epoch_number: u64,
    pub votes: Vec<EpochVoteView>,
}

#[derive(Debug, Serialize)]
pub struct CommitView {
    pub height: u64,
    pub round: u64,
    pub block_hash: String,
    pub signature: String,
    pub bitfield: String,
}

impl From<&Commit> for CommitView {
    fn from(commit: &Commit) -> Self {
        Self {
            height: commit.height,
            round: commit.round,
            block_hash: hex::encode(&commit.block_id.hash),
            signature: hex::encode(commit.signature.0),
            bitfield: commit.bitfield.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlockExtraView {
    pub chain_id: String,
    pub height: u64,
    pub time_ms: u64,
    pub epoch_number: u64,
    pub validators_hash: String,
    pub payload_hash: String,
    pub seen_commit: Option<CommitView>,
}

impl From<&BlockExtra> for BlockExtraView {
    fn from(extra: &BlockExtra) -> Self {
        Self {
            chain_id: extra.chain_id.clone(),
            height: extra.height,
            time_ms: extra.time_ms,
            epoch_number: extra.epoch_number,
            validators_hash: extra.validators_hash.to_hex(),
            payload_hash: extra.payload_hash.to_hex(),
            seen_commit: extra.seen_commit.as_ref().map(Into::into),
        }
    }
}

/// Read-only queries over the epoch state.
pub struct QueryService {
    epochs: Arc<EpochManager>,
}

impl QueryService {
    pub fn new(epochs: Arc<EpochManager>) -> Self {
        Self { epochs }
    }

    pub fn current_epoch_number(&self) -> u64 {
        self.epochs.current_number()
    }

    /// A numbered epoch: current, next, or anything saved in the store.
    pub fn epoch(&self, number: u64) -> Result<EpochView, QueryError> {
        self.lookup_epoch(number)
            .map(|e| EpochView::from(&e))
            .ok_or(QueryError::UnknownEpoch(number))
    }

    /// The commit-reveal votes collected for the next epoch's roster.
    pub fn next_epoch_votes(&self) -> EpochVotesView {
        let current = self.epochs.current();
        let votes = current
            .validator_vote_set
            .as_ref()
            .map(|set| set.votes().iter().map(Into::into).collect())
            .unwrap_or_default();
        EpochVotesView {
            epoch_number: current.number + 1,
            votes,
        }
    }

    /// What the next roster would be if rotation happened now: the current
    /// roster with all revealed votes applied, capped and balance-checked.
    pub fn next_epoch_validators(
        &self,
        chain_state: &dyn ChainState,
    ) -> Result<Vec<ValidatorView>, QueryError> {
        let current = self.epochs.current();
        let roster = dry_run_update_validator_set(
            chain_state,
            &current.validators,
            current.validator_vote_set.as_ref(),
            self.epochs.max_validators(),
        )?;
        Ok(roster.validators().iter().map(Into::into).collect())
    }

    /// Decode a hex-encoded block envelope into its view.
    pub fn decode_extra(&self, extra_hex: &str) -> Result<BlockExtraView, QueryError> {
        let bytes = hex::decode(extra_hex.trim_start_matches("0x"))
            .map_err(|e| QueryError::Decode(e.to_string()))?;
        let extra: BlockExtra =
            sbor::basic_decode(&bytes).map_err(|e| QueryError::Decode(format!("{e:?}")))?;
        Ok(BlockExtraView::from(&extra))
    }

    /// The public keys behind a block's seen commit, in bitfield order.
    ///
    /// The roster is resolved from the commit's height; an epoch this node
    /// has never seen is an error, not an empty list.
    pub fn commit_public_keys(&self, extra: &BlockExtra) -> Result<Vec<String>, QueryError> {
        let commit = extra.seen_commit.as_ref().ok_or(QueryError::NoCommit)?;
        let epoch = self
            .epochs
            .epoch_for_height(commit.height)
            .ok_or(QueryError::UnknownEpoch(extra.epoch_number))?;
        let signers = epoch.validators.aggregate_signers(&commit.bitfield)?;
        Ok(signers.public_keys.iter().map(|pk| pk.to_hex()).collect())
    }

    fn lookup_epoch(&self, number: u64) -> Option<Epoch> {
        let current = self.epochs.current();
        if current.number == number {
            return Some(current);
        }
        if let Some(next) = self.epochs.next() {
            if next.number == number {
                return Some(next);
            }
        }
        load_epoch(self.epochs.store().as_ref(), number)
    }
}

/// The commitment a validator publishes in the vote phase. Mirrors the
/// hash the epoch manager checks at reveal time.
pub fn compute_vote_hash(
    from: &str,
    public_key: &str,
    amount: u128,
    salt: &str,
) -> Result<String, QueryError> {
    let address = Address::from_hex(from)?;
    let public_key = PublicKey::from_hex(public_key)?;
    Ok(vote_hash(&address, &public_key, amount, salt).to_hex())
}

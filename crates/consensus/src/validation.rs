//! Block validation against the authoritative epoch.

use neatcon_epoch::EpochManager;
use neatcon_types::{BlockError, BlockExtra, CommitError, ConsensusBlock};

/// Why a candidate block was not accepted.
///
/// `EpochUnavailable` is the one retryable variant: the epoch for the
/// height may simply not be known locally yet. Everything else is a
/// permanent structural rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("epoch for height {0} is not yet known locally")]
    EpochUnavailable(u64),
    #[error("seen commit rejected: {0}")]
    Commit(#[from] CommitError),
}

impl ValidationError {
    /// Whether the caller should retry once the local chain catches up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ValidationError::EpochUnavailable(_))
    }
}

/// Validate a candidate block against its predecessor's envelope.
///
/// Structural checks first, then the seen commit is verified against the
/// validator set authoritative for the previous height. Nothing here
/// panics; every rejection carries its reason.
pub fn validate_block(
    candidate: &ConsensusBlock,
    prev: &BlockExtra,
    epochs: &EpochManager,
) -> Result<(), ValidationError> {
    candidate.validate_basic(prev)?;
    let epoch = epochs
        .epoch_for_height(prev.height)
        .ok_or(ValidationError::EpochUnavailable(prev.height))?;
    // validate_basic guarantees the commit is present above the first block.
    if let Some(commit) = &candidate.extra.seen_commit {
        epoch
            .validators
            .verify_commit(&prev.chain_id, prev.height, commit)?;
    }
    Ok(())
}

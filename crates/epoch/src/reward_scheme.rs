//! Reward scheme parameters.
//!
//! Written once at genesis, read by reward distribution. The epoch layer
//! only owns its persistence.

use crate::store::{KvStore, StoreError};
use sbor::prelude::*;
use serde::{Deserialize, Serialize};

/// Fixed storage key for the reward scheme.
pub const REWARD_SCHEME_KEY: &[u8] = b"REWARDSCHEME";

/// Immutable reward parameters for the whole chain lifetime.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct RewardScheme {
    pub total_reward: u128,
    pub reward_first_year: u128,
    pub epoch_number_per_year: u64,
    pub total_year: u64,
}

/// Genesis document form of the reward scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSchemeDoc {
    pub total_reward: u128,
    pub reward_first_year: u128,
    pub epoch_number_per_year: u64,
    pub total_year: u64,
}

impl RewardScheme {
    pub fn from_doc(doc: &RewardSchemeDoc) -> Self {
        Self {
            total_reward: doc.total_reward,
            reward_first_year: doc.reward_first_year,
            epoch_number_per_year: doc.epoch_number_per_year,
            total_year: doc.total_year,
        }
    }

    /// Load from the store. Absent and corrupt both come back as `None`;
    /// corruption is logged, never silently replaced with defaults.
    pub fn load(store: &dyn KvStore) -> Option<RewardScheme> {
        let bytes = match store.get(REWARD_SCHEME_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!(error = %e, "failed to read reward scheme");
                return None;
            }
        };
        match sbor::basic_decode(&bytes) {
            Ok(scheme) => Some(scheme),
            Err(e) => {
                tracing::error!(?e, "failed to decode persisted reward scheme");
                None
            }
        }
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<(), StoreError> {
        let bytes = sbor::basic_encode(self)
            .map_err(|e| StoreError(format!("reward scheme encode: {e:?}")))?;
        store.put(REWARD_SCHEME_KEY, &bytes)
    }
}

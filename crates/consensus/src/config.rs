//! Round driver configuration.

use std::time::Duration;

/// Timeout schedule. Each step's timeout grows linearly with the round so
/// a partitioned network eventually gives every proposer enough time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub propose: Duration,
    pub propose_delta: Duration,
    pub prevote: Duration,
    pub prevote_delta: Duration,
    pub precommit: Duration,
    pub precommit_delta: Duration,
    /// Inter-block gap before starting round 0 of the next height.
    pub commit: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            propose: Duration::from_millis(3000),
            propose_delta: Duration::from_millis(500),
            prevote: Duration::from_millis(1000),
            prevote_delta: Duration::from_millis(500),
            precommit: Duration::from_millis(1000),
            precommit_delta: Duration::from_millis(500),
            commit: Duration::from_millis(1000),
        }
    }
}

impl TimeoutConfig {
    pub fn propose(&self, round: u64) -> Duration {
        self.propose + self.propose_delta * round as u32
    }

    pub fn prevote(&self, round: u64) -> Duration {
        self.prevote + self.prevote_delta * round as u32
    }

    pub fn precommit(&self, round: u64) -> Duration {
        self.precommit + self.precommit_delta * round as u32
    }
}

/// Static configuration of one consensus instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfig {
    pub chain_id: String,
    pub timeouts: TimeoutConfig,
    /// Part size used when chunking proposed blocks.
    pub part_size: usize,
}

impl ConsensusConfig {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            timeouts: TimeoutConfig::default(),
            part_size: neatcon_types::DEFAULT_PART_SIZE,
        }
    }
}

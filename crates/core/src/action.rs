//! Action types for the deterministic round driver.

use crate::message::OutboundMessage;
use crate::timeout::TimeoutInfo;
use neatcon_types::{Commit, ConsensusBlock};

/// Commands the round driver wants performed.
///
/// Actions describe something to do. The runner executes them and may feed
/// results back as events.
#[derive(Debug, Clone)]
pub enum Action {
    /// Arm the timeout ticker. A later schedule supersedes an earlier one.
    ScheduleTimeout(TimeoutInfo),

    /// Broadcast a message to all peers.
    Broadcast(OutboundMessage),

    /// A block reached a precommit quorum; persist it together with the
    /// commit that proves it.
    CommitBlock {
        block: Box<ConsensusBlock>,
        commit: Commit,
    },

    /// Epoch bookkeeping found the local key in the upcoming roster; the
    /// node should start (or keep) participating in rounds.
    StartParticipating,
}

impl Action {
    /// Action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::ScheduleTimeout(_) => "ScheduleTimeout",
            Action::Broadcast(_) => "Broadcast",
            Action::CommitBlock { .. } => "CommitBlock",
            Action::StartParticipating => "StartParticipating",
        }
    }
}

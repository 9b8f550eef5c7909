//! Event types for the deterministic round driver.

use crate::proposal::Proposal;
use crate::timeout::TimeoutInfo;
use crate::vote::Vote;
use neatcon_types::Part;

/// All inputs the round driver can receive.
///
/// Events are passive data describing something that happened. The driver
/// processes an event synchronously and returns actions; the runner does
/// the actual I/O.
#[derive(Debug, Clone)]
pub enum Event {
    /// A previously scheduled timeout fired. The driver discards it when
    /// the tagged position is no longer current.
    TimeoutFired(TimeoutInfo),

    /// A proposal arrived from the network.
    ProposalReceived(Proposal),

    /// One chunk of the proposed block arrived.
    BlockPartReceived {
        height: u64,
        round: u64,
        part: Part,
    },

    /// A prevote or precommit arrived.
    VoteReceived(Vote),

    /// Shut down after finishing the current event.
    Stop,
}

impl Event {
    /// Event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::TimeoutFired(_) => "TimeoutFired",
            Event::ProposalReceived(_) => "ProposalReceived",
            Event::BlockPartReceived { .. } => "BlockPartReceived",
            Event::VoteReceived(_) => "VoteReceived",
            Event::Stop => "Stop",
        }
    }
}

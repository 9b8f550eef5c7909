//! Outbound message types for network communication.

use crate::proposal::Proposal;
use crate::vote::Vote;
use neatcon_types::Part;
use sbor::prelude::*;

/// Outbound network messages.
///
/// These are the messages the round driver can send to its peers. The
/// runner handles the actual network I/O; the driver only names the
/// message.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub enum OutboundMessage {
    /// Proposal announcement for a round.
    Proposal(Proposal),

    /// One chunk of the proposed block.
    BlockPart {
        height: u64,
        round: u64,
        part: Part,
    },

    /// A prevote or precommit.
    Vote(Vote),
}

impl OutboundMessage {
    /// Human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Proposal(_) => "Proposal",
            OutboundMessage::BlockPart { .. } => "BlockPart",
            OutboundMessage::Vote(_) => "Vote",
        }
    }
}

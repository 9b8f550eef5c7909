//! Round step enumeration.

use sbor::prelude::*;
use std::fmt;

/// Where in its round the state machine currently is.
///
/// Steps advance monotonically within a round; a round change resets to
/// `Propose` (or `NewHeight` when the height advances).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub enum RoundStep {
    /// Waiting out the inter-block gap before starting round 0.
    NewHeight,
    /// A new round has started but the propose timeout is not yet armed.
    NewRound,
    /// Waiting for the proposal and its block parts.
    Propose,
    /// Proposal handled, prevote broadcast, collecting prevotes.
    Prevote,
    /// Saw 2/3 of prevotes for conflicting values; waiting before precommit.
    PrevoteWait,
    /// Precommit broadcast, collecting precommits.
    Precommit,
    /// Saw 2/3 of precommits for conflicting values; waiting before new round.
    PrecommitWait,
    /// A block has quorum and is being committed.
    Commit,
}

impl RoundStep {
    pub fn name(&self) -> &'static str {
        match self {
            RoundStep::NewHeight => "NewHeight",
            RoundStep::NewRound => "NewRound",
            RoundStep::Propose => "Propose",
            RoundStep::Prevote => "Prevote",
            RoundStep::PrevoteWait => "PrevoteWait",
            RoundStep::Precommit => "Precommit",
            RoundStep::PrecommitWait => "PrecommitWait",
            RoundStep::Commit => "Commit",
        }
    }
}

impl fmt::Display for RoundStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

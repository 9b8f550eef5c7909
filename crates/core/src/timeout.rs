//! Timeout scheduling data.

use crate::step::RoundStep;
use std::fmt;
use std::time::Duration;

/// A scheduled (or fired) timeout, tagged with the state it was armed for.
///
/// The tag is what makes late fires harmless: when a timeout fires, the
/// state machine compares `(height, round, step)` against its current
/// position and discards anything stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutInfo {
    pub duration: Duration,
    pub height: u64,
    pub round: u64,
    pub step: RoundStep,
}

impl TimeoutInfo {
    pub fn new(duration: Duration, height: u64, round: u64, step: RoundStep) -> Self {
        Self {
            duration,
            height,
            round,
            step,
        }
    }

    /// Whether a fire of this timeout is still relevant at the given
    /// position. A fire for an earlier height or round, or for a step the
    /// machine has already moved past, is stale.
    pub fn is_current(&self, height: u64, round: u64, step: RoundStep) -> bool {
        self.height == height && self.round == round && self.step == step
    }
}

impl fmt::Display for TimeoutInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}@{}/{}/{}",
            self.duration, self.height, self.round, self.step
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_is_exact_position_match() {
        let info = TimeoutInfo::new(Duration::from_millis(100), 5, 2, RoundStep::Propose);
        assert!(info.is_current(5, 2, RoundStep::Propose));
        assert!(!info.is_current(5, 3, RoundStep::Propose));
        assert!(!info.is_current(6, 2, RoundStep::Propose));
        assert!(!info.is_current(5, 2, RoundStep::Prevote));
    }
}

//! Core types for the NeatCon round driver.
//!
//! This crate provides the vocabulary of the consensus state machine:
//!
//! - [`Event`]: All possible inputs to the round driver
//! - [`Action`]: All possible outputs from the round driver
//! - [`Vote`], [`Proposal`]: the signed messages a round is made of
//! - [`TimeoutInfo`]: a timeout tagged with the position it was armed for
//!
//! # Architecture
//!
//! The driver is built on a simple event-driven model:
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is:
//! - **Synchronous**: No async, no .await
//! - **Deterministic**: Same state + event = same actions
//! - **Pure-ish**: Mutates self, but performs no I/O
//!
//! All I/O is handled by the runner, which delivers events, executes the
//! returned actions, and converts action results back into events.

mod action;
mod event;
mod message;
mod proposal;
mod step;
mod timeout;
mod vote;

pub use action::Action;
pub use event::Event;
pub use message::OutboundMessage;
pub use proposal::Proposal;
pub use step::RoundStep;
pub use timeout::TimeoutInfo;
pub use vote::{Vote, VoteType};

/// The synchronous state machine the runner drives.
pub trait StateMachine {
    /// Process one event, returning the actions it caused.
    fn handle(&mut self, event: Event) -> Vec<Action>;
}

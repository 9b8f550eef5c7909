//! The consensus engine: round-based BFT agreement over blocks.
//!
//! [`state::RoundState`] is the deterministic core. It implements the
//! `StateMachine` trait from `neatcon-core` and never touches a clock, a
//! socket, or a disk. [`ticker::TimeoutTicker`] provides the single timer
//! the runner feeds back in as [`neatcon_core::Event::TimeoutFired`].
//! [`hooks::CommitHooks`] is the fixed list of post-commit observers; the
//! epoch lifecycle rides on it via [`hooks::EpochLifecycleHook`].

pub mod config;
pub mod hooks;
pub mod state;
pub mod ticker;
pub mod validation;
pub mod votes;

pub use config::{ConsensusConfig, TimeoutConfig};
pub use hooks::{CommitHook, CommitHooks, EpochLifecycleHook, HookError};
pub use state::{EmptyPayload, PayloadProvider, RoundState};
pub use ticker::TimeoutTicker;
pub use validation::{validate_block, ValidationError};
pub use votes::{VoteSet, VoteSetError};

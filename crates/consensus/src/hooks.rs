//! Commit hooks.
//!
//! An immutable list of named hooks, built once at startup and handed to
//! the driver; every committed block runs through all of them. This keeps
//! the set of commit-time behaviors a visible constructor argument instead
//! of registry state mutated at init time.

use neatcon_core::Action;
use neatcon_epoch::{ChainState, Epoch, EpochManager};
use neatcon_types::{Address, Commit, ConsensusBlock};
use std::sync::Arc;
use tracing::{error, warn};

/// Hook failure. Logged by the runner; the consensus loop proceeds.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// One commit-time behavior.
pub trait CommitHook: Send + Sync {
    fn name(&self) -> &'static str;
    /// Run against a freshly committed block. Returned actions are fed
    /// back to the runner (e.g. `StartParticipating`).
    fn on_commit(&self, block: &ConsensusBlock, commit: &Commit) -> Result<Vec<Action>, HookError>;
}

/// The immutable hook list.
#[derive(Clone)]
pub struct CommitHooks {
    hooks: Arc<[Arc<dyn CommitHook>]>,
}

impl CommitHooks {
    pub fn new(hooks: Vec<Arc<dyn CommitHook>>) -> Self {
        Self {
            hooks: hooks.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Run every hook. A failing hook is logged and skipped; commit
    /// processing never stops half way.
    pub fn run(&self, block: &ConsensusBlock, commit: &Commit) -> Vec<Action> {
        let mut actions = Vec::new();
        for hook in self.hooks.iter() {
            match hook.on_commit(block, commit) {
                Ok(mut produced) => actions.append(&mut produced),
                Err(e) => {
                    error!(hook = hook.name(), height = block.height(), error = %e,
                        "commit hook failed");
                }
            }
        }
        actions
    }
}

/// The epoch bookkeeping hook: processes in-block epoch announcements and
/// drives the transition schedule around the epoch boundary.
pub struct EpochLifecycleHook {
    manager: Arc<EpochManager>,
    chain_state: Arc<dyn ChainState + Send + Sync>,
    local_address: Address,
}

impl EpochLifecycleHook {
    pub fn new(
        manager: Arc<EpochManager>,
        chain_state: Arc<dyn ChainState + Send + Sync>,
        local_address: Address,
    ) -> Self {
        Self {
            manager,
            chain_state,
            local_address,
        }
    }
}

impl CommitHook for EpochLifecycleHook {
    fn name(&self) -> &'static str {
        "epoch-lifecycle"
    }

    fn on_commit(&self, block: &ConsensusBlock, _commit: &Commit) -> Result<Vec<Action>, HookError> {
        let height = block.height();
        if !block.extra.epoch_bytes.is_empty() {
            let announced =
                Epoch::from_bytes(&block.extra.epoch_bytes).map_err(|e| HookError(e.to_string()))?;
            self.manager
                .apply_block_announcement(height, &announced)
                .map_err(|e| HookError(e.to_string()))?;
        }

        let current = self.manager.current();
        let mut actions = Vec::new();

        // No announcement arrived at the transition height: propose the
        // successor locally so voting has something to attach to.
        if height == current.start_block + 1 && self.manager.next().is_none() {
            self.manager
                .propose_next_epoch(block.extra.time_ms)
                .map_err(|e| HookError(e.to_string()))?;
        }

        // One block before the boundary: recompute the roster and find out
        // whether the local key participates in the next epoch.
        if height + 1 == current.end_block {
            match self
                .manager
                .prepare_rotation(self.chain_state.as_ref(), &self.local_address)
            {
                Ok(true) => actions.push(Action::StartParticipating),
                Ok(false) => {}
                // Fatal to rotation: reported, participation halts, the
                // node keeps validating.
                Err(e) => return Err(HookError(e.to_string())),
            }
        }

        // The boundary block is committed: make the next epoch current so
        // height end_block + 1 is validated under the new roster.
        if height == current.end_block {
            if let Err(e) = self.manager.rotate() {
                warn!(height, error = %e, "epoch rotation failed");
            }
        }

        Ok(actions)
    }
}

//! The round driver.
//!
//! A synchronous state machine: the runner feeds it events (timeouts,
//! proposals, block parts, votes) and executes the actions it returns. The
//! driver is the sole mutator of consensus position (height, round, step);
//! everything it needs from the outside world arrives as an event.
//!
//! Per height: NewHeight → Propose → Prevote → Precommit → Commit →
//! NewHeight. A precommit quorum for a non-nil block short-circuits the
//! remaining timeouts. Every timeout fire is checked against the current
//! (height, round, step) and discarded when stale.

use crate::config::ConsensusConfig;
use crate::hooks::CommitHooks;
use crate::validation::validate_block;
use crate::votes::{VoteSet, VoteSetError};
use neatcon_core::{
    Action, Event, OutboundMessage, Proposal, RoundStep, StateMachine, TimeoutInfo, Vote, VoteType,
};
use neatcon_epoch::EpochManager;
use neatcon_types::{
    Address, BlockExtra, BlockId, Commit, ConsensusBlock, KeyPair, PartSet, Signature,
    ValidatorSet,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Supplies the opaque application payload for blocks this node proposes.
pub trait PayloadProvider: Send + Sync {
    fn next_payload(&self, height: u64) -> Vec<u8>;
}

/// Proposes empty blocks. Used by tests and block-producing deployments
/// without a transaction source.
pub struct EmptyPayload;

impl PayloadProvider for EmptyPayload {
    fn next_payload(&self, _height: u64) -> Vec<u8> {
        Vec::new()
    }
}

/// The consensus state machine for one node.
pub struct RoundState {
    config: ConsensusConfig,
    keypair: KeyPair,
    local_address: Address,
    epochs: Arc<EpochManager>,
    hooks: CommitHooks,
    payload: Arc<dyn PayloadProvider>,

    height: u64,
    round: u64,
    step: RoundStep,
    /// Roster authoritative for `height`. Refreshed from the epoch manager
    /// at every height change.
    validators: ValidatorSet,
    /// Envelope of the last committed block.
    prev_extra: BlockExtra,
    /// Commit for the previous height, carried in the next proposal.
    last_commit: Option<Commit>,

    proposal: Option<Proposal>,
    proposal_parts: Option<PartSet>,
    proposal_block: Option<ConsensusBlock>,
    proposal_valid: bool,
    /// Non-nil block id this node precommitted, with its round.
    locked: Option<(BlockId, u64)>,

    prevotes: HashMap<u64, VoteSet>,
    precommits: HashMap<u64, VoteSet>,
}

impl RoundState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConsensusConfig,
        keypair: KeyPair,
        epochs: Arc<EpochManager>,
        hooks: CommitHooks,
        payload: Arc<dyn PayloadProvider>,
        prev_extra: BlockExtra,
        last_commit: Option<Commit>,
    ) -> Self {
        let local_address = Address::from_public_key(&keypair.public_key());
        let height = prev_extra.height + 1;
        let validators = match epochs.epoch_for_height(height) {
            Some(epoch) => epoch.validators,
            None => {
                warn!(height, "no epoch covers the starting height; roster empty until one does");
                ValidatorSet::default()
            }
        };
        Self {
            config,
            keypair,
            local_address,
            epochs,
            hooks,
            payload,
            height,
            round: 0,
            step: RoundStep::NewHeight,
            validators,
            prev_extra,
            last_commit,
            proposal: None,
            proposal_parts: None,
            proposal_block: None,
            proposal_valid: false,
            locked: None,
            prevotes: HashMap::new(),
            precommits: HashMap::new(),
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn step(&self) -> RoundStep {
        self.step
    }

    pub fn local_address(&self) -> Address {
        self.local_address
    }

    /// Kick off the first height. Schedules the NewHeight gap timeout.
    pub fn start(&mut self) -> Vec<Action> {
        vec![self.schedule(self.config.timeouts.commit, RoundStep::NewHeight)]
    }

    /// The proposer for (height, round): round-robin over the roster.
    pub fn proposer(&self, height: u64, round: u64) -> Option<&Address> {
        if self.validators.is_empty() {
            return None;
        }
        let index = ((height + round) % self.validators.len() as u64) as usize;
        self.validators.get(index).map(|v| &v.address)
    }

    fn is_local_proposer(&self) -> bool {
        self.proposer(self.height, self.round) == Some(&self.local_address)
    }

    fn participating(&self) -> bool {
        self.validators.has_address(&self.local_address)
    }

    fn schedule(&self, duration: std::time::Duration, step: RoundStep) -> Action {
        Action::ScheduleTimeout(TimeoutInfo::new(duration, self.height, self.round, step))
    }

    fn make_vote(&self, kind: VoteType, block_id: BlockId) -> Vote {
        let mut vote = Vote {
            vote_type: kind,
            height: self.height,
            round: self.round,
            block_id,
            voter: self.local_address,
            signature: Signature::zero(),
        };
        vote.signature = self.keypair.sign(&vote.sign_bytes(&self.config.chain_id));
        vote
    }

    fn vote_set(&mut self, round: u64, kind: VoteType) -> &mut VoteSet {
        let map = match kind {
            VoteType::Prevote => &mut self.prevotes,
            VoteType::Precommit => &mut self.precommits,
        };
        map.entry(round).or_insert_with(|| {
            VoteSet::new(
                self.config.chain_id.clone(),
                self.height,
                round,
                kind,
                self.validators.clone(),
            )
        })
    }

    // ── step transitions ────────────────────────────────────────────────

    fn enter_new_round(&mut self, round: u64) -> Vec<Action> {
        debug!(height = self.height, round, "entering new round");
        self.round = round;
        self.proposal = None;
        self.proposal_parts = None;
        self.proposal_block = None;
        self.proposal_valid = false;
        self.enter_propose()
    }

    fn enter_propose(&mut self) -> Vec<Action> {
        self.step = RoundStep::Propose;
        let mut actions = vec![self.schedule(
            self.config.timeouts.propose(self.round),
            RoundStep::Propose,
        )];
        if self.participating() && self.is_local_proposer() {
            actions.append(&mut self.build_proposal());
        }
        actions
    }

    fn build_proposal(&mut self) -> Vec<Action> {
        let payload = self.payload.next_payload(self.height);
        let extra = BlockExtra {
            chain_id: self.config.chain_id.clone(),
            height: self.height,
            time_ms: now_ms(),
            epoch_number: self.epochs.current_number(),
            validators_hash: self.validators.hash(),
            seen_commit: self.last_commit.clone(),
            seen_commit_hash: neatcon_types::Hash::ZERO,
            epoch_bytes: self.announcement_bytes(),
            payload_hash: neatcon_types::Hash::ZERO,
        };
        let block = ConsensusBlock::make_block(payload, extra, Vec::new());
        let parts = match block.make_part_set(self.config.part_size) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "proposed block failed to chunk");
                return Vec::new();
            }
        };
        let block_id = BlockId::new(block.hash(), *parts.header());
        let mut proposal = Proposal {
            height: self.height,
            round: self.round,
            block_id: block_id.clone(),
            pol_round: self.locked.as_ref().map(|(_, round)| *round),
            proposer: self.local_address,
            signature: Signature::zero(),
        };
        proposal.signature = self
            .keypair
            .sign(&proposal.sign_bytes(&self.config.chain_id));

        let mut actions = vec![Action::Broadcast(OutboundMessage::Proposal(proposal.clone()))];
        for part in parts.parts() {
            actions.push(Action::Broadcast(OutboundMessage::BlockPart {
                height: self.height,
                round: self.round,
                part: part.clone(),
            }));
        }

        // The proposer has its own block in full; prevote it right away.
        self.proposal = Some(proposal);
        self.proposal_parts = Some(parts);
        self.proposal_block = Some(block);
        self.proposal_valid = true;
        actions.append(&mut self.enter_prevote());
        actions
    }

    fn enter_prevote(&mut self) -> Vec<Action> {
        self.step = RoundStep::Prevote;
        let block_id = self.prevote_decision();
        let mut actions = vec![self.schedule(
            self.config.timeouts.prevote(self.round),
            RoundStep::Prevote,
        )];
        if self.participating() {
            let vote = self.make_vote(VoteType::Prevote, block_id);
            actions.extend(self.record_own_vote(vote));
        }
        actions
    }

    /// What to prevote: the locked block if any, else the valid proposal,
    /// else nil.
    fn prevote_decision(&self) -> BlockId {
        if let Some((locked_id, _)) = &self.locked {
            return locked_id.clone();
        }
        match &self.proposal {
            Some(proposal) if self.proposal_valid => proposal.block_id.clone(),
            _ => BlockId::zero(),
        }
    }

    fn enter_precommit(&mut self, block_id: BlockId) -> Vec<Action> {
        self.step = RoundStep::Precommit;
        let mut actions = vec![self.schedule(
            self.config.timeouts.precommit(self.round),
            RoundStep::Precommit,
        )];
        if !block_id.is_zero() {
            self.locked = Some((block_id.clone(), self.round));
        }
        if self.participating() {
            let vote = self.make_vote(VoteType::Precommit, block_id);
            actions.extend(self.record_own_vote(vote));
        }
        actions
    }

    /// Fold the local vote into the tally and broadcast it.
    fn record_own_vote(&mut self, vote: Vote) -> Vec<Action> {
        let mut actions = vec![Action::Broadcast(OutboundMessage::Vote(vote.clone()))];
        actions.extend(self.apply_vote(vote));
        actions
    }

    // ── event handlers ──────────────────────────────────────────────────

    fn on_timeout(&mut self, info: TimeoutInfo) -> Vec<Action> {
        if !info.is_current(self.height, self.round, self.step) {
            debug!(%info, height = self.height, round = self.round, step = %self.step,
                "discarding stale timeout");
            return Vec::new();
        }
        match self.step {
            RoundStep::NewHeight | RoundStep::NewRound => self.enter_new_round(0),
            RoundStep::Propose => self.enter_prevote(),
            RoundStep::Prevote | RoundStep::PrevoteWait => {
                // Precommit the prevote quorum block if one exists.
                let decision = self
                    .prevotes
                    .get(&self.round)
                    .and_then(|set| set.two_thirds_block())
                    .filter(|id| !id.is_zero())
                    .unwrap_or_else(BlockId::zero);
                self.enter_precommit(decision)
            }
            RoundStep::Precommit | RoundStep::PrecommitWait => self.enter_new_round(self.round + 1),
            RoundStep::Commit => Vec::new(),
        }
    }

    fn on_proposal(&mut self, proposal: Proposal) -> Vec<Action> {
        if proposal.height != self.height || proposal.round != self.round {
            debug!(%proposal, "proposal for other position ignored");
            return Vec::new();
        }
        if self.proposal.is_some() {
            return Vec::new();
        }
        let Some(expected) = self.proposer(self.height, self.round).copied() else {
            return Vec::new();
        };
        if proposal.proposer != expected {
            warn!(%proposal, expected = %expected, "proposal from wrong proposer dropped");
            return Vec::new();
        }
        let Some(validator) = self.validators.by_address(&proposal.proposer) else {
            return Vec::new();
        };
        if !proposal.verify(&self.config.chain_id, &validator.public_key) {
            warn!(%proposal, "proposal signature invalid");
            return Vec::new();
        }
        self.proposal_parts = Some(PartSet::from_header(proposal.block_id.parts_header));
        self.proposal = Some(proposal);
        self.try_complete_proposal()
    }

    fn on_block_part(&mut self, height: u64, round: u64, part: neatcon_types::Part) -> Vec<Action> {
        if height != self.height || round != self.round {
            return Vec::new();
        }
        let Some(parts) = self.proposal_parts.as_mut() else {
            // Parts before the proposal; nothing to verify against yet.
            return Vec::new();
        };
        match parts.add_part(part) {
            Ok(_) => self.try_complete_proposal(),
            Err(e) => {
                debug!(error = %e, "block part rejected");
                Vec::new()
            }
        }
    }

    /// When the proposal and all its parts are in, decode and validate the
    /// block, then move the round forward wherever it was waiting.
    fn try_complete_proposal(&mut self) -> Vec<Action> {
        if self.proposal_block.is_some() {
            return self.after_proposal_complete();
        }
        let Some(parts) = &self.proposal_parts else {
            return Vec::new();
        };
        if !parts.is_complete() {
            return Vec::new();
        }
        let bytes = match parts.assemble() {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "part set failed to assemble");
                return Vec::new();
            }
        };
        let block = match ConsensusBlock::from_bytes(&bytes) {
            Ok(block) => block,
            Err(e) => {
                warn!(height = self.height, error = %e, "proposed block rejected");
                return Vec::new();
            }
        };
        match validate_block(&block, &self.prev_extra, &self.epochs) {
            Ok(()) => self.proposal_valid = true,
            Err(e) if e.is_retryable() => {
                debug!(height = self.height, error = %e, "proposal validation deferred");
            }
            Err(e) => {
                warn!(height = self.height, error = %e, "proposed block invalid");
            }
        }
        self.proposal_block = Some(block);
        self.after_proposal_complete()
    }

    fn after_proposal_complete(&mut self) -> Vec<Action> {
        match self.step {
            // Waiting in Propose: prevote now instead of at the timeout.
            RoundStep::Propose => self.enter_prevote(),
            // A precommit quorum may have been waiting for the full block.
            RoundStep::Precommit | RoundStep::PrecommitWait | RoundStep::Commit => {
                self.try_commit()
            }
            _ => Vec::new(),
        }
    }

    fn apply_vote(&mut self, vote: Vote) -> Vec<Action> {
        let kind = vote.vote_type;
        let round = vote.round;
        if vote.height != self.height {
            debug!(%vote, height = self.height, "vote for other height ignored");
            return Vec::new();
        }
        match self.vote_set(round, kind).add_vote(vote) {
            Ok(true) => {}
            Ok(false) => return Vec::new(),
            Err(e @ VoteSetError::ConflictingVote(_)) => {
                warn!(error = %e, "byzantine vote dropped");
                return Vec::new();
            }
            Err(e) => {
                debug!(error = %e, "vote rejected");
                return Vec::new();
            }
        }
        match kind {
            VoteType::Prevote => self.check_prevotes(round),
            VoteType::Precommit => self.check_precommits(round),
        }
    }

    fn check_prevotes(&mut self, round: u64) -> Vec<Action> {
        if round != self.round || self.step != RoundStep::Prevote {
            return Vec::new();
        }
        let set = match self.prevotes.get(&round) {
            Some(set) => set,
            None => return Vec::new(),
        };
        if let Some(block_id) = set.two_thirds_block() {
            return self.enter_precommit(block_id);
        }
        if set.two_thirds_any() {
            // Split vote: give stragglers one more prevote window.
            self.step = RoundStep::PrevoteWait;
            return vec![self.schedule(
                self.config.timeouts.prevote(self.round),
                RoundStep::PrevoteWait,
            )];
        }
        Vec::new()
    }

    fn check_precommits(&mut self, round: u64) -> Vec<Action> {
        let quorum = self
            .precommits
            .get(&round)
            .and_then(|set| set.two_thirds_block());
        match quorum {
            Some(block_id) if !block_id.is_zero() => {
                // Quorum for a real block short-circuits whatever timeout
                // is pending.
                self.step = RoundStep::Commit;
                self.round = round;
                self.try_commit()
            }
            Some(_) if round == self.round => {
                // Nil quorum: this round is dead, move on.
                self.enter_new_round(self.round + 1)
            }
            _ => {
                if round == self.round
                    && self.step == RoundStep::Precommit
                    && self
                        .precommits
                        .get(&round)
                        .is_some_and(|set| set.two_thirds_any())
                {
                    self.step = RoundStep::PrecommitWait;
                    return vec![self.schedule(
                        self.config.timeouts.precommit(self.round),
                        RoundStep::PrecommitWait,
                    )];
                }
                Vec::new()
            }
        }
    }

    /// Commit the precommit-quorum block, if its bytes are in. Runs the
    /// hooks, advances the height, then waits out the inter-block gap.
    fn try_commit(&mut self) -> Vec<Action> {
        let Some(set) = self.precommits.get(&self.round) else {
            return Vec::new();
        };
        let Some(block_id) = set.two_thirds_block().filter(|id| !id.is_zero()) else {
            return Vec::new();
        };
        let Some(block) = self
            .proposal_block
            .as_ref()
            .filter(|b| b.hashes_to(&block_id))
            .cloned()
        else {
            // The block bytes have not all arrived; parts completing later
            // re-enter here.
            debug!(height = self.height, "precommit quorum reached, waiting for block parts");
            return Vec::new();
        };
        let commit = match set.make_commit() {
            Ok(commit) => commit,
            Err(e) => {
                warn!(height = self.height, error = %e, "failed to build commit");
                return Vec::new();
            }
        };
        info!(height = self.height, round = self.round, block = %block_id, "block committed");

        let mut actions = vec![Action::CommitBlock {
            block: Box::new(block.clone()),
            commit: commit.clone(),
        }];
        actions.extend(self.hooks.run(&block, &commit));

        // Advance to the next height.
        self.prev_extra = block.extra.clone();
        self.last_commit = Some(commit);
        self.height += 1;
        self.round = 0;
        self.step = RoundStep::NewHeight;
        self.proposal = None;
        self.proposal_parts = None;
        self.proposal_block = None;
        self.proposal_valid = false;
        self.locked = None;
        self.prevotes.clear();
        self.precommits.clear();
        match self.epochs.epoch_for_height(self.height) {
            Some(epoch) => self.validators = epoch.validators,
            None => warn!(
                height = self.height,
                "no epoch for next height yet; retrying at the NewHeight timeout"
            ),
        }
        actions.push(self.schedule(self.config.timeouts.commit, RoundStep::NewHeight));
        actions
    }

    /// The epoch announcement this proposal should carry, if the height is
    /// a transition height.
    fn announcement_bytes(&self) -> Vec<u8> {
        let current = self.epochs.current();
        let announced = if self.height == current.start_block + 1
            || self.height == neatcon_epoch::BOOTSTRAP_HEIGHT
        {
            match self.epochs.next() {
                Some(next) => Some(next),
                None => self
                    .epochs
                    .propose_next_epoch(now_ms())
                    .map_err(|e| warn!(error = %e, "failed to propose next epoch"))
                    .ok(),
            }
        } else if self.height == current.end_block {
            self.epochs.next()
        } else if self.height == current.start_block {
            // Re-announce the running epoch so peers adopt one start time.
            Some(current)
        } else {
            None
        };
        match announced {
            Some(epoch) => epoch.to_bytes().unwrap_or_else(|e| {
                warn!(error = %e, "failed to encode epoch announcement");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}

impl StateMachine for RoundState {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::TimeoutFired(info) => self.on_timeout(info),
            Event::ProposalReceived(proposal) => self.on_proposal(proposal),
            Event::BlockPartReceived {
                height,
                round,
                part,
            } => self.on_block_part(height, round, part),
            Event::VoteReceived(vote) => self.apply_vote(vote),
            Event::Stop => Vec::new(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neatcon_epoch::{EpochDoc, MemoryStore, RewardSchemeDoc, ValidatorDoc};
    use neatcon_types::{keypair_from_seed, Hash};

    const CHAIN: &str = "test-chain";

    fn epochs_for(count: u64) -> Arc<EpochManager> {
        let validators = (0..count)
            .map(|i| {
                let kp = keypair_from_seed(i);
                ValidatorDoc {
                    address: Address::from_public_key(&kp.public_key()).to_hex(),
                    public_key: kp.public_key().to_hex(),
                    amount: 1,
                    remaining_epoch: 0,
                }
            })
            .collect();
        let epoch_doc = EpochDoc {
            number: 0,
            start_block: 0,
            end_block: 99,
            start_time_ms: 1_000,
            validators,
        };
        let reward_doc = RewardSchemeDoc {
            total_reward: 100,
            reward_first_year: 10,
            epoch_number_per_year: 12,
            total_year: 10,
        };
        let store = Arc::new(MemoryStore::new());
        Arc::new(EpochManager::load_or_init(store, &epoch_doc, &reward_doc, 16).unwrap())
    }

    fn genesis_extra(epochs: &EpochManager) -> BlockExtra {
        BlockExtra {
            chain_id: CHAIN.to_string(),
            height: 0,
            time_ms: 0,
            epoch_number: 0,
            validators_hash: epochs.current().validators.hash(),
            seen_commit: None,
            seen_commit_hash: Hash::ZERO,
            epoch_bytes: Vec::new(),
            payload_hash: Hash::ZERO,
        }
    }

    fn node(keypair: KeyPair, epochs: Arc<EpochManager>) -> RoundState {
        let extra = genesis_extra(&epochs);
        RoundState::new(
            ConsensusConfig::new(CHAIN),
            keypair,
            epochs,
            CommitHooks::empty(),
            Arc::new(EmptyPayload),
            extra,
            None,
        )
    }

    /// Pull the node out of NewHeight into round 0 Propose.
    fn start_round(state: &mut RoundState) -> Vec<Action> {
        let started = state.start();
        let Some(&Action::ScheduleTimeout(info)) = started.first() else {
            panic!("start must arm the NewHeight timeout");
        };
        state.handle(Event::TimeoutFired(info))
    }

    fn event_for(message: OutboundMessage) -> Event {
        match message {
            OutboundMessage::Proposal(p) => Event::ProposalReceived(p),
            OutboundMessage::BlockPart {
                height,
                round,
                part,
            } => Event::BlockPartReceived {
                height,
                round,
                part,
            },
            OutboundMessage::Vote(v) => Event::VoteReceived(v),
        }
    }

    /// Deliver every broadcast to every node, in send order, until the
    /// network goes quiet, collecting the non-broadcast actions.
    fn pump(nodes: &mut [RoundState], outbox: Vec<OutboundMessage>) -> Vec<Action> {
        let mut outbox: std::collections::VecDeque<_> = outbox.into();
        let mut produced = Vec::new();
        while let Some(message) = outbox.pop_front() {
            for node in nodes.iter_mut() {
                for action in node.handle(event_for(message.clone())) {
                    match action {
                        Action::Broadcast(m) => outbox.push_back(m),
                        other => produced.push(other),
                    }
                }
            }
        }
        produced
    }

    #[test]
    fn proposer_rotates_round_robin() {
        let epochs = epochs_for(4);
        let state = node(keypair_from_seed(0), epochs.clone());

        let roster = epochs.current().validators;
        for round in 0..8 {
            let expected = roster.get(((1 + round) % 4) as usize).unwrap().address;
            assert_eq!(state.proposer(1, round), Some(&expected));
        }
        // Distinct consecutive proposers.
        assert_ne!(state.proposer(1, 0), state.proposer(1, 1));
    }

    #[test]
    fn stale_timeout_is_discarded() {
        let epochs = epochs_for(4);
        let mut state = node(keypair_from_seed(0), epochs);
        start_round(&mut state);
        assert_eq!(state.step(), RoundStep::Propose);

        let stale = TimeoutInfo::new(
            std::time::Duration::from_millis(1),
            state.height(),
            state.round() + 5,
            RoundStep::Propose,
        );
        assert!(state.handle(Event::TimeoutFired(stale)).is_empty());
        assert_eq!(state.step(), RoundStep::Propose);
        assert_eq!(state.round(), 0);
    }

    #[test]
    fn propose_timeout_without_proposal_prevotes_nil() {
        let epochs = epochs_for(4);
        // The round 0 proposer is roster index 1; pick a node that is not it.
        let roster = epochs.current().validators;
        let proposer = roster.get(1).unwrap().address;
        let kp = (0..4)
            .map(keypair_from_seed)
            .find(|kp| Address::from_public_key(&kp.public_key()) != proposer)
            .unwrap();
        let mut state = node(kp, epochs);
        start_round(&mut state);

        let timeout = TimeoutInfo::new(
            std::time::Duration::from_millis(1),
            state.height(),
            0,
            RoundStep::Propose,
        );
        let actions = state.handle(Event::TimeoutFired(timeout));
        let vote = actions
            .iter()
            .find_map(|a| match a {
                Action::Broadcast(OutboundMessage::Vote(v)) => Some(v),
                _ => None,
            })
            .expect("a prevote must be broadcast");
        assert_eq!(vote.vote_type, VoteType::Prevote);
        assert!(vote.is_nil());
        assert_eq!(state.step(), RoundStep::Prevote);
    }

    #[test]
    fn non_validator_observes_without_voting() {
        let epochs = epochs_for(4);
        // Seed 9 is not in the roster.
        let mut state = node(keypair_from_seed(9), epochs);
        start_round(&mut state);

        let timeout = TimeoutInfo::new(
            std::time::Duration::from_millis(1),
            state.height(),
            0,
            RoundStep::Propose,
        );
        let actions = state.handle(Event::TimeoutFired(timeout));
        assert!(actions
            .iter()
            .all(|a| !matches!(a, Action::Broadcast(OutboundMessage::Vote(_)))));
        // Still follows the round structure.
        assert_eq!(state.step(), RoundStep::Prevote);
    }

    #[test]
    fn four_validators_commit_the_first_block() {
        let epochs = epochs_for(4);
        let mut nodes: Vec<RoundState> = (0..4)
            .map(|i| node(keypair_from_seed(i), epochs.clone()))
            .collect();

        let mut outbox = Vec::new();
        for n in nodes.iter_mut() {
            for action in start_round(n) {
                if let Action::Broadcast(m) = action {
                    outbox.push(m);
                }
            }
        }

        let produced = pump(&mut nodes, outbox);
        let commits: Vec<_> = produced
            .iter()
            .filter_map(|a| match a {
                Action::CommitBlock { block, commit } => Some((block, commit)),
                _ => None,
            })
            .collect();
        assert_eq!(commits.len(), 4, "every node must commit height 1");

        for (block, commit) in &commits {
            assert_eq!(block.extra.height, 1);
            assert_eq!(commit.height, 1);
            epochs
                .current()
                .validators
                .verify_commit(CHAIN, 1, commit)
                .unwrap();
        }
        for n in &nodes {
            assert_eq!(n.height(), 2);
            assert_eq!(n.step(), RoundStep::NewHeight);
        }
    }

    #[test]
    fn committed_node_ignores_old_height_votes() {
        let epochs = epochs_for(4);
        let mut nodes: Vec<RoundState> = (0..4)
            .map(|i| node(keypair_from_seed(i), epochs.clone()))
            .collect();

        let mut outbox = Vec::new();
        for n in nodes.iter_mut() {
            for action in start_round(n) {
                if let Action::Broadcast(m) = action {
                    outbox.push(m);
                }
            }
        }
        pump(&mut nodes, outbox);
        assert_eq!(nodes[0].height(), 2);

        // A straggler vote for the committed height is a no-op.
        let kp = keypair_from_seed(0);
        let mut vote = Vote {
            vote_type: VoteType::Precommit,
            height: 1,
            round: 0,
            block_id: BlockId::zero(),
            voter: Address::from_public_key(&kp.public_key()),
            signature: Signature::zero(),
        };
        vote.signature = kp.sign(&vote.sign_bytes(CHAIN));
        assert!(nodes[1].handle(Event::VoteReceived(vote)).is_empty());
    }
}

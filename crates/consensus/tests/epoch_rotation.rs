//! Four validators run a full epoch and rotate into the next one.
//!
//! Every node has its own store and epoch manager, announcements travel
//! only inside committed blocks, and the lifecycle hook does the rest:
//! install the successor at `start_block + 1`, dry-run the roster one
//! block before the boundary, rotate at `end_block`.

use neatcon_consensus::{
    CommitHooks, ConsensusConfig, EmptyPayload, EpochLifecycleHook, RoundState,
};
use neatcon_core::{Action, Event, OutboundMessage, RoundStep, StateMachine, TimeoutInfo};
use neatcon_epoch::{
    load_epoch, ChainState, EpochDoc, EpochManager, MemoryStore, RewardSchemeDoc, ValidatorDoc,
};
use neatcon_types::{keypair_from_seed, Address, BlockExtra, Hash};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

const CHAIN: &str = "rotation-chain";
const EPOCH_END: u64 = 5;

struct DeepPockets;

impl ChainState for DeepPockets {
    fn deposit_balance(&self, _address: &Address) -> u128 {
        1_000_000
    }
}

struct TestNode {
    state: RoundState,
    epochs: Arc<EpochManager>,
    store: Arc<MemoryStore>,
}

fn make_node(seed: u64) -> TestNode {
    let validators = (0..4)
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
        end_block: EPOCH_END,
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
    let epochs = Arc::new(
        EpochManager::load_or_init(store.clone(), &epoch_doc, &reward_doc, 16).unwrap(),
    );

    let kp = keypair_from_seed(seed);
    let local_address = Address::from_public_key(&kp.public_key());
    let hooks = CommitHooks::new(vec![Arc::new(EpochLifecycleHook::new(
        epochs.clone(),
        Arc::new(DeepPockets),
        local_address,
    ))]);
    let genesis = BlockExtra {
        chain_id: CHAIN.to_string(),
        height: 0,
        time_ms: 0,
        epoch_number: 0,
        validators_hash: epochs.current().validators.hash(),
        seen_commit: None,
        seen_commit_hash: Hash::ZERO,
        epoch_bytes: Vec::new(),
        payload_hash: Hash::ZERO,
    };
    let state = RoundState::new(
        ConsensusConfig::new(CHAIN),
        kp,
        epochs.clone(),
        hooks,
        Arc::new(EmptyPayload),
        genesis,
        None,
    );
    TestNode {
        state,
        epochs,
        store,
    }
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

/// Deliver broadcasts to every node in send order until quiet.
fn pump(nodes: &mut [TestNode], outbox: Vec<OutboundMessage>) -> Vec<Action> {
    let mut outbox: VecDeque<_> = outbox.into();
    let mut produced = Vec::new();
    while let Some(message) = outbox.pop_front() {
        for node in nodes.iter_mut() {
            for action in node.state.handle(event_for(message.clone())) {
                match action {
                    Action::Broadcast(m) => outbox.push_back(m),
                    other => produced.push(other),
                }
            }
        }
    }
    produced
}

/// Fire every node's NewHeight timeout for `height` and settle the round.
fn run_height(nodes: &mut [TestNode], height: u64) -> Vec<Action> {
    let gap = TimeoutInfo::new(
        Duration::from_millis(1),
        height,
        0,
        RoundStep::NewHeight,
    );
    let mut outbox = Vec::new();
    let mut produced = Vec::new();
    for node in nodes.iter_mut() {
        for action in node.state.handle(Event::TimeoutFired(gap)) {
            match action {
                Action::Broadcast(m) => outbox.push(m),
                other => produced.push(other),
            }
        }
    }
    produced.extend(pump(nodes, outbox));
    for node in nodes.iter() {
        assert_eq!(node.state.height(), height + 1, "node stuck at height {height}");
    }
    produced
}

#[test]
fn validators_cross_the_epoch_boundary() {
    let mut nodes: Vec<TestNode> = (0..4).map(make_node).collect();
    for node in &nodes {
        assert_eq!(node.epochs.current_number(), 0);
    }

    let mut all_actions = Vec::new();
    for height in 1..=EPOCH_END + 1 {
        all_actions.extend(run_height(&mut nodes, height));
    }

    // Every node installed and then rotated into epoch 1.
    for node in &nodes {
        assert_eq!(node.epochs.current_number(), 1);
        let current = node.epochs.current();
        assert_eq!(current.start_block, EPOCH_END + 1);
        assert!(current.contains(EPOCH_END + 1));
        assert!(node.epochs.next().is_none());
    }

    // The dry run one block before the boundary kept everyone in the
    // roster, so every node signalled participation.
    let participating = all_actions
        .iter()
        .filter(|a| matches!(a, Action::StartParticipating))
        .count();
    assert_eq!(participating, 4);

    // Commits were persisted for every height on every node.
    let commits = all_actions
        .iter()
        .filter(|a| matches!(a, Action::CommitBlock { .. }))
        .count();
    assert_eq!(commits as u64, 4 * (EPOCH_END + 1));

    // Height end_block + 1 was validated under the new roster and its
    // announcement backfilled epoch 0's end time in the store.
    let epoch_zero = load_epoch(nodes[0].store.as_ref(), 0).unwrap();
    assert_ne!(epoch_zero.end_time_ms, 0);
}

#[test]
fn epoch_state_survives_a_restart_mid_epoch() {
    let mut nodes: Vec<TestNode> = (0..4).map(make_node).collect();
    for height in 1..=2 {
        run_height(&mut nodes, height);
    }

    // Reopen node 0's epoch state from its store alone.
    let node = &nodes[0];
    let (epoch_doc, reward_doc) = {
        let validators = (0..4)
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
        (
            EpochDoc {
                number: 0,
                start_block: 0,
                end_block: EPOCH_END,
                start_time_ms: 1_000,
                validators,
            },
            RewardSchemeDoc {
                total_reward: 100,
                reward_first_year: 10,
                epoch_number_per_year: 12,
                total_year: 10,
            },
        )
    };
    let reopened =
        EpochManager::load_or_init(node.store.clone(), &epoch_doc, &reward_doc, 16).unwrap();
    assert_eq!(reopened.current_number(), node.epochs.current_number());
    assert_eq!(
        reopened.current().validators.hash(),
        node.epochs.current().validators.hash()
    );
}

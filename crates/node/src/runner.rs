//! The node runner.
//!
//! Owns the event loop: timeout fires and inbound network messages go into
//! the round driver, and the actions that come back out are executed here.
//! The driver never does I/O itself, so this is the only place that touches
//! the ticker, the outbound channel and the block store.

use neatcon_consensus::{RoundState, TimeoutTicker};
use neatcon_core::{Action, Event, OutboundMessage, StateMachine};
use neatcon_epoch::{KvStore, StoreError};
use neatcon_types::{BlockError, Commit, ConsensusBlock};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

const BLOCK_KEY_PREFIX: &[u8] = b"BLOCK:";
const LAST_HEIGHT_KEY: &[u8] = b"CHAIN:LAST_HEIGHT";
const LAST_COMMIT_KEY: &[u8] = b"CHAIN:LAST_COMMIT";

const INBOUND_CAPACITY: usize = 1024;

/// Errors from the node runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("event channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("codec error: {0}")]
    Codec(String),
}

/// Handle for shutting down a running [`Runner`].
///
/// When dropped, signals the runner to exit gracefully.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// The caller's side of a running node: feed it events, watch it
/// participate, shut it down.
pub struct RunnerHandle {
    /// Inbound consensus messages (proposals, parts, votes) go here.
    pub inbound: mpsc::Sender<Event>,
    pub shutdown: ShutdownHandle,
    /// Flips to `true` when the node becomes a validator of the next epoch.
    pub participation: watch::Receiver<bool>,
}

/// Drives a [`RoundState`] with real time and real storage.
pub struct Runner {
    state: RoundState,
    store: Arc<dyn KvStore>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    inbound_rx: mpsc::Receiver<Event>,
    shutdown_rx: oneshot::Receiver<()>,
    participation_tx: watch::Sender<bool>,
}

impl Runner {
    pub fn new(
        state: RoundState,
        outbound_tx: mpsc::Sender<OutboundMessage>,
        store: Arc<dyn KvStore>,
    ) -> (Self, RunnerHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (participation_tx, participation_rx) = watch::channel(false);
        let runner = Self {
            state,
            store,
            outbound_tx,
            inbound_rx,
            shutdown_rx,
            participation_tx,
        };
        let handle = RunnerHandle {
            inbound: inbound_tx,
            shutdown: ShutdownHandle {
                tx: Some(shutdown_tx),
            },
            participation: participation_rx,
        };
        (runner, handle)
    }

    /// Run until shutdown. Timeout fires take priority over network input
    /// so that a message flood cannot stall the round clock.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        let (ticker, mut timeout_rx) = TimeoutTicker::spawn();
        info!(height = self.state.height(), "starting consensus runner");

        let started = self.state.start();
        self.process_actions(started, &ticker).await?;

        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!("shutdown signal received");
                    break;
                }

                Some(info) = timeout_rx.recv() => {
                    let actions = self.state.handle(Event::TimeoutFired(info));
                    self.process_actions(actions, &ticker).await?;
                }

                event = self.inbound_rx.recv() => match event {
                    Some(Event::Stop) | None => {
                        info!("inbound channel closed, stopping");
                        break;
                    }
                    Some(event) => {
                        debug!(kind = event.type_name(), "handling inbound event");
                        let actions = self.state.handle(event);
                        self.process_actions(actions, &ticker).await?;
                    }
                },
            }
        }

        ticker.stop();
        Ok(())
    }

    async fn process_actions(
        &mut self,
        actions: Vec<Action>,
        ticker: &TimeoutTicker,
    ) -> Result<(), RunnerError> {
        for action in actions {
            match action {
                Action::ScheduleTimeout(info) => {
                    ticker.schedule(info);
                }
                Action::Broadcast(message) => {
                    debug!(kind = message.type_name(), "broadcasting");
                    if self.outbound_tx.send(message).await.is_err() {
                        warn!("outbound channel closed, broadcast dropped");
                    }
                }
                Action::CommitBlock { block, commit } => {
                    self.persist_block(&block, &commit)?;
                }
                Action::StartParticipating => {
                    info!("eligible for the next epoch, participating");
                    let _ = self.participation_tx.send(true);
                }
            }
        }
        Ok(())
    }

    /// Persist the committed block and advance the chain tip, durably.
    fn persist_block(&self, block: &ConsensusBlock, commit: &Commit) -> Result<(), RunnerError> {
        let height = block.height();
        let bytes = block.to_bytes()?;
        self.store.put(&block_key(height), &bytes)?;
        let commit_bytes =
            sbor::basic_encode(commit).map_err(|e| RunnerError::Codec(format!("{e:?}")))?;
        self.store.put(LAST_COMMIT_KEY, &commit_bytes)?;
        self.store.put(LAST_HEIGHT_KEY, &height.to_be_bytes())?;
        info!(height, "block persisted");
        Ok(())
    }
}

pub fn block_key(height: u64) -> Vec<u8> {
    let mut key = BLOCK_KEY_PREFIX.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Load a committed block by height.
pub fn load_block(
    store: &dyn KvStore,
    height: u64,
) -> Result<Option<ConsensusBlock>, RunnerError> {
    match store.get(&block_key(height))? {
        Some(bytes) => Ok(Some(ConsensusBlock::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Restore the chain tip after a restart: the last committed block's
/// envelope plus the commit that sealed it. `None` means a fresh chain.
pub fn load_last_state(
    store: &dyn KvStore,
) -> Result<Option<(neatcon_types::BlockExtra, Commit)>, RunnerError> {
    let Some(height_bytes) = store.get(LAST_HEIGHT_KEY)? else {
        return Ok(None);
    };
    let height = u64::from_be_bytes(
        height_bytes
            .try_into()
            .map_err(|_| RunnerError::Codec("malformed last-height marker".into()))?,
    );
    let Some(block) = load_block(store, height)? else {
        return Ok(None);
    };
    let Some(commit_bytes) = store.get(LAST_COMMIT_KEY)? else {
        return Ok(None);
    };
    let commit =
        sbor::basic_decode(&commit_bytes).map_err(|e| RunnerError::Codec(format!("{e:?}")))?;
    Ok(Some((block.extra, commit)))
}

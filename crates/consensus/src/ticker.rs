//! The timeout ticker.
//!
//! A single tokio task owns the one armed timer. Callers schedule through a
//! bounded queue; the latest schedule always supersedes whatever was armed,
//! with no monotonicity filtering at this layer — a fire carries the
//! `TimeoutInfo` that was active at arm time, and callers discard stale
//! fires by comparing its (height, round, step) against their state.

use neatcon_core::TimeoutInfo;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Bounded schedule queue. Callers keep at most one outstanding timeout per
/// logical step, so this never fills in correct operation.
const SCHEDULE_QUEUE_CAPACITY: usize = 10;

/// Idle re-arm horizon when nothing is scheduled.
const IDLE_PARK: Duration = Duration::from_secs(3600);

/// Handle to the ticker task.
pub struct TimeoutTicker {
    schedule_tx: mpsc::Sender<TimeoutInfo>,
    handle: JoinHandle<()>,
}

impl TimeoutTicker {
    /// Spawn the ticker task. Fired timeouts arrive on the returned
    /// receiver, one per active schedule.
    pub fn spawn() -> (Self, mpsc::Receiver<TimeoutInfo>) {
        let (schedule_tx, schedule_rx) = mpsc::channel(SCHEDULE_QUEUE_CAPACITY);
        let (fired_tx, fired_rx) = mpsc::channel(SCHEDULE_QUEUE_CAPACITY);
        let handle = tokio::spawn(run(schedule_rx, fired_tx));
        (
            Self {
                schedule_tx,
                handle,
            },
            fired_rx,
        )
    }

    /// Arm the ticker. Never blocks; returns false if the queue is full or
    /// the ticker has stopped (both mean the caller is misbehaving or
    /// shutting down, and the schedule is dropped).
    pub fn schedule(&self, info: TimeoutInfo) -> bool {
        match self.schedule_tx.try_send(info) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "timeout schedule dropped");
                false
            }
        }
    }

    /// Stop the ticker task. No further fires are emitted; schedules queued
    /// past this point are dropped.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for TimeoutTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(mut schedule_rx: mpsc::Receiver<TimeoutInfo>, fired_tx: mpsc::Sender<TimeoutInfo>) {
    let mut armed: Option<TimeoutInfo> = None;
    let sleep = tokio::time::sleep(IDLE_PARK);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            request = schedule_rx.recv() => {
                match request {
                    Some(info) => {
                        // Zero duration means "fire immediately"; the timer
                        // still goes through the sleep so ordering with the
                        // select loop stays uniform.
                        trace!(%info, "arming timeout");
                        sleep.as_mut().reset(Instant::now() + info.duration);
                        armed = Some(info);
                    }
                    None => break,
                }
            }
            () = &mut sleep, if armed.is_some() => {
                if let Some(info) = armed.take() {
                    trace!(%info, "timeout fired");
                    if fired_tx.send(info).await.is_err() {
                        break;
                    }
                }
                sleep.as_mut().reset(Instant::now() + IDLE_PARK);
            }
        }
    }
}

//! Drain signaling between the worker and passive monitors.
//!
//! Monitors cannot share the worker's status channel; they arrive later
//! and only care about the end. Each drain is published on a watch
//! channel, tagged with a monotonically increasing epoch and the final
//! task status of the batch. A monitor's epoch is captured by the queue
//! under the same lock as its enqueue (and drains are published under
//! that lock too), so a drain can never be missed, observed twice, or
//! attributed to the wrong worker lineage.

use genbridge_core::types::StatusUpdate;
use tokio::sync::watch;

/// Snapshot published on every drain.
#[derive(Debug, Clone, Default)]
pub struct DrainState {
    /// Incremented once per completed drain.
    pub epoch: u64,
    /// Terminal status of the last task in the drained batch, if any task
    /// was processed.
    pub final_update: Option<StatusUpdate>,
}

/// The watch channel's write side plus its epoch counter.
#[derive(Debug)]
pub struct DrainBoard {
    tx: watch::Sender<DrainState>,
}

impl Default for DrainBoard {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(DrainState::default());
        Self { tx }
    }
}

impl DrainBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Epoch of the most recent drain.
    pub fn current_epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    /// Subscribe for drain notifications.
    pub fn subscribe(&self) -> watch::Receiver<DrainState> {
        self.tx.subscribe()
    }

    /// Publish a completed drain. Called once per worker lineage, by the
    /// queue, under the same lock that serializes enqueues.
    pub fn publish_drain(&self, final_update: Option<StatusUpdate>) {
        self.tx.send_modify(|state| {
            state.epoch += 1;
            state.final_update = final_update;
        });
    }
}

/// Wait until a drain newer than `captured_epoch` is published.
///
/// Returns the drain state, or `None` if the board was dropped (the
/// coordinator went away entirely).
pub async fn wait_for_drain(
    rx: &mut watch::Receiver<DrainState>,
    captured_epoch: u64,
) -> Option<DrainState> {
    rx.wait_for(|state| state.epoch > captured_epoch)
        .await
        .ok()
        .map(|state| state.clone())
}

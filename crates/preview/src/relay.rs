//! Consumer-facing handle over the preview subscription.
//!
//! [`PreviewRelay`] owns the background listener task; [`PreviewHandle`]
//! is the cheap, cloneable read side that UI polling code holds.

use std::sync::{Arc, Mutex};

use genbridge_engine::reconnect::ReconnectConfig;
use genbridge_engine::session::EngineSession;
use tokio_util::sync::CancellationToken;

use crate::listener::run_listener;
use crate::state::{CachedFrame, ConnectionState, PreviewShared, Progress};

/// Owner of one session's preview subscription.
///
/// Dropping the relay stops the listener; [`PreviewHandle`]s outliving it
/// keep serving whatever frame was cached last.
pub struct PreviewRelay {
    shared: Arc<PreviewShared>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PreviewRelay {
    /// Start the subscription for `session` with default backoff.
    ///
    /// Must be called from within a tokio runtime; the listener task is
    /// spawned immediately.
    pub fn start(session: Arc<EngineSession>) -> Self {
        Self::start_with(session, ReconnectConfig::default())
    }

    /// Start with custom reconnect tuning.
    pub fn start_with(session: Arc<EngineSession>, reconnect: ReconnectConfig) -> Self {
        let shared = Arc::new(PreviewShared::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_listener(
            session,
            Arc::clone(&shared),
            reconnect,
            cancel.clone(),
        ));

        Self {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// A read handle onto the cache. Handles are independent clones; hand
    /// them out freely.
    pub fn handle(&self) -> PreviewHandle {
        PreviewHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Signal the listener to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the listener task to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for PreviewRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Read-only view of the latest preview state.
#[derive(Clone)]
pub struct PreviewHandle {
    shared: Arc<PreviewShared>,
}

impl PreviewHandle {
    /// The most recent preview frame, or `None` before the first frame of
    /// the session arrives. Never blocks, never waits for the network.
    pub fn latest(&self) -> Option<CachedFrame> {
        self.shared.latest_frame()
    }

    /// Step progress of the currently executing node, if a job is running.
    pub fn progress(&self) -> Option<Progress> {
        self.shared.progress()
    }

    /// Health of the underlying subscription.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection()
    }
}

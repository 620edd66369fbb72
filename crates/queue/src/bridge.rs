//! Production assembly: one engine, one session, everything wired.
//!
//! The engine only routes preview frames to the WebSocket client whose id
//! matches the `client_id` used at submission. [`Bridge`] owns the single
//! [`EngineSession`] and mints every [`Task`] from it, so the coordinator
//! and the preview relay can never drift onto different ids.

use std::sync::Arc;

use genbridge_core::config::EngineConfig;
use genbridge_core::types::{SessionId, StatusUpdate, Task};
use genbridge_engine::session::EngineSession;
use genbridge_preview::{PreviewHandle, PreviewRelay};
use tokio::sync::mpsc;

use crate::coordinator::Coordinator;
use crate::executor::EngineExecutor;

/// A fully wired coordinator plus preview relay for one engine instance.
pub struct Bridge {
    session: Arc<EngineSession>,
    coordinator: Coordinator,
    preview: PreviewRelay,
}

impl Bridge {
    /// Connect all components to the engine described by `config`.
    ///
    /// Spawns the preview listener immediately, so this must run inside a
    /// tokio runtime.
    pub fn launch(config: &EngineConfig) -> Self {
        let session = Arc::new(EngineSession::new(config));
        let coordinator = Coordinator::new(Arc::new(EngineExecutor::new(config)));
        let preview = PreviewRelay::start(Arc::clone(&session));

        tracing::info!(
            session_id = %session.session_id(),
            api_url = %session.api_url(),
            ws_url = %session.ws_url(),
            "Bridge launched",
        );

        Self {
            session,
            coordinator,
            preview,
        }
    }

    /// The session id shared by submissions and the preview subscription.
    pub fn session_id(&self) -> &SessionId {
        self.session.session_id()
    }

    /// Build a task bound to this bridge's session and submit it.
    pub fn generate(&self, payload: serde_json::Value) -> mpsc::UnboundedReceiver<StatusUpdate> {
        let task = Task::new(self.session_id().clone(), payload);
        self.coordinator.submit(task)
    }

    /// Read handle for the latest preview frame.
    pub fn preview(&self) -> PreviewHandle {
        self.preview.handle()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Best-effort stop of the current engine job.
    pub async fn interrupt(&self) {
        self.coordinator.interrupt().await;
    }

    /// Stop the preview listener and wait for it to exit.
    pub async fn shutdown(&self) {
        self.preview.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> EngineConfig {
        EngineConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            ws_url: "ws://127.0.0.1:9".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tasks_inherit_the_bridge_session() {
        let bridge = Bridge::launch(&unreachable_config());
        let session_id = bridge.session_id().clone();

        // The id every submission will carry as client_id.
        let task = Task::new(bridge.session_id().clone(), serde_json::json!({}));
        assert_eq!(task.session_id, session_id);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn preview_starts_empty() {
        let bridge = Bridge::launch(&unreachable_config());
        assert!(bridge.preview().latest().is_none());
        bridge.shutdown().await;
    }
}

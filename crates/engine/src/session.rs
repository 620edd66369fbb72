//! WebSocket session handling for the engine's event stream.
//!
//! [`EngineSession`] binds one [`SessionId`] to the engine's WebSocket and
//! HTTP endpoints. The same id is handed to [`EngineApi::submit`] as the
//! `client_id` and appended to the WebSocket handshake, so the engine
//! routes a job's progress and preview events back to the subscription
//! that watches it. Construct the session once and borrow the id from it
//! everywhere; never mint a second id for the same lineage.
//!
//! [`EngineApi::submit`]: crate::api::EngineApi::submit

use genbridge_core::config::EngineConfig;
use genbridge_core::types::SessionId;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Connection configuration for one logical session against the engine.
pub struct EngineSession {
    session_id: SessionId,
    ws_url: String,
    api_url: String,
}

/// A live WebSocket subscription to the engine's event stream.
pub struct EngineSocket {
    /// The session the subscription is scoped to.
    pub session_id: SessionId,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl EngineSession {
    /// Create a session with a freshly generated id.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            session_id: SessionId::generate(),
            ws_url: config.ws_url.clone(),
            api_url: config.api_url.clone(),
        }
    }

    /// The session id shared by submission and the event subscription.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// HTTP base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Open the event-stream subscription for this session.
    ///
    /// The session id is appended as the `clientId` query parameter so the
    /// engine can address preview frames and progress events to us.
    pub async fn connect(&self) -> Result<EngineSocket, EngineSessionError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, self.session_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            EngineSessionError::Connection(format!(
                "failed to connect to engine at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            session_id = %self.session_id,
            "Connected to engine event stream at {}",
            self.ws_url,
        );

        Ok(EngineSocket {
            session_id: self.session_id.clone(),
            ws_stream,
        })
    }
}

/// Errors from the WebSocket session layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineSessionError {
    /// Failed to establish the initial WebSocket connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_stable_across_accessors() {
        let session = EngineSession::new(&EngineConfig::default());
        let first = session.session_id().clone();
        let second = session.session_id().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn session_exposes_its_endpoints() {
        let config = EngineConfig {
            api_url: "http://engine:8188".to_string(),
            ws_url: "ws://engine:8188".to_string(),
            ..Default::default()
        };
        let session = EngineSession::new(&config);
        assert_eq!(session.api_url(), "http://engine:8188");
        assert_eq!(session.ws_url(), "ws://engine:8188");
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let config = EngineConfig::default();
        let a = EngineSession::new(&config);
        let b = EngineSession::new(&config);
        assert_ne!(a.session_id(), b.session_id());
    }
}

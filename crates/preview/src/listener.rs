//! The background task that feeds the preview cache.
//!
//! Owns the persistent event-stream subscription for one session: read
//! frames, update [`PreviewShared`], and when the socket drops, rebuild it
//! through the engine's backoff loop. The task ends only when its
//! [`CancellationToken`] fires.

use std::sync::Arc;

use futures::StreamExt;
use genbridge_engine::messages::{self, EngineMessage};
use genbridge_engine::reconnect::{reconnect_loop, ReconnectConfig};
use genbridge_engine::session::EngineSession;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::state::{ConnectionState, PreviewShared, Progress};

/// Run the subscription until cancelled.
///
/// Never returns an error: connection failures are absorbed by the
/// backoff loop, and malformed frames are logged and dropped. The cache's
/// [`ConnectionState`] is the only health surface consumers see.
pub async fn run_listener(
    session: Arc<EngineSession>,
    shared: Arc<PreviewShared>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    loop {
        shared.set_connection(ConnectionState::Connecting);

        let Some(socket) = reconnect_loop(&session, &reconnect, &cancel).await else {
            shared.set_connection(ConnectionState::Stopped);
            return;
        };

        shared.set_connection(ConnectionState::Connected);
        let mut ws_stream = socket.ws_stream;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    shared.set_connection(ConnectionState::Stopped);
                    return;
                }
                message = ws_stream.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            match messages::parse_preview_frame(&data) {
                                Ok(frame) => shared.store_frame(frame),
                                Err(e) => tracing::trace!(
                                    session_id = %session.session_id(),
                                    error = %e,
                                    "Ignoring binary frame",
                                ),
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            match messages::parse_message(&text) {
                                Ok(msg) => apply_message(&shared, &msg),
                                Err(e) => tracing::debug!(
                                    session_id = %session.session_id(),
                                    error = %e,
                                    "Ignoring unrecognized event message",
                                ),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(
                                session_id = %session.session_id(),
                                "Event stream closed, reconnecting",
                            );
                            break;
                        }
                        Some(Ok(_)) => {} // ping/pong
                        Some(Err(e)) => {
                            tracing::warn!(
                                session_id = %session.session_id(),
                                error = %e,
                                "Event stream error, reconnecting",
                            );
                            break;
                        }
                    }
                }
            }
        }

        shared.set_connection(ConnectionState::Disconnected);
    }
}

/// Fold one typed event message into the cache.
fn apply_message(shared: &PreviewShared, msg: &EngineMessage) {
    match msg {
        EngineMessage::Progress(data) => {
            shared.set_progress(Progress {
                value: data.value,
                max: data.max,
                node: data.node.clone(),
            });
        }
        EngineMessage::Executing(data) if data.node.is_none() => {
            // Job finished; stale step counts should not linger.
            shared.clear_progress();
        }
        EngineMessage::ExecutionError(data) => {
            tracing::warn!(
                job_id = %data.prompt_id,
                node_id = %data.node_id,
                "Engine reported {}: {}",
                data.exception_type,
                data.exception_message,
            );
            shared.clear_progress();
        }
        _ => {}
    }
}

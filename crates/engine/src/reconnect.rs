//! Exponential-backoff reconnection for the event-stream subscription.
//!
//! When the engine drops the WebSocket (restarts, network blips), callers
//! keep the subscription alive by calling [`reconnect_loop`], which retries
//! with growing delays until the connection is restored or the
//! [`CancellationToken`] fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::session::{EngineSession, EngineSocket};

/// Tunable parameters for the exponential-backoff strategy.
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Attempt to re-establish the event subscription with exponential backoff.
///
/// Returns `Some(socket)` once a connection succeeds, or `None` if the
/// `cancel` token fires first.
pub async fn reconnect_loop(
    session: &EngineSession,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<EngineSocket> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        tracing::info!(
            session_id = %session.session_id(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to engine event stream",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(session_id = %session.session_id(), "Reconnect cancelled");
                return None;
            }
            result = session.connect() => {
                match result {
                    Ok(socket) => {
                        tracing::info!(
                            session_id = %session.session_id(),
                            attempt,
                            "Reconnected to engine event stream",
                        );
                        return Some(socket);
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session.session_id(),
                            error = %e,
                            "Reconnect attempt {attempt} failed",
                        );
                    }
                }
            }
        }

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}

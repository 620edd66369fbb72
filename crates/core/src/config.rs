//! Engine connection and polling configuration.
//!
//! All knobs can be supplied through `GENBRIDGE_*` environment variables;
//! anything absent or unparseable falls back to the defaults that match a
//! local engine on the standard port.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one downstream engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// HTTP base URL, e.g. `http://127.0.0.1:8188`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://127.0.0.1:8188`.
    pub ws_url: String,
    /// The engine's output directory, used by the filesystem-diff
    /// completion strategy.
    pub output_dir: PathBuf,
    /// Node class types whose presence in a payload declares a completion
    /// marker (the side-channel written by this project's companion output
    /// nodes).
    pub marker_node_types: Vec<String>,
    /// Interval between completion polls.
    pub poll_interval: Duration,
    /// Pause after the queue-absence strategy fires, letting output files
    /// land on disk before the directory diff.
    pub settle_delay: Duration,
    /// Hard wall-clock deadline for completion detection of one job.
    pub detect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8188".to_string(),
            ws_url: "ws://127.0.0.1:8188".to_string(),
            output_dir: PathBuf::from("output"),
            marker_node_types: vec![
                "BridgeOutputImage".to_string(),
                "BridgeOutputVideo".to_string(),
            ],
            poll_interval: Duration::from_millis(500),
            settle_delay: Duration::from_secs(1),
            detect_timeout: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    /// Build a config from `GENBRIDGE_*` environment variables, falling
    /// back to [`EngineConfig::default`] per field.
    ///
    /// Recognized variables: `GENBRIDGE_API_URL`, `GENBRIDGE_WS_URL`,
    /// `GENBRIDGE_OUTPUT_DIR`, `GENBRIDGE_MARKER_NODE_TYPES`
    /// (comma-separated), `GENBRIDGE_POLL_INTERVAL_MS`,
    /// `GENBRIDGE_SETTLE_DELAY_MS`, `GENBRIDGE_DETECT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_url: env_string("GENBRIDGE_API_URL").unwrap_or(defaults.api_url),
            ws_url: env_string("GENBRIDGE_WS_URL").unwrap_or(defaults.ws_url),
            output_dir: env_string("GENBRIDGE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            marker_node_types: env_string("GENBRIDGE_MARKER_NODE_TYPES")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.marker_node_types),
            poll_interval: env_u64("GENBRIDGE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            settle_delay: env_u64("GENBRIDGE_SETTLE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            detect_timeout: env_u64("GENBRIDGE_DETECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.detect_timeout),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

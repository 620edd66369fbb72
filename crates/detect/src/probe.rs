//! The detector's read-only view of the engine.
//!
//! [`JobProbe`] abstracts the two HTTP reads completion detection needs,
//! so the polling loops can be exercised in tests against scripted fakes.
//! [`EngineProbe`] is the production implementation over
//! [`genbridge_engine::api::EngineApi`].

use async_trait::async_trait;
use genbridge_engine::api::{EngineApi, EngineApiError, QueueSnapshot};

/// Errors surfaced by a probe. Every probe error is treated as transient
/// by the detector: logged and retried, never terminal on its own.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The underlying engine request failed.
    #[error("engine request failed: {0}")]
    Request(String),
}

/// Read-only engine queries used by completion detection.
#[async_trait]
pub trait JobProbe: Send + Sync {
    /// Fetch the raw history record for a job id.
    async fn history(&self, id: &str) -> Result<serde_json::Value, ProbeError>;

    /// Fetch the current queue listing.
    async fn queue(&self) -> Result<QueueSnapshot, ProbeError>;
}

/// Production probe backed by the engine's REST API.
pub struct EngineProbe {
    api: EngineApi,
}

impl EngineProbe {
    pub fn new(api: EngineApi) -> Self {
        Self { api }
    }
}

impl From<EngineApiError> for ProbeError {
    fn from(e: EngineApiError) -> Self {
        ProbeError::Request(e.to_string())
    }
}

#[async_trait]
impl JobProbe for EngineProbe {
    async fn history(&self, id: &str) -> Result<serde_json::Value, ProbeError> {
        Ok(self.api.history(id).await?)
    }

    async fn queue(&self) -> Result<QueueSnapshot, ProbeError> {
        Ok(self.api.queue().await?)
    }
}

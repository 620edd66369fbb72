//! REST API client for the engine's HTTP endpoints.
//!
//! Wraps job submission, the live queue listing, history retrieval, and
//! best-effort interruption using [`reqwest`]. Responses are surfaced with
//! as little interpretation as possible; deciding what they *mean* (most
//! importantly, whether a job is finished) is the detector's job.

use std::time::Duration;

use genbridge_core::types::{JobId, SessionId};
use serde::Deserialize;

/// Upper bound on any single engine request. The engine can sit on a
/// socket indefinitely when it is wedged; callers poll, so a slow answer
/// is worth no more than a retried one.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared HTTP client with the per-request timeout applied.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// HTTP client for a single engine instance.
pub struct EngineApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the submit endpoint after queuing a job.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued job.
    pub prompt_id: String,
    /// Position in the engine's execution queue.
    pub number: i64,
    /// Per-node validation errors. A non-empty object means the engine
    /// accepted the request but will not execute the job.
    #[serde(default)]
    pub node_errors: Option<serde_json::Value>,
}

impl SubmitResponse {
    pub fn job_id(&self) -> JobId {
        JobId::new(self.prompt_id.clone())
    }

    /// True when the engine reported node validation errors.
    pub fn has_node_errors(&self) -> bool {
        match &self.node_errors {
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(serde_json::Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// A point-in-time view of the engine's work queue, reduced to the job ids
/// in each sublist.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub running: Vec<String>,
    pub pending: Vec<String>,
}

impl QueueSnapshot {
    /// True if the job appears in either the running or pending sublist.
    pub fn contains(&self, job_id: &JobId) -> bool {
        let id = job_id.as_str();
        self.running.iter().any(|j| j == id) || self.pending.iter().any(|j| j == id)
    }
}

/// Raw wire shape of the queue listing. Entries are tuple-shaped arrays
/// (`[seq, job_id, ...]`) on current engine versions, but older builds
/// return objects with a `prompt_id` field; both are tolerated.
#[derive(Debug, Deserialize)]
struct QueueListing {
    #[serde(default)]
    queue_running: Vec<serde_json::Value>,
    #[serde(default)]
    queue_pending: Vec<serde_json::Value>,
}

/// Pull the job id out of one queue entry, whichever shape it has.
fn entry_job_id(entry: &serde_json::Value) -> Option<String> {
    match entry {
        serde_json::Value::Array(items) => items.get(1)?.as_str().map(str::to_string),
        serde_json::Value::Object(map) => map.get("prompt_id")?.as_str().map(str::to_string),
        _ => None,
    }
}

impl From<QueueListing> for QueueSnapshot {
    fn from(listing: QueueListing) -> Self {
        Self {
            running: listing.queue_running.iter().filter_map(entry_job_id).collect(),
            pending: listing.queue_pending.iter().filter_map(entry_job_id).collect(),
        }
    }
}

/// Errors from the engine REST layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("engine API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl EngineApi {
    /// Create a new API client.
    ///
    /// * `api_url` - base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: http_client(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (connection pooling across components).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Submit a job payload for execution.
    ///
    /// Sends `POST /prompt` with the payload and the session's client id.
    /// The session id must be the same one used for the preview
    /// subscription, or the engine will route events elsewhere.
    pub async fn submit(
        &self,
        payload: &serde_json::Value,
        session_id: &SessionId,
    ) -> Result<SubmitResponse, EngineApiError> {
        let body = serde_json::json!({
            "prompt": payload,
            "client_id": session_id.as_str(),
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the live queue listing, reduced to job ids.
    pub async fn queue(&self) -> Result<QueueSnapshot, EngineApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.api_url))
            .send()
            .await?;

        let listing: QueueListing = Self::parse_response(response).await?;
        Ok(listing.into())
    }

    /// Retrieve the raw history record for a job or session id.
    ///
    /// Sends `GET /history/{id}`. The result is a JSON map keyed by job id;
    /// presence/absence of `outputs` and `status` fields inside an entry is
    /// the only reliable signal, so the raw value is returned untouched.
    pub async fn history(&self, id: &str) -> Result<serde_json::Value, EngineApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Interrupt whatever the engine is executing right now.
    ///
    /// Sends `POST /interrupt`. Best-effort: the engine gives no
    /// confirmation that anything actually stopped.
    pub async fn interrupt(&self) -> Result<(), EngineApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or an [`EngineApiError::Api`] with the status
    /// and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), EngineApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

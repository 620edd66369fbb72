//! Task execution: submit to the engine, then detect completion.
//!
//! [`TaskExecutor`] is the seam between the worker loop and the engine,
//! so coordination logic can be tested against scripted executors.
//! [`EngineExecutor`] is the production implementation: seed
//! randomization, baseline snapshot, submission, strategy selection, and
//! completion detection, in that order.

use async_trait::async_trait;
use chrono::Utc;
use genbridge_core::config::EngineConfig;
use genbridge_core::types::{CompletionResult, JobHandle, Task};
use genbridge_detect::detector::{CompletionDetector, DetectorConfig};
use genbridge_detect::outputs::OutputSnapshot;
use genbridge_detect::probe::EngineProbe;
use genbridge_detect::strategy::choose_strategy;
use genbridge_engine::api::{http_client, EngineApi};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Why a submission did not yield a running job.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The engine accepted the request but refused the job (node
    /// validation errors). Retrying the same payload will fail again.
    #[error("engine rejected the job: {0}")]
    Rejected(String),

    /// The request itself failed; the job may be retryable.
    #[error("submission failed: {0}")]
    Transport(String),
}

/// A submitted job plus everything detection needs to resolve it.
pub struct ExecutionContext {
    pub handle: JobHandle,
    /// Output-directory snapshot taken before submission.
    pub baseline: OutputSnapshot,
}

/// The worker loop's view of job execution.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Submit the task to the engine.
    async fn submit(&self, task: &Task) -> Result<ExecutionContext, SubmitError>;

    /// Drive the submitted job to its terminal result.
    async fn wait(&self, ctx: ExecutionContext) -> CompletionResult;

    /// Ask the engine to stop whatever is executing. Best-effort; the
    /// default does nothing.
    async fn interrupt(&self) {}
}

/// Production executor over the engine's REST API and the detector.
pub struct EngineExecutor {
    api: EngineApi,
    detector: CompletionDetector,
    marker_node_types: Vec<String>,
    output_dir: PathBuf,
    detect_timeout: Duration,
}

impl EngineExecutor {
    /// Build an executor, sharing one HTTP connection pool between
    /// submission and detection polling.
    pub fn new(config: &EngineConfig) -> Self {
        let client = http_client();
        let api = EngineApi::with_client(client.clone(), config.api_url.clone());
        let probe = EngineProbe::new(EngineApi::with_client(client, config.api_url.clone()));
        let detector = CompletionDetector::new(Arc::new(probe), DetectorConfig::from_engine(config));

        Self {
            api,
            detector,
            marker_node_types: config.marker_node_types.clone(),
            output_dir: config.output_dir.clone(),
            detect_timeout: config.detect_timeout,
        }
    }
}

#[async_trait]
impl TaskExecutor for EngineExecutor {
    async fn submit(&self, task: &Task) -> Result<ExecutionContext, SubmitError> {
        let mut payload = task.payload.clone();
        randomize_seeds(&mut payload);

        // Captured before submission so anything the job writes shows up
        // in the diff.
        let baseline = OutputSnapshot::capture(&self.output_dir);

        let response = self
            .api
            .submit(&payload, &task.session_id)
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        if response.has_node_errors() {
            let detail = response
                .node_errors
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unspecified node errors".to_string());
            return Err(SubmitError::Rejected(detail));
        }

        let strategy = choose_strategy(&payload, &self.marker_node_types);
        tracing::info!(
            task_id = %task.id,
            job_id = %response.prompt_id,
            ?strategy,
            queue_number = response.number,
            "Job submitted",
        );

        Ok(ExecutionContext {
            handle: JobHandle {
                job_id: response.job_id(),
                session_id: task.session_id.clone(),
                submitted_at: Utc::now(),
                strategy,
            },
            baseline,
        })
    }

    async fn wait(&self, ctx: ExecutionContext) -> CompletionResult {
        self.detector
            .detect(&ctx.handle, &ctx.baseline, self.detect_timeout)
            .await
    }

    async fn interrupt(&self) {
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(error = %e, "Interrupt request failed");
        }
    }
}

const SEED_KEYS: [&str; 2] = ["seed", "noise_seed"];

/// Give every seed-bearing node a fresh random seed.
///
/// The engine serves byte-identical payloads from its execution cache and
/// produces no new outputs for them, which starves every completion
/// signal. Fresh seeds force a real execution each time.
fn randomize_seeds(payload: &mut serde_json::Value) {
    let Some(nodes) = payload.as_object_mut() else {
        return;
    };

    let mut rng = rand::rng();
    for node in nodes.values_mut() {
        let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) else {
            continue;
        };
        for key in SEED_KEYS {
            if inputs.get(key).map(|v| v.is_u64() || v.is_i64()).unwrap_or(false) {
                inputs.insert(key.to_string(), serde_json::json!(rng.random::<u32>() as u64));
            }
        }
    }
}

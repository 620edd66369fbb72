//! Core data model for the coordinator.
//!
//! A [`Task`] is what callers enqueue; submitting one to the engine yields
//! a [`JobHandle`]; completion detection resolves the handle to exactly one
//! [`CompletionResult`]. Every state change along the way is reported to
//! callers as a [`StatusUpdate`].

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-side identifier for one queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Generate a fresh random task id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Engine-assigned identifier for a submitted job (the `prompt_id` returned
/// by the submit endpoint). Opaque to us.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Client identifier shared between job submission and the preview
/// event subscription.
///
/// The engine only routes preview frames and progress events to the
/// WebSocket client whose id matches the `client_id` used at submission.
/// Generating the value once and threading it through both calls makes a
/// mismatch unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session id (UUID v4, like the engine expects for
    /// `client_id` values).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One unit of work a caller wants executed on the engine.
///
/// Immutable once enqueued. The queue owns it from enqueue until the worker
/// dequeues it; ownership then passes to the in-flight execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Session the task belongs to; also the `client_id` used at submission.
    pub session_id: SessionId,
    /// Opaque submission body (the engine's node-graph JSON).
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    /// Create a task with a generated id, stamped now.
    pub fn new(session_id: SessionId, payload: serde_json::Value) -> Self {
        Self {
            id: TaskId::generate(),
            session_id,
            payload,
            submitted_at: Utc::now(),
        }
    }
}

/// How completion will be inferred for a job.
///
/// Chosen once at submission time from the payload's declared capabilities
/// and never changed for that job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStrategy {
    /// The payload contains marker output nodes that write a side-channel
    /// record on completion; poll the history endpoint for it.
    Marker,
    /// No marker declared; treat disappearance from both the running and
    /// pending queue listings as completion.
    QueueAbsence,
    /// Last resort: diff the engine's output directory against a snapshot
    /// taken before submission.
    OutputDiff,
}

/// A successfully submitted job, ready for completion detection.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: JobId,
    pub session_id: SessionId,
    pub submitted_at: DateTime<Utc>,
    pub strategy: CompletionStrategy,
}

/// Files a finished job produced, classified by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutputs {
    pub images: Vec<PathBuf>,
    pub videos: Vec<PathBuf>,
}

impl JobOutputs {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }

    /// Merge another output set into this one, skipping duplicates.
    pub fn merge(&mut self, other: JobOutputs) {
        for path in other.images {
            if !self.images.contains(&path) {
                self.images.push(path);
            }
        }
        for path in other.videos {
            if !self.videos.contains(&path) {
                self.videos.push(path);
            }
        }
    }
}

/// Terminal outcome of one job. Produced exactly once per [`JobHandle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompletionResult {
    Success(JobOutputs),
    Failed(String),
    TimedOut,
}

impl CompletionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Lifecycle phase reported in a [`StatusUpdate`].
///
/// Within one task's lifecycle, phases are emitted in strictly increasing
/// order: queued, submitted, detecting, then one terminal phase. `Drained`
/// closes the whole stream after the queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Queued,
    Submitted,
    Detecting,
    Succeeded,
    Failed,
    TimedOut,
    Drained,
}

/// One emitted lifecycle event in a task's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub phase: TaskPhase,
    /// The task the update refers to; `None` for queue-level updates
    /// such as [`TaskPhase::Drained`].
    pub task_id: Option<TaskId>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(phase: TaskPhase, task_id: Option<TaskId>, detail: impl Into<String>) -> Self {
        Self {
            phase,
            task_id,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    /// `Drained` is the only phase that terminates a status stream.
    pub fn is_stream_terminal(&self) -> bool {
        self.phase == TaskPhase::Drained
    }
}

//! The worker/monitor coordination protocol.
//!
//! [`Coordinator::submit`] enqueues a task and returns a status stream.
//! The first caller against an idle queue becomes the worker: a spawned
//! loop that drains the whole queue in FIFO order, reporting every task's
//! lifecycle on that caller's stream. Callers arriving while the worker
//! is busy become passive monitors: their stream carries their own
//! `Queued` update, then, once the queue drains, the final task status
//! and the terminating `Drained` update.
//!
//! Every stream terminates with exactly one `Drained` update, and there
//! is exactly one finalization path: the worker's, after the atomic
//! empty-check-and-release on the queue.

use std::sync::Arc;

use genbridge_core::types::{CompletionResult, StatusUpdate, Task, TaskPhase};
use tokio::sync::mpsc;

use crate::executor::TaskExecutor;
use crate::queue::{CallerRole, TaskQueue};
use crate::state::wait_for_drain;

/// Coordinates callers around the single-worker queue.
pub struct Coordinator {
    queue: Arc<TaskQueue>,
    executor: Arc<dyn TaskExecutor>,
}

impl Coordinator {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            executor,
        }
    }

    /// Enqueue a task and stream its lifecycle back to the caller.
    ///
    /// Returns immediately; all engine work happens on spawned tasks. The
    /// stream ends with a `Drained` update and then closes. A caller that
    /// drops the receiver loses its view but never disturbs execution:
    /// failed sends are discarded.
    pub fn submit(&self, task: Task) -> mpsc::UnboundedReceiver<StatusUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task_id = task.id;

        // The enqueue returns the drain epoch read under the queue lock,
        // so a monitor waits for exactly the drain that covers its task;
        // a drain published concurrently with this call is either already
        // reflected in the epoch or will advance past it.
        let enqueued = self.queue.enqueue(task);

        match enqueued.role {
            CallerRole::Worker => {
                send(&tx, StatusUpdate::new(TaskPhase::Queued, Some(task_id), "position 0"));
                tracing::debug!(%task_id, "Caller became the worker");

                let queue = Arc::clone(&self.queue);
                let executor = Arc::clone(&self.executor);
                tokio::spawn(async move {
                    run_worker(queue, executor, tx).await;
                });
            }
            CallerRole::Monitor => {
                send(
                    &tx,
                    StatusUpdate::new(
                        TaskPhase::Queued,
                        Some(task_id),
                        format!("position {}, worker active", enqueued.position),
                    ),
                );
                tracing::debug!(%task_id, position = enqueued.position, "Caller is monitoring");

                let mut drain_rx = self.queue.subscribe_drain();
                tokio::spawn(async move {
                    if let Some(state) = wait_for_drain(&mut drain_rx, enqueued.drain_epoch).await {
                        if let Some(final_update) = state.final_update {
                            send(&tx, final_update);
                        }
                    }
                    send(&tx, StatusUpdate::new(TaskPhase::Drained, None, "queue drained"));
                });
            }
        }

        rx
    }

    /// Best-effort interruption of whatever the engine is running.
    ///
    /// The worker keeps draining either way; an interrupted job resolves
    /// through the normal detection path (usually as failed or with
    /// partial outputs).
    pub async fn interrupt(&self) {
        tracing::info!("Interrupt requested");
        self.executor.interrupt().await;
    }

    /// Number of tasks waiting (not counting one in flight).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The task the worker is processing right now, if any.
    pub fn current_task(&self) -> Option<genbridge_core::types::TaskId> {
        self.queue.current_task()
    }
}

/// Releases the worker claim even when the drain loop dies mid-task.
///
/// A panicking executor unwinds the spawned worker; without this guard
/// the claim would stay taken forever and every later caller would park
/// as a monitor on a drain that never comes.
struct WorkerGuard {
    queue: Arc<TaskQueue>,
    tx: mpsc::UnboundedSender<StatusUpdate>,
    finished: bool,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::error!("Worker aborted mid-task; releasing the claim");
        self.queue.abort_worker();
        send(&self.tx, StatusUpdate::new(TaskPhase::Drained, None, "worker aborted"));
    }
}

/// Drain the queue, then finalize exactly once.
async fn run_worker(
    queue: Arc<TaskQueue>,
    executor: Arc<dyn TaskExecutor>,
    tx: mpsc::UnboundedSender<StatusUpdate>,
) {
    let mut guard = WorkerGuard {
        queue: Arc::clone(&queue),
        tx: tx.clone(),
        finished: false,
    };
    let mut last_final: Option<StatusUpdate> = None;

    while let Some(task) = queue.dequeue_or_release(&last_final) {
        let update = execute_one(executor.as_ref(), &task, &tx).await;
        send(&tx, update.clone());
        last_final = Some(update);
    }

    // The single finalization path: the empty dequeue above released the
    // claim and woke the monitors in one atomic step; all that remains is
    // closing the worker's own stream with the same terminating update.
    guard.finished = true;
    send(&tx, StatusUpdate::new(TaskPhase::Drained, None, "queue drained"));
    tracing::debug!("Worker drained the queue");
}

/// Execute one task, emitting its intermediate phases; returns the
/// terminal update (not yet sent).
async fn execute_one(
    executor: &dyn TaskExecutor,
    task: &Task,
    tx: &mpsc::UnboundedSender<StatusUpdate>,
) -> StatusUpdate {
    let task_id = task.id;

    let ctx = match executor.submit(task).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(%task_id, error = %e, "Submission failed");
            return StatusUpdate::new(TaskPhase::Failed, Some(task_id), e.to_string());
        }
    };

    send(
        tx,
        StatusUpdate::new(
            TaskPhase::Submitted,
            Some(task_id),
            format!("job {}", ctx.handle.job_id),
        ),
    );
    send(
        tx,
        StatusUpdate::new(TaskPhase::Detecting, Some(task_id), "waiting for completion"),
    );

    match executor.wait(ctx).await {
        CompletionResult::Success(outputs) => StatusUpdate::new(
            TaskPhase::Succeeded,
            Some(task_id),
            format!("{} image(s), {} video(s)", outputs.images.len(), outputs.videos.len()),
        ),
        CompletionResult::Failed(reason) => {
            StatusUpdate::new(TaskPhase::Failed, Some(task_id), reason)
        }
        CompletionResult::TimedOut => StatusUpdate::new(
            TaskPhase::TimedOut,
            Some(task_id),
            "completion deadline elapsed",
        ),
    }
}

/// Deliver an update if the caller is still listening. A gone caller is
/// normal (UI closed mid-generation) and must not disturb the worker.
fn send(tx: &mpsc::UnboundedSender<StatusUpdate>, update: StatusUpdate) {
    if tx.send(update).is_err() {
        tracing::trace!("Status receiver dropped; update discarded");
    }
}

//! FIFO task queue fused with the worker claim and the drain signal.
//!
//! The queue, the "is a worker active" flag, and the drain publication
//! live under one mutex so the three racy decisions — "does this caller
//! become the worker?", "is the queue really empty when the worker
//! stops?", and "which drain does this monitor wait for?" — are each a
//! single atomic step. Everything done under the lock is O(1); no I/O,
//! no await.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use genbridge_core::types::{StatusUpdate, Task, TaskId};
use tokio::sync::watch;

use crate::state::{DrainBoard, DrainState};

/// What a submitting caller becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    /// First caller against an idle queue; owns the drain loop.
    Worker,
    /// A worker is already draining; this caller only observes.
    Monitor,
}

/// Result of enqueuing one task.
#[derive(Debug, Clone, Copy)]
pub struct Enqueued {
    pub role: CallerRole,
    /// Zero-based position the task landed at.
    pub position: usize,
    /// Drain epoch at the moment of enqueue. A monitor waits for the
    /// epoch to advance past this value; reading it under the same lock
    /// as the enqueue means an already-published drain can never be
    /// mistaken for the one covering this task.
    pub drain_epoch: u64,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: VecDeque<Task>,
    worker_active: bool,
    current_task: Option<TaskId>,
}

/// Shared FIFO queue of pending tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<Inner>,
    drain: DrainBoard,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task and decide the caller's role in the same step.
    ///
    /// The claim is taken here, not by the spawned worker, so two callers
    /// racing an idle queue can never both become workers.
    pub fn enqueue(&self, task: Task) -> Enqueued {
        let mut inner = self.lock();
        let position = inner.tasks.len();
        inner.tasks.push_back(task);

        let role = if inner.worker_active {
            CallerRole::Monitor
        } else {
            inner.worker_active = true;
            CallerRole::Worker
        };

        Enqueued {
            role,
            position,
            drain_epoch: self.drain.current_epoch(),
        }
    }

    /// Take the next task, or finish the worker lineage if none remain.
    ///
    /// Only the active worker calls this. On the empty case the claim
    /// release and the drain publication (carrying `final_update`, the
    /// terminal status of the last processed task) happen under the same
    /// lock as enqueue, so a caller observes either the pre-drain epoch
    /// with the worker active, or the post-drain epoch with the claim
    /// free — never a mix.
    pub fn dequeue_or_release(&self, final_update: &Option<StatusUpdate>) -> Option<Task> {
        let mut inner = self.lock();
        let task = inner.tasks.pop_front();
        inner.current_task = task.as_ref().map(|t| t.id);
        if task.is_none() {
            inner.worker_active = false;
            self.drain.publish_drain(final_update.clone());
        }
        task
    }

    /// Release the claim without a normal drain (the worker died
    /// mid-task). Remaining tasks stay queued for the next worker;
    /// monitors are woken with no final status.
    pub fn abort_worker(&self) {
        let mut inner = self.lock();
        inner.worker_active = false;
        inner.current_task = None;
        self.drain.publish_drain(None);
    }

    /// Subscribe for drain notifications.
    pub fn subscribe_drain(&self) -> watch::Receiver<DrainState> {
        self.drain.subscribe()
    }

    /// The task the worker is processing right now, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        self.lock().current_task
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Whether a worker currently holds the claim.
    pub fn worker_active(&self) -> bool {
        self.lock().worker_active
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::wait_for_drain;
    use genbridge_core::types::{SessionId, TaskPhase};

    fn task() -> Task {
        Task::new(SessionId::generate(), serde_json::json!({"1": {}}))
    }

    fn final_update(detail: &str) -> Option<StatusUpdate> {
        Some(StatusUpdate::new(TaskPhase::Succeeded, None, detail))
    }

    #[test]
    fn first_caller_becomes_worker() {
        let queue = TaskQueue::new();
        let first = queue.enqueue(task());
        assert_eq!(first.role, CallerRole::Worker);
        assert_eq!(first.position, 0);

        let second = queue.enqueue(task());
        assert_eq!(second.role, CallerRole::Monitor);
        assert_eq!(second.position, 1);
    }

    #[test]
    fn dequeue_is_fifo() {
        let queue = TaskQueue::new();
        let a = task();
        let b = task();
        queue.enqueue(a.clone());
        queue.enqueue(b.clone());

        assert_eq!(queue.dequeue_or_release(&None).unwrap().id, a.id);
        assert_eq!(queue.dequeue_or_release(&None).unwrap().id, b.id);
        assert!(queue.dequeue_or_release(&None).is_none());
    }

    #[test]
    fn empty_dequeue_releases_the_claim() {
        let queue = TaskQueue::new();
        queue.enqueue(task());
        assert!(queue.worker_active());

        queue.dequeue_or_release(&None);
        assert!(queue.worker_active()); // still draining
        assert!(queue.current_task().is_some());

        assert!(queue.dequeue_or_release(&None).is_none());
        assert!(!queue.worker_active());
        assert!(queue.current_task().is_none());

        // Next caller starts a fresh worker lineage.
        assert_eq!(queue.enqueue(task()).role, CallerRole::Worker);
    }

    #[test]
    fn task_pushed_during_drain_is_seen_by_worker() {
        let queue = TaskQueue::new();
        queue.enqueue(task());
        queue.dequeue_or_release(&None);

        // Arrives before the worker's final emptiness check.
        assert_eq!(queue.enqueue(task()).role, CallerRole::Monitor);
        assert!(queue.dequeue_or_release(&None).is_some());
    }

    #[tokio::test]
    async fn monitor_epoch_spans_only_its_own_lineage() {
        let queue = TaskQueue::new();

        // First lineage runs to completion and publishes its drain.
        queue.enqueue(task());
        queue.dequeue_or_release(&None);
        assert!(queue.dequeue_or_release(&final_update("first batch")).is_none());

        // Second lineage: a worker and a monitor attach.
        assert_eq!(queue.enqueue(task()).role, CallerRole::Worker);
        let monitor = queue.enqueue(task());
        assert_eq!(monitor.role, CallerRole::Monitor);

        // The monitor's captured epoch already includes the first drain,
        // so waiting on it cannot resolve against the stale final status.
        assert_eq!(monitor.drain_epoch, 1);
        let mut rx = queue.subscribe_drain();

        queue.dequeue_or_release(&None);
        queue.dequeue_or_release(&None);
        assert!(queue.dequeue_or_release(&final_update("second batch")).is_none());

        let state = wait_for_drain(&mut rx, monitor.drain_epoch).await.unwrap();
        assert_eq!(state.final_update.unwrap().detail, "second batch");
    }

    #[tokio::test]
    async fn abort_releases_the_claim_and_wakes_monitors() {
        let queue = TaskQueue::new();
        queue.enqueue(task());
        let monitor = queue.enqueue(task());
        let mut rx = queue.subscribe_drain();

        queue.dequeue_or_release(&None);
        queue.abort_worker();

        assert!(!queue.worker_active());
        assert!(queue.current_task().is_none());
        let state = wait_for_drain(&mut rx, monitor.drain_epoch).await.unwrap();
        assert!(state.final_update.is_none());

        // The aborted lineage's leftover task is still there for the next
        // worker.
        assert_eq!(queue.enqueue(task()).role, CallerRole::Worker);
        assert!(queue.dequeue_or_release(&None).is_some());
    }
}

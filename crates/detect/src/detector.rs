//! The completion-detection polling engine.
//!
//! One `detect` call per submitted job: it polls the strategy recorded on
//! the [`JobHandle`] at a fixed sub-second interval under a hard
//! wall-clock deadline, and always resolves to a terminal
//! [`CompletionResult`]. Transient poll failures are logged and retried;
//! an explicit engine-reported error fails the job immediately; the
//! deadline yields `TimedOut`, never an unbounded wait.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use genbridge_core::config::EngineConfig;
use genbridge_core::types::{CompletionResult, CompletionStrategy, JobHandle, JobOutputs};
use tokio::time::Instant;

use crate::history::{self, HistoryStatus};
use crate::outputs::OutputSnapshot;
use crate::probe::JobProbe;

/// Tunables for the detection loops.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Interval between polls. Sub-second keeps the `t + poll_interval`
    /// resolution bound tight.
    pub poll_interval: Duration,
    /// Pause between the queue-absence signal and the output lookup,
    /// letting files land on disk.
    pub settle_delay: Duration,
    /// The engine's output directory for history resolution and diffing.
    pub output_dir: PathBuf,
    /// Consecutive marker-poll failures tolerated before falling back to
    /// queue-absence detection.
    pub max_marker_failures: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            settle_delay: Duration::from_secs(1),
            output_dir: PathBuf::from("output"),
            max_marker_failures: 12,
        }
    }
}

impl DetectorConfig {
    /// Derive detector tunables from the engine config.
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            settle_delay: config.settle_delay,
            output_dir: config.output_dir.clone(),
            ..Default::default()
        }
    }
}

/// Infers job completion from whichever unreliable signal the job supports.
pub struct CompletionDetector {
    probe: Arc<dyn JobProbe>,
    config: DetectorConfig,
}

impl CompletionDetector {
    pub fn new(probe: Arc<dyn JobProbe>, config: DetectorConfig) -> Self {
        Self { probe, config }
    }

    /// Poll until the job resolves or `deadline` elapses.
    ///
    /// `baseline` is the output-directory snapshot taken before
    /// submission; it feeds the diff supplement and the output-diff
    /// strategy.
    pub async fn detect(
        &self,
        handle: &JobHandle,
        baseline: &OutputSnapshot,
        deadline: Duration,
    ) -> CompletionResult {
        let deadline_at = Instant::now() + deadline;

        tracing::debug!(
            job_id = %handle.job_id,
            strategy = ?handle.strategy,
            deadline_secs = deadline.as_secs(),
            "Starting completion detection",
        );

        // The strategy loops check the deadline between polls, but a
        // single probe call can stall on a wedged engine. The outer
        // timeout makes the deadline hold regardless of what a poll does.
        let strategy_run = async {
            match handle.strategy {
                CompletionStrategy::Marker => {
                    self.detect_by_marker(handle, baseline, deadline_at).await
                }
                CompletionStrategy::QueueAbsence => {
                    self.detect_by_queue_absence(handle, baseline, deadline_at).await
                }
                CompletionStrategy::OutputDiff => {
                    self.detect_by_output_diff(handle, baseline, deadline_at).await
                }
            }
        };
        let result = tokio::time::timeout_at(deadline_at, strategy_run)
            .await
            .unwrap_or(CompletionResult::TimedOut);

        match &result {
            CompletionResult::Success(outputs) => tracing::info!(
                job_id = %handle.job_id,
                images = outputs.images.len(),
                videos = outputs.videos.len(),
                "Job completed",
            ),
            CompletionResult::Failed(reason) => {
                tracing::warn!(job_id = %handle.job_id, reason = %reason, "Job failed")
            }
            CompletionResult::TimedOut => {
                tracing::warn!(job_id = %handle.job_id, "Completion detection timed out")
            }
        }

        result
    }

    /// Marker strategy: poll the history side-channel record.
    async fn detect_by_marker(
        &self,
        handle: &JobHandle,
        baseline: &OutputSnapshot,
        deadline_at: Instant,
    ) -> CompletionResult {
        let mut failure_streak = 0u32;

        while Instant::now() < deadline_at {
            match self.probe.history(handle.job_id.as_str()).await {
                Ok(payload) => {
                    failure_streak = 0;
                    if let Some(entry) = history::find_entry(&payload, handle.job_id.as_str()) {
                        match history::entry_status(entry) {
                            HistoryStatus::Failed(reason) => {
                                return CompletionResult::Failed(reason);
                            }
                            HistoryStatus::Completed => {
                                let mut outputs =
                                    history::extract_outputs(entry, &self.config.output_dir);
                                if outputs.is_empty() {
                                    outputs.merge(baseline.diff(&self.config.output_dir));
                                }
                                return CompletionResult::Success(outputs);
                            }
                            HistoryStatus::Pending => {}
                        }
                    }
                }
                Err(e) => {
                    failure_streak += 1;
                    tracing::warn!(
                        job_id = %handle.job_id,
                        error = %e,
                        failure_streak,
                        "History poll failed, retrying",
                    );
                    if failure_streak >= self.config.max_marker_failures {
                        tracing::warn!(
                            job_id = %handle.job_id,
                            "Marker record unavailable, falling back to queue-absence detection",
                        );
                        return self.detect_by_queue_absence(handle, baseline, deadline_at).await;
                    }
                }
            }

            self.sleep_one_interval(deadline_at).await;
        }

        CompletionResult::TimedOut
    }

    /// Queue-absence strategy: the job is done the moment it no longer
    /// appears in either the running or pending sublist.
    async fn detect_by_queue_absence(
        &self,
        handle: &JobHandle,
        baseline: &OutputSnapshot,
        deadline_at: Instant,
    ) -> CompletionResult {
        loop {
            if Instant::now() >= deadline_at {
                return CompletionResult::TimedOut;
            }

            match self.probe.queue().await {
                Ok(snapshot) => {
                    if !snapshot.contains(&handle.job_id) {
                        // Gone from both sublists. A job that finished
                        // between submission and the first poll lands here
                        // immediately.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %handle.job_id,
                        error = %e,
                        "Queue poll failed, retrying",
                    );
                }
            }

            self.sleep_one_interval(deadline_at).await;
        }

        tokio::time::sleep(self.config.settle_delay).await;
        self.resolve_finished_job(handle, baseline).await
    }

    /// Output-diff strategy: poll the directory diff until something new
    /// appears.
    async fn detect_by_output_diff(
        &self,
        handle: &JobHandle,
        baseline: &OutputSnapshot,
        deadline_at: Instant,
    ) -> CompletionResult {
        while Instant::now() < deadline_at {
            let outputs = baseline.diff(&self.config.output_dir);
            if !outputs.is_empty() {
                return CompletionResult::Success(outputs);
            }
            self.sleep_one_interval(deadline_at).await;
        }

        tracing::debug!(job_id = %handle.job_id, "No new output files before deadline");
        CompletionResult::TimedOut
    }

    /// A job has left the queue; work out how it ended and what it wrote.
    ///
    /// History is consulted once for an explicit error and for outputs,
    /// but its unavailability never blocks resolution: the directory diff
    /// supplies outputs when history has none.
    async fn resolve_finished_job(
        &self,
        handle: &JobHandle,
        baseline: &OutputSnapshot,
    ) -> CompletionResult {
        let mut outputs = JobOutputs::default();

        match self.probe.history(handle.job_id.as_str()).await {
            Ok(payload) => {
                if let Some(entry) = history::find_entry(&payload, handle.job_id.as_str()) {
                    if let HistoryStatus::Failed(reason) = history::entry_status(entry) {
                        return CompletionResult::Failed(reason);
                    }
                    outputs = history::extract_outputs(entry, &self.config.output_dir);
                }
            }
            Err(e) => {
                tracing::debug!(
                    job_id = %handle.job_id,
                    error = %e,
                    "History unavailable after queue drain, relying on output diff",
                );
            }
        }

        if outputs.is_empty() {
            outputs.merge(baseline.diff(&self.config.output_dir));
        }

        CompletionResult::Success(outputs)
    }

    /// Sleep one poll interval, but never past the deadline.
    async fn sleep_one_interval(&self, deadline_at: Instant) {
        let wake = (Instant::now() + self.config.poll_interval).min(deadline_at);
        tokio::time::sleep_until(wake).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use genbridge_core::types::{JobId, SessionId};
    use genbridge_engine::api::QueueSnapshot;
    use std::sync::atomic::{AtomicU32, Ordering};

    type HistoryFn = Box<dyn Fn(u32) -> Result<serde_json::Value, ProbeError> + Send + Sync>;
    type QueueFn = Box<dyn Fn(u32) -> Result<QueueSnapshot, ProbeError> + Send + Sync>;

    /// Probe whose responses depend on how many times each endpoint has
    /// been polled.
    struct ScriptedProbe {
        history_calls: AtomicU32,
        queue_calls: AtomicU32,
        history_fn: HistoryFn,
        queue_fn: QueueFn,
    }

    impl ScriptedProbe {
        fn new(history_fn: HistoryFn, queue_fn: QueueFn) -> Self {
            Self {
                history_calls: AtomicU32::new(0),
                queue_calls: AtomicU32::new(0),
                history_fn,
                queue_fn,
            }
        }
    }

    #[async_trait]
    impl JobProbe for ScriptedProbe {
        async fn history(&self, _id: &str) -> Result<serde_json::Value, ProbeError> {
            let call = self.history_calls.fetch_add(1, Ordering::SeqCst);
            (self.history_fn)(call)
        }

        async fn queue(&self) -> Result<QueueSnapshot, ProbeError> {
            let call = self.queue_calls.fetch_add(1, Ordering::SeqCst);
            (self.queue_fn)(call)
        }
    }

    fn handle(strategy: CompletionStrategy) -> JobHandle {
        JobHandle {
            job_id: JobId::new("job-1"),
            session_id: SessionId::generate(),
            submitted_at: chrono::Utc::now(),
            strategy,
        }
    }

    fn detector(probe: ScriptedProbe, config: DetectorConfig) -> CompletionDetector {
        CompletionDetector::new(Arc::new(probe), config)
    }

    fn empty_history() -> Result<serde_json::Value, ProbeError> {
        Ok(serde_json::json!({}))
    }

    fn completed_entry() -> Result<serde_json::Value, ProbeError> {
        Ok(serde_json::json!({"job-1": {"status": {"status": "completed"}, "outputs": {}}}))
    }

    fn queue_with_job() -> Result<QueueSnapshot, ProbeError> {
        Ok(QueueSnapshot {
            running: vec!["job-1".to_string()],
            pending: vec![],
        })
    }

    fn queue_without_job() -> Result<QueueSnapshot, ProbeError> {
        Ok(QueueSnapshot::default())
    }

    #[tokio::test(start_paused = true)]
    async fn marker_resolves_when_record_appears() {
        let probe = ScriptedProbe::new(
            Box::new(|call| if call < 3 { empty_history() } else { completed_entry() }),
            Box::new(|_| queue_without_job()),
        );
        let detector = detector(probe, DetectorConfig::default());

        let result = detector
            .detect(
                &handle(CompletionStrategy::Marker),
                &OutputSnapshot::default(),
                Duration::from_secs(60),
            )
            .await;

        assert_matches!(result, CompletionResult::Success(_));
    }

    #[tokio::test(start_paused = true)]
    async fn marker_explicit_error_fails_immediately() {
        let probe = ScriptedProbe::new(
            Box::new(|_| {
                Ok(serde_json::json!({
                    "job-1": {"status": {"status": "error", "message": "bad node"}}
                }))
            }),
            Box::new(|_| queue_without_job()),
        );
        let detector = detector(probe, DetectorConfig::default());

        let started = Instant::now();
        let result = detector
            .detect(
                &handle(CompletionStrategy::Marker),
                &OutputSnapshot::default(),
                Duration::from_secs(300),
            )
            .await;

        assert_matches!(result, CompletionResult::Failed(reason) => {
            assert!(reason.contains("bad node"));
        });
        // Resolved on the first poll, nowhere near the deadline.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn marker_failure_streak_falls_back_to_queue_absence() {
        let probe = ScriptedProbe::new(
            Box::new(|_| Err(ProbeError::Request("connection refused".to_string()))),
            Box::new(|_| queue_without_job()),
        );
        let config = DetectorConfig {
            max_marker_failures: 3,
            ..Default::default()
        };
        let detector = detector(probe, config);

        let result = detector
            .detect(
                &handle(CompletionStrategy::Marker),
                &OutputSnapshot::default(),
                Duration::from_secs(60),
            )
            .await;

        // The fallback path resolves through queue absence instead of
        // hanging on the dead marker channel.
        assert_matches!(result, CompletionResult::Success(_));
    }

    #[tokio::test(start_paused = true)]
    async fn queue_absence_resolves_after_job_leaves() {
        let probe = ScriptedProbe::new(
            Box::new(|_| Err(ProbeError::Request("history down".to_string()))),
            Box::new(|call| if call < 2 { queue_with_job() } else { queue_without_job() }),
        );
        let detector = detector(probe, DetectorConfig::default());

        // History being down must not block resolution.
        let result = detector
            .detect(
                &handle(CompletionStrategy::QueueAbsence),
                &OutputSnapshot::default(),
                Duration::from_secs(60),
            )
            .await;

        assert_matches!(result, CompletionResult::Success(outputs) => {
            assert!(outputs.is_empty());
        });
    }

    #[tokio::test(start_paused = true)]
    async fn job_absent_on_first_poll_is_success() {
        // A job that completed between submission and the first poll never
        // appears in any queue listing. That is success, not failure.
        let probe = ScriptedProbe::new(
            Box::new(|_| empty_history()),
            Box::new(|_| queue_without_job()),
        );
        let detector = detector(probe, DetectorConfig::default());

        let started = Instant::now();
        let result = detector
            .detect(
                &handle(CompletionStrategy::QueueAbsence),
                &OutputSnapshot::default(),
                Duration::from_secs(300),
            )
            .await;

        assert_matches!(result, CompletionResult::Success(_));
        // First poll plus the settle delay; far from the deadline.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn queue_never_clears_times_out_at_deadline() {
        let probe = ScriptedProbe::new(
            Box::new(|_| empty_history()),
            Box::new(|_| queue_with_job()),
        );
        let detector = detector(probe, DetectorConfig::default());

        let started = Instant::now();
        let result = detector
            .detect(
                &handle(CompletionStrategy::QueueAbsence),
                &OutputSnapshot::default(),
                Duration::from_secs(10),
            )
            .await;

        assert_matches!(result, CompletionResult::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(12));
    }

    /// Probe whose calls never return, like an engine that accepted the
    /// connection and then wedged.
    struct StalledProbe;

    #[async_trait]
    impl JobProbe for StalledProbe {
        async fn history(&self, _id: &str) -> Result<serde_json::Value, ProbeError> {
            std::future::pending().await
        }

        async fn queue(&self) -> Result<QueueSnapshot, ProbeError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_poll_cannot_outlive_the_deadline() {
        let detector = CompletionDetector::new(Arc::new(StalledProbe), DetectorConfig::default());

        for strategy in [CompletionStrategy::Marker, CompletionStrategy::QueueAbsence] {
            let started = Instant::now();
            let result = detector
                .detect(&handle(strategy), &OutputSnapshot::default(), Duration::from_secs(10))
                .await;

            assert_matches!(result, CompletionResult::TimedOut);
            let elapsed = started.elapsed();
            assert!(elapsed >= Duration::from_secs(10));
            assert!(elapsed < Duration::from_secs(11));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn queue_absence_reports_history_error_entry() {
        let probe = ScriptedProbe::new(
            Box::new(|_| {
                Ok(serde_json::json!({
                    "job-1": {"status": {"status": "failed", "error": "interrupted"}}
                }))
            }),
            Box::new(|_| queue_without_job()),
        );
        let detector = detector(probe, DetectorConfig::default());

        let result = detector
            .detect(
                &handle(CompletionStrategy::QueueAbsence),
                &OutputSnapshot::default(),
                Duration::from_secs(60),
            )
            .await;

        assert_matches!(result, CompletionResult::Failed(_));
    }

    #[tokio::test(start_paused = true)]
    async fn output_diff_finds_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = OutputSnapshot::capture(dir.path());
        std::fs::write(dir.path().join("fresh.png"), b"img").unwrap();

        let probe = ScriptedProbe::new(
            Box::new(|_| empty_history()),
            Box::new(|_| queue_without_job()),
        );
        let config = DetectorConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let detector = detector(probe, config);

        let result = detector
            .detect(
                &handle(CompletionStrategy::OutputDiff),
                &baseline,
                Duration::from_secs(30),
            )
            .await;

        assert_matches!(result, CompletionResult::Success(outputs) => {
            assert_eq!(outputs.images.len(), 1);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn output_diff_times_out_when_nothing_appears() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = OutputSnapshot::capture(dir.path());

        let probe = ScriptedProbe::new(
            Box::new(|_| empty_history()),
            Box::new(|_| queue_without_job()),
        );
        let config = DetectorConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let detector = detector(probe, config);

        let result = detector
            .detect(
                &handle(CompletionStrategy::OutputDiff),
                &baseline,
                Duration::from_secs(5),
            )
            .await;

        assert_matches!(result, CompletionResult::TimedOut);
    }
}

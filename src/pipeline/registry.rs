//! In-process job tracking: submission, bounded concurrency, status polling and cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::time::Instant;

use super::{CancelToken, Job, JobId, JobState, PipelineOrchestrator, PipelineResult};

/// Snapshot of a job as seen from outside the worker task
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub id: JobId,
    pub url: String,
    pub state: JobState,
    /// Set exactly once, when the job reaches a terminal state
    pub result: Option<PipelineResult>,
    pub finished_at: Option<Instant>,
}

impl JobStatus {
    pub fn new(job: &Job) -> Self {
        Self {
            id: job.id,
            url: job.url.clone(),
            state: job.state.clone(),
            result: None,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }
}

struct Entry {
    cancel: CancelToken,
    status: watch::Receiver<JobStatus>,
}

struct Inner {
    orchestrator: Arc<PipelineOrchestrator>,
    jobs: RwLock<HashMap<JobId, Entry>>,
    permits: Arc<Semaphore>,
    retention: Duration,
}

/// Runs submitted jobs on the tokio runtime, at most `max_concurrent` at a time
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new(orchestrator: PipelineOrchestrator, max_concurrent: usize, retention: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator: Arc::new(orchestrator),
                jobs: RwLock::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
                retention,
            }),
        }
    }

    /// Queue a conversion and return immediately
    pub async fn submit(&self, url: impl Into<String>, language_hint: Option<String>) -> JobId {
        self.purge().await;

        let mut job = Job::new(url, self.inner.orchestrator.target_language(), language_hint);
        let id = job.id;
        let cancel = CancelToken::new();
        let (sender, receiver) = watch::channel(JobStatus::new(&job));

        self.inner.jobs.write().await.insert(
            id,
            Entry {
                cancel: cancel.clone(),
                status: receiver,
            },
        );
        tracing::debug!("Queued job {} for {}", id, job.url);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            // A job cancelled while queued skips the permit; run() then fails it at the first stage boundary
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = inner.permits.clone().acquire_owned() => permit.ok(),
            };

            let result = inner.orchestrator.run(&mut job, &cancel, Some(&sender)).await;

            sender.send_modify(|status| {
                status.state = job.state.clone();
                status.result = Some(result);
                status.finished_at = Some(Instant::now());
            });
        });

        id
    }

    /// Current status, or `None` for unknown and purged jobs
    pub async fn poll_status(&self, id: JobId) -> Option<JobStatus> {
        self.purge().await;

        let jobs = self.inner.jobs.read().await;
        jobs.get(&id).map(|entry| entry.status.borrow().clone())
    }

    /// Request cancellation; false when the job is unknown or already finished
    pub async fn cancel(&self, id: JobId) -> bool {
        let jobs = self.inner.jobs.read().await;
        let Some(entry) = jobs.get(&id) else {
            return false;
        };

        if entry.status.borrow().is_finished() {
            return false;
        }

        tracing::info!("Cancelling job {}", id);
        entry.cancel.cancel();
        true
    }

    pub async fn cancel_all(&self) {
        let jobs = self.inner.jobs.read().await;
        for entry in jobs.values() {
            entry.cancel.cancel();
        }
    }

    /// Status updates for one job
    pub async fn subscribe(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        let jobs = self.inner.jobs.read().await;
        jobs.get(&id).map(|entry| entry.status.clone())
    }

    /// Wait for the job's terminal result
    pub async fn wait(&self, id: JobId) -> Option<PipelineResult> {
        let mut receiver = self.subscribe(id).await?;
        let status = receiver.wait_for(JobStatus::is_finished).await.ok()?;
        status.result.clone()
    }

    /// Drop finished jobs older than the retention window
    async fn purge(&self) {
        let retention = self.inner.retention;
        let mut jobs = self.inner.jobs.write().await;
        jobs.retain(|id, entry| {
            let expired = entry
                .status
                .borrow()
                .finished_at
                .is_some_and(|finished| finished.elapsed() >= retention);
            if expired {
                tracing::debug!("Purging job {}", id);
            }
            !expired
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::*;
    use super::*;
    use crate::pipeline::CANCELLED_EXIT_CODE;

    fn slow_orchestrator(dirs: &TestDirs) -> PipelineOrchestrator {
        orchestrator(
            dirs,
            Arc::new(FakeAcquirer::default()),
            Arc::new(ScriptedTranscriber::slow(chinese_transcript(), Duration::from_secs(30))),
            silent_translator(),
            markdown(),
        )
    }

    async fn wait_for_state(registry: &JobRegistry, id: JobId, state: JobState) {
        let mut receiver = registry.subscribe(id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(|status| status.state == state))
            .await
            .expect("job should reach state")
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_wait_and_poll() {
        let dirs = TestDirs::new();
        let registry = JobRegistry::new(
            orchestrator(
                &dirs,
                Arc::new(FakeAcquirer::titled("Rust")),
                Arc::new(ScriptedTranscriber::ok(chinese_transcript())),
                silent_translator(),
                markdown(),
            ),
            2,
            Duration::from_secs(60),
        );

        let id = registry.submit("https://youtu.be/x", None).await;
        let result = registry.wait(id).await.unwrap();
        assert!(result.is_success(), "{:?}", result);

        let status = registry.poll_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.result, Some(result));
        assert!(!registry.cancel(id).await);
        assert_eq!(dirs.outputs().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_jobs_are_purged_after_retention() {
        let dirs = TestDirs::new();
        let registry = JobRegistry::new(
            orchestrator(
                &dirs,
                Arc::new(FakeAcquirer::default()),
                Arc::new(ScriptedTranscriber::ok(chinese_transcript())),
                silent_translator(),
                markdown(),
            ),
            1,
            Duration::ZERO,
        );

        let id = registry.submit("https://youtu.be/x", None).await;
        assert!(registry.wait(id).await.is_some());
        assert!(registry.poll_status(id).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let dirs = TestDirs::new();
        let registry = JobRegistry::new(slow_orchestrator(&dirs), 1, Duration::from_secs(60));

        let id = registry.submit("https://youtu.be/x", None).await;
        wait_for_state(&registry, id, JobState::Transcribing).await;

        assert!(registry.cancel(id).await);
        let result = tokio::time::timeout(Duration::from_secs(5), registry.wait(id))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.exit_code(), CANCELLED_EXIT_CODE);
        let status = registry.poll_status(id).await.unwrap();
        assert!(matches!(status.state, JobState::Failed { .. }));
        assert_eq!(dirs.leftover_workdirs(), 0);
    }

    #[tokio::test]
    async fn test_queued_jobs_wait_for_a_permit() {
        let dirs = TestDirs::new();
        let registry = JobRegistry::new(slow_orchestrator(&dirs), 1, Duration::from_secs(60));

        let first = registry.submit("https://youtu.be/a", None).await;
        let second = registry.submit("https://youtu.be/b", None).await;
        wait_for_state(&registry, first, JobState::Transcribing).await;

        assert_eq!(registry.poll_status(second).await.unwrap().state, JobState::Created);

        registry.cancel_all().await;
        for id in [first, second] {
            let result = tokio::time::timeout(Duration::from_secs(5), registry.wait(id))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(result.exit_code(), CANCELLED_EXIT_CODE);
        }
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let dirs = TestDirs::new();
        let registry = JobRegistry::new(slow_orchestrator(&dirs), 1, Duration::from_secs(60));
        let id = JobId::new();

        assert!(!registry.cancel(id).await);
        assert!(registry.poll_status(id).await.is_none());
        assert!(registry.wait(id).await.is_none());
    }
}

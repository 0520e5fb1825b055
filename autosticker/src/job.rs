//! Polling for asynchronous remote jobs.
//!
//! Some services answer a submission with a job handle instead of a result;
//! the job must then be re-fetched until it reaches a terminal state.
//! [`JobPoller`] drives that loop for any service implementing
//! [`JobService`], sleeping between polls so sibling jobs on the same task
//! pool make progress concurrently.

use crate::providers::ServiceError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default wall-clock deadline for a job to reach a terminal state.
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(600);

/// Status of a remote job as last reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Submitted but not yet finished; covers queued and running states.
    Pending,
    /// Finished with output available.
    Succeeded,
    /// Finished with a remote error.
    Failed,
    /// Stopped remotely before completion.
    Canceled,
}

impl JobStatus {
    /// Whether the job will make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One in-flight or completed remote job.
///
/// Snapshots are produced by [`JobService::submit`] and refreshed by
/// [`JobService::fetch`]; nothing is persisted once the terminal state has
/// been consumed.
#[derive(Debug, Clone)]
pub struct Job<T> {
    /// Service-assigned job identifier.
    pub id: String,
    /// Status at the time this snapshot was fetched.
    pub status: JobStatus,
    /// Output artifact references, present once the job succeeded.
    pub output: Option<T>,
    /// Remote error detail, present once the job failed.
    pub error: Option<String>,
}

/// Errors from driving a job to completion.
#[derive(Debug, Error)]
pub enum JobError {
    /// Submission or a status fetch failed at the transport level.
    #[error("ServiceError: {0}")]
    Service(#[from] ServiceError),

    /// The job reached the failed state, with the remote detail.
    #[error("JobFailed: {0}")]
    Failed(String),

    /// The job was canceled on the remote side.
    #[error("JobCanceled")]
    Canceled,

    /// The job reported success without an output payload.
    #[error("MissingOutput: job {0} succeeded without output")]
    MissingOutput(String),

    /// The poll deadline elapsed before the job finished.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

/// The poll deadline elapsed while the job was still pending.
///
/// Kept distinct from the other [`JobError`] variants so callers can treat a
/// slow-but-possibly-fine job differently from one the service rejected.
#[derive(Debug, Error)]
#[error("TimeoutError: job {id} still pending after {waited:?}")]
pub struct TimeoutError {
    /// Identifier of the job that never finished.
    pub id: String,
    /// How long the poller waited before giving up.
    pub waited: Duration,
}

/// A remote service with asynchronous, poll-based job semantics.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Description of the work submitted to the service.
    type Spec: Send + Sync;
    /// Artifact references carried by a succeeded job.
    type Output: Send;

    /// Submit a job spec, returning the initial job snapshot.
    async fn submit(&self, spec: &Self::Spec) -> Result<Job<Self::Output>, JobError>;

    /// Fetch a fresh snapshot of a previously submitted job.
    async fn fetch(&self, id: &str) -> Result<Job<Self::Output>, JobError>;
}

/// Drives a [`JobService`] job from submission to a terminal state.
#[derive(Debug, Clone, Copy)]
pub struct JobPoller {
    interval: Duration,
    deadline: Option<Duration>,
}

impl Default for JobPoller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: Some(DEFAULT_POLL_DEADLINE),
        }
    }
}

impl JobPoller {
    /// Create a poller with the default interval and deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay between status polls.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the wall-clock deadline for the job to finish.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Remove the deadline, polling until the job reaches a terminal state.
    #[must_use]
    pub const fn without_deadline(mut self) -> Self {
        self.deadline = None;
        self
    }

    /// Submit `spec` and poll until the job finishes.
    ///
    /// The sleep between polls is an async suspension, so concurrent jobs
    /// sharing a runtime poll in parallel rather than serially. Dropping the
    /// returned future stops polling; the remote job itself is not canceled.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Failed`] or [`JobError::Canceled`] when the job
    /// terminates unsuccessfully, [`JobError::Timeout`] when the deadline
    /// elapses first, and [`JobError::Service`] on transport failures.
    pub async fn run<S: JobService>(
        &self,
        service: &S,
        spec: &S::Spec,
    ) -> Result<S::Output, JobError> {
        let started = tokio::time::Instant::now();
        let mut job = service.submit(spec).await?;
        debug!(id = %job.id, "Submitted job");

        loop {
            match job.status {
                JobStatus::Succeeded => {
                    debug!(id = %job.id, "Job succeeded");
                    return job.output.ok_or(JobError::MissingOutput(job.id));
                }
                JobStatus::Failed => {
                    let detail = job
                        .error
                        .unwrap_or_else(|| "unspecified remote error".to_string());
                    return Err(JobError::Failed(detail));
                }
                JobStatus::Canceled => return Err(JobError::Canceled),
                JobStatus::Pending => {
                    let waited = started.elapsed();
                    if let Some(deadline) = self.deadline
                        && waited >= deadline
                    {
                        return Err(TimeoutError { id: job.id, waited }.into());
                    }
                    tokio::time::sleep(self.interval).await;
                    job = service.fetch(&job.id).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a scripted sequence of job snapshots and counts fetches.
    struct ScriptedService {
        first: Mutex<Option<Job<Vec<String>>>>,
        fetches: Mutex<VecDeque<Job<Vec<String>>>>,
        fetch_count: AtomicUsize,
    }

    impl ScriptedService {
        fn new(first: Job<Vec<String>>, fetches: Vec<Job<Vec<String>>>) -> Self {
            Self {
                first: Mutex::new(Some(first)),
                fetches: Mutex::new(fetches.into()),
                fetch_count: AtomicUsize::new(0),
            }
        }

        fn polls(&self) -> usize {
            self.fetch_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobService for ScriptedService {
        type Spec = ();
        type Output = Vec<String>;

        async fn submit(&self, _spec: &()) -> Result<Job<Vec<String>>, JobError> {
            Ok(self
                .first
                .lock()
                .expect("lock")
                .take()
                .expect("submit called twice"))
        }

        async fn fetch(&self, _id: &str) -> Result<Job<Vec<String>>, JobError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .fetches
                .lock()
                .expect("lock")
                .pop_front()
                .expect("fetched past end of script"))
        }
    }

    fn snapshot(status: JobStatus) -> Job<Vec<String>> {
        Job {
            id: "job-1".to_string(),
            status,
            output: None,
            error: None,
        }
    }

    fn succeeded(urls: &[&str]) -> Job<Vec<String>> {
        Job {
            id: "job-1".to_string(),
            status: JobStatus::Succeeded,
            output: Some(urls.iter().map(ToString::to_string).collect()),
            error: None,
        }
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_pending_succeeded_polls_twice() {
        let service = ScriptedService::new(
            snapshot(JobStatus::Pending),
            vec![snapshot(JobStatus::Pending), succeeded(&["https://out/1.png"])],
        );

        let output = JobPoller::new()
            .run(&service, &())
            .await
            .expect("job should succeed");

        assert_eq!(output, vec!["https://out/1.png".to_string()]);
        assert_eq!(service.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_failed_polls_once() {
        let mut failed = snapshot(JobStatus::Failed);
        failed.error = Some("NSFW content detected".to_string());
        let service = ScriptedService::new(snapshot(JobStatus::Pending), vec![failed]);

        let result = JobPoller::new().run(&service, &()).await;

        match result {
            Err(JobError::Failed(detail)) => assert_eq!(detail, "NSFW content detected"),
            other => panic!("expected JobError::Failed, got {other:?}"),
        }
        assert_eq!(service.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceled_job_is_an_error() {
        let service = ScriptedService::new(
            snapshot(JobStatus::Pending),
            vec![snapshot(JobStatus::Canceled)],
        );

        let result = JobPoller::new().run(&service, &()).await;
        assert!(matches!(result, Err(JobError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses_as_timeout() {
        let service = ScriptedService::new(
            snapshot(JobStatus::Pending),
            vec![snapshot(JobStatus::Pending), snapshot(JobStatus::Pending)],
        );

        let result = JobPoller::new()
            .with_interval(Duration::from_millis(500))
            .with_deadline(Duration::from_secs(1))
            .run(&service, &())
            .await;

        match result {
            Err(JobError::Timeout(timeout)) => {
                assert_eq!(timeout.id, "job-1");
                assert!(timeout.waited >= Duration::from_secs(1));
            }
            other => panic!("expected JobError::Timeout, got {other:?}"),
        }
        assert_eq!(service.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_skips_polling() {
        let service = ScriptedService::new(succeeded(&["https://out/1.png"]), vec![]);

        let output = JobPoller::new()
            .run(&service, &())
            .await
            .expect("job should succeed");

        assert_eq!(output.len(), 1);
        assert_eq!(service.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_without_output_is_an_error() {
        let service = ScriptedService::new(snapshot(JobStatus::Succeeded), vec![]);

        let result = JobPoller::new().run(&service, &()).await;
        assert!(matches!(result, Err(JobError::MissingOutput(_))));
    }
}

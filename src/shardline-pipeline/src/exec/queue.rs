//! Job queue for fanned-out external work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use common_error::{ShardlineError, ShardlineResult};

use super::{CommandExecutor, CommandSpec};

/// Identifier handed out by [`JobQueue::submit`].
pub type JobId = u64;

/// State of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued or running.
    Pending,
    /// Finished; carries the captured stdout.
    Succeeded(String),
    /// Finished unsuccessfully; carries the failure message.
    Failed(String),
}

impl JobStatus {
    /// Whether the job has finished, either way.
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Asynchronous job submission with polling.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue `command`; returns immediately.
    async fn submit(&self, command: CommandSpec) -> ShardlineResult<JobId>;

    /// Status of `job`, waiting up to `wait` for it to finish.
    ///
    /// A finished status is reported once; the job is forgotten afterwards.
    async fn poll(&self, job: JobId, wait: Duration) -> ShardlineResult<JobStatus>;

    /// Stop `job` if it is still queued or running and forget it.
    ///
    /// Returns `false` when the job is unknown or was already collected.
    async fn cancel(&self, job: JobId) -> ShardlineResult<bool>;
}

struct JobEntry {
    status: watch::Receiver<JobStatus>,
    abort: AbortHandle,
}

/// Job queue running commands as local tasks, at most `max_concurrent`
/// at a time.
pub struct LocalJobQueue {
    executor: Arc<dyn CommandExecutor>,
    permits: Arc<Semaphore>,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    next_id: AtomicU64,
}

impl LocalJobQueue {
    pub fn new(executor: Arc<dyn CommandExecutor>, max_concurrent: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of submitted jobs not yet collected or cancelled.
    pub fn tracked_jobs(&self) -> usize {
        self.table().map(|jobs| jobs.len()).unwrap_or(0)
    }

    fn table(&self) -> ShardlineResult<MutexGuard<'_, HashMap<JobId, JobEntry>>> {
        self.jobs
            .lock()
            .map_err(|_| ShardlineError::internal("job table poisoned"))
    }

    fn receiver(&self, job: JobId) -> ShardlineResult<watch::Receiver<JobStatus>> {
        self.table()?
            .get(&job)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| ShardlineError::invalid_parameter(format!("unknown job {job}")))
    }

    fn collect(&self, job: JobId, status: JobStatus) -> ShardlineResult<JobStatus> {
        if status.is_finished() {
            self.table()?.remove(&job);
        }
        Ok(status)
    }
}

impl std::fmt::Debug for LocalJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalJobQueue")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn submit(&self, command: CommandSpec) -> ShardlineResult<JobId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(JobStatus::Pending);

        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        // Aborting the task drops the permit and, through the executor's
        // kill-on-drop child, the external process.
        let handle = tokio::spawn(async move {
            let status = match permits.acquire_owned().await {
                Ok(_permit) => match executor.execute(&command, None).await {
                    Ok(output) => JobStatus::Succeeded(output.stdout),
                    Err(e) => JobStatus::Failed(e.to_string()),
                },
                Err(_) => JobStatus::Failed("job queue closed".to_string()),
            };
            match &status {
                JobStatus::Failed(message) => log::debug!("job {id} failed: {message}"),
                _ => log::debug!("job {id} succeeded"),
            }
            let _ = tx.send(status);
        });

        self.table()?.insert(
            id,
            JobEntry {
                status: rx,
                abort: handle.abort_handle(),
            },
        );
        log::debug!("job {id} submitted");
        Ok(id)
    }

    async fn poll(&self, job: JobId, wait: Duration) -> ShardlineResult<JobStatus> {
        let mut rx = self.receiver(job)?;
        let current = rx.borrow().clone();
        if current.is_finished() {
            return self.collect(job, current);
        }
        let status = match tokio::time::timeout(wait, rx.changed()).await {
            Ok(Ok(())) => rx.borrow().clone(),
            Ok(Err(_)) => JobStatus::Failed(format!("job {job} was abandoned")),
            Err(_) => JobStatus::Pending,
        };
        self.collect(job, status)
    }

    async fn cancel(&self, job: JobId) -> ShardlineResult<bool> {
        let Some(entry) = self.table()?.remove(&job) else {
            return Ok(false);
        };
        entry.abort.abort();
        log::debug!("job {job} cancelled");
        Ok(true)
    }
}

/// Poll `job` every `poll_interval` until it finishes or `timeout` elapses.
///
/// Returns the job's stdout on success. A failed job is a `JobFailed`
/// error; running out of time cancels the job and is a `Timeout` error.
pub async fn wait_for_job(
    queue: &dyn JobQueue,
    job: JobId,
    poll_interval: Duration,
    timeout: Duration,
) -> ShardlineResult<String> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            queue.cancel(job).await?;
            return Err(ShardlineError::timeout(format!(
                "job {job} did not finish within {}s",
                timeout.as_secs_f64()
            )));
        }
        match queue.poll(job, poll_interval.min(remaining)).await? {
            JobStatus::Pending => continue,
            JobStatus::Succeeded(stdout) => return Ok(stdout),
            JobStatus::Failed(message) => {
                return Err(ShardlineError::job_failed(format!("job {job}: {message}")))
            }
        }
    }
}

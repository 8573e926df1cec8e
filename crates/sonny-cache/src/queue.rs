use async_trait::async_trait;
use sonny_core::job::{JobEnvelope, JobOutcome, JobRequest, JobStatus};
use sonny_core::Result;

/// FIFO job queue + status table (spec §4.7, ambient — makes "enqueue" and
/// "wait_for_job" real processes instead of an in-memory stub). Kept as a
/// separate trait from [`crate::InventoryCache`] even though one Redis
/// connection backs both in the concrete implementation.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a job onto the queue and record it as `queued`.
    async fn enqueue(&self, request: JobRequest) -> Result<String>;

    /// Current status of a job, or `None` if it has no record (already
    /// purged, or never existed).
    async fn status(&self, job_id: &str) -> Result<Option<JobStatus>>;

    /// The terminal outcome of a job, if it has reached one.
    async fn outcome(&self, job_id: &str) -> Result<Option<JobOutcome>>;

    /// Pop the next envelope for a worker to execute, blocking up to
    /// `timeout_secs`. Marks the job `running` before returning it.
    async fn dequeue(&self, timeout_secs: u64) -> Result<Option<JobEnvelope>>;

    /// Record a job's terminal outcome.
    async fn finish(&self, job_id: &str, outcome: JobOutcome) -> Result<()>;

    /// Purge every queued and in-flight job record. Called once at
    /// Supervisor startup (spec §6).
    async fn purge_all(&self) -> Result<()>;
}

/// Poll a job's status at a fixed cadence until it reaches a terminal
/// state or `timeout_secs` elapses (spec §4.4/§5's polling suspension
/// point). Returns `false` on timeout; the job is left to finish in the
/// background, its eventual result ignored, per spec §5.
pub async fn wait_for_job(
    queue: &dyn JobQueue,
    job_id: &str,
    timeout_secs: u64,
    poll_interval: std::time::Duration,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(timeout_secs);
    loop {
        if let Some(status) = queue.status(job_id).await? {
            if status.is_terminal() {
                return Ok(true);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll_interval.min(deadline - tokio::time::Instant::now())).await;
    }
}

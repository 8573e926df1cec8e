use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use sonny_core::job::{JobEnvelope, JobOutcome, JobRequest, JobStatus};
use sonny_core::Result;

use crate::queue::JobQueue;

/// In-memory job queue for the supervisor's own test suite. Jobs are
/// never actually dequeued by a worker in tests — scenario tests call
/// [`FakeJobQueue::complete`] directly to drive a job to its terminal
/// state, mirroring what a real worker would do out-of-process.
#[derive(Default)]
pub struct FakeJobQueue {
    queue: Mutex<VecDeque<JobEnvelope>>,
    statuses: Mutex<HashMap<String, JobStatus>>,
    outcomes: Mutex<HashMap<String, JobOutcome>>,
}

impl FakeJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive a job directly to a terminal state, as if a worker had
    /// executed it.
    pub fn complete(&self, job_id: &str, outcome: JobOutcome) {
        let status = match &outcome {
            JobOutcome::Error { .. } => JobStatus::Failed,
            _ => JobStatus::Finished,
        };
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), status);
        self.outcomes
            .lock()
            .unwrap()
            .insert(job_id.to_string(), outcome);
    }

    pub fn enqueued_requests(&self) -> Vec<JobRequest> {
        self.queue
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.request.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for FakeJobQueue {
    async fn enqueue(&self, request: JobRequest) -> Result<String> {
        let envelope = JobEnvelope::new(request);
        let id = envelope.id.clone();
        self.statuses
            .lock()
            .unwrap()
            .insert(id.clone(), JobStatus::Queued);
        self.queue.lock().unwrap().push_back(envelope);
        Ok(id)
    }

    async fn status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        Ok(self.statuses.lock().unwrap().get(job_id).copied())
    }

    async fn outcome(&self, job_id: &str) -> Result<Option<JobOutcome>> {
        Ok(self.outcomes.lock().unwrap().get(job_id).cloned())
    }

    async fn dequeue(&self, _timeout_secs: u64) -> Result<Option<JobEnvelope>> {
        let envelope = self.queue.lock().unwrap().pop_front();
        if let Some(e) = &envelope {
            self.statuses
                .lock()
                .unwrap()
                .insert(e.id.clone(), JobStatus::Running);
        }
        Ok(envelope)
    }

    async fn finish(&self, job_id: &str, outcome: JobOutcome) -> Result<()> {
        self.complete(job_id, outcome);
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        self.queue.lock().unwrap().clear();
        self.statuses.lock().unwrap().clear();
        self.outcomes.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_complete_is_observable() {
        let queue = FakeJobQueue::new();
        let id = queue
            .enqueue(JobRequest::Refresh {
                include_tenants: false,
            })
            .await
            .unwrap();
        assert_eq!(queue.status(&id).await.unwrap(), Some(JobStatus::Queued));
        queue.complete(&id, JobOutcome::Refreshed);
        assert_eq!(queue.status(&id).await.unwrap(), Some(JobStatus::Finished));
    }

    #[tokio::test]
    async fn purge_clears_everything() {
        let queue = FakeJobQueue::new();
        let id = queue
            .enqueue(JobRequest::Refresh {
                include_tenants: false,
            })
            .await
            .unwrap();
        queue.purge_all().await.unwrap();
        assert_eq!(queue.status(&id).await.unwrap(), None);
    }
}

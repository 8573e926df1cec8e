use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Explicit context captured at enqueue time and carried with a job,
/// replacing the upstream pattern of stashing an extra attribute (`job.hv
/// = h`) on the job handle after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub host: Option<String>,
    pub addresses: Vec<String>,
    pub ports: Vec<u16>,
}

impl JobContext {
    pub fn none() -> Self {
        Self {
            host: None,
            addresses: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub fn probe(host: impl Into<String>, addresses: Vec<String>, ports: Vec<u16>) -> Self {
        Self {
            host: Some(host.into()),
            addresses,
            ports,
        }
    }
}

/// The unit of work the Supervisor enqueues and a worker (`ns4`) executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobRequest {
    Refresh {
        include_tenants: bool,
    },
    Probe {
        context: JobContext,
    },
    Resurrect {
        dead_host: String,
        spare_host: String,
        refresh_first: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// The outcome of a job, recorded in the status hash alongside its
/// terminal [`JobStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobOutcome {
    Refreshed,
    Unreachable { addresses: Vec<String> },
    Resurrected,
    Error { message: String },
}

/// An envelope queued onto the job queue: the request plus the id used to
/// look up its status and result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: String,
    pub request: JobRequest,
}

impl JobEnvelope {
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request,
        }
    }
}

//! Background job orchestration
//!
//! Long running protocol work (anchoring, broadcasting) runs as a [`Work`]
//! list of named steps on a pool of tokio workers fed by a bounded flume
//! queue. Callers get a [`JobHandle`] back straight away and can either
//! await completion or poll the persisted [`Job`] record.
//!
//! Steps fail with a [`TaskError`]: transient failures are retried with the
//! exponential backoff of a [`RetryPolicy`], fatal ones fail the job.

mod job;
mod orchestrator;
mod task;

pub use job::{Job, JobId, JobLog, JobStatus, TaskRecord, TaskStatus};
pub use orchestrator::{JobHandle, JobOrchestrator, OrchestratorConfig};
pub use task::{JobContext, RetryPolicy, Task, TaskError, TaskFuture, Work};

pub(crate) use task::millis;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job queue is full")]
    QueueFull,
    #[error("job orchestrator is shut down")]
    Shutdown,
    #[error("job store error: {0}")]
    Store(#[from] StoreError),
}

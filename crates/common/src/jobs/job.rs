use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::document::Did;

/// Identifier of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// Progress of a single named step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub status: TaskStatus,
    pub attempts: u32,
}

/// Entry in a job's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLog {
    pub action: String,
    pub message: String,
    pub created_at: OffsetDateTime,
}

/// Persisted record of a job and everything it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: Did,
    pub dedupe_key: String,
    pub description: String,
    pub status: JobStatus,
    pub tasks: Vec<TaskRecord>,
    pub logs: Vec<JobLog>,
    pub last_error: Option<String>,
    /// Values published by steps, e.g. the anchored root or a transaction ref
    pub values: BTreeMap<String, Vec<u8>>,
    pub created_at: OffsetDateTime,
    pub finished_at: Option<OffsetDateTime>,
}

impl Job {
    pub fn new(
        owner: Did,
        dedupe_key: impl Into<String>,
        description: impl Into<String>,
        task_names: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            owner,
            dedupe_key: dedupe_key.into(),
            description: description.into(),
            status: JobStatus::Pending,
            tasks: task_names
                .into_iter()
                .map(|name| TaskRecord {
                    name,
                    status: TaskStatus::Pending,
                    attempts: 0,
                })
                .collect(),
            logs: Vec::new(),
            last_error: None,
            values: BTreeMap::new(),
            created_at: OffsetDateTime::now_utc(),
            finished_at: None,
        }
    }

    pub fn log(&mut self, action: impl Into<String>, message: impl Into<String>) {
        self.logs.push(JobLog {
            action: action.into(),
            message: message.into(),
            created_at: OffsetDateTime::now_utc(),
        });
    }

    pub fn last_message(&self) -> Option<&str> {
        self.logs.last().map(|log| log.message.as_str())
    }

    pub fn task(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|task| task.name == name)
    }

    pub(crate) fn task_mut(&mut self, index: usize) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(index)
    }

    pub(crate) fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(OffsetDateTime::now_utc());
    }
}

use async_trait::async_trait;

use super::StoreError;
use crate::jobs::{Job, JobId};

/// Job records, written by the orchestrator after every state change
#[async_trait]
pub trait JobRepository: Send + Sync + std::fmt::Debug + 'static {
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] for unknown ids
    async fn get(&self, id: &JobId) -> Result<Job, StoreError>;
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{document_key, DocumentRepository, JobRepository, StoreError};
use crate::document::{Did, Document, DocumentStatus, VersionId};
use crate::jobs::{Job, JobId};

fn lock_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(format!("failed to acquire lock: {}", e))
}

/// In-memory document repository holding serialized versions
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentRepository {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode(document: &Document) -> Result<Vec<u8>, StoreError> {
    document
        .to_bytes()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Document, StoreError> {
    Document::from_bytes(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn create(&self, account: &Did, document: &Document) -> Result<(), StoreError> {
        let key = document_key(document.schema(), account, &document.current_version());
        let blob = encode(document)?;
        let mut inner = self.inner.write().map_err(lock_error)?;
        if inner.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        inner.insert(key, blob);
        Ok(())
    }

    async fn update(&self, account: &Did, document: &Document) -> Result<(), StoreError> {
        let key = document_key(document.schema(), account, &document.current_version());
        let blob = encode(document)?;
        let mut inner = self.inner.write().map_err(lock_error)?;
        let stored = inner
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if decode(stored)?.status() == DocumentStatus::Committed {
            return Err(StoreError::Immutable(key));
        }
        inner.insert(key, blob);
        Ok(())
    }

    async fn get(
        &self,
        account: &Did,
        schema: &str,
        version: &VersionId,
    ) -> Result<Document, StoreError> {
        let key = document_key(schema, account, version);
        let inner = self.inner.read().map_err(lock_error)?;
        let stored = inner.get(&key).ok_or(StoreError::NotFound(key.clone()))?;
        decode(stored)
    }

    async fn exists(
        &self,
        account: &Did,
        schema: &str,
        version: &VersionId,
    ) -> Result<bool, StoreError> {
        let key = document_key(schema, account, version);
        let inner = self.inner.read().map_err(lock_error)?;
        Ok(inner.contains_key(&key))
    }
}

/// In-memory job repository
#[derive(Debug, Clone, Default)]
pub struct MemoryJobRepository {
    inner: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        let inner = self.inner.read().map_err(lock_error)?;
        inner
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))
    }
}

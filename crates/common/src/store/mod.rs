//! Persistence seams for document versions and job records
//!
//! Both repositories are async traits so a node can back them with whatever
//! storage it runs on. The in-memory implementations in [`memory`] are used
//! by the tests and by single process deployments.

mod documents;
mod jobs;
pub mod memory;

pub use documents::{document_key, DocumentRepository};
pub use jobs::JobRepository;
pub use memory::{MemoryDocumentRepository, MemoryJobRepository};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Committed versions are never overwritten
    #[error("stored version is committed: {0}")]
    Immutable(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("store error: {0}")]
    Internal(String),
}

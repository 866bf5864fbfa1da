use async_trait::async_trait;

use super::StoreError;
use crate::document::{Did, Document, VersionId};

/// Storage key of a document version: `<schema>:<account>:<version>`
pub fn document_key(schema: &str, account: &Did, version: &VersionId) -> String {
    format!("{}:{}:{}", schema, account.to_hex(), version.to_hex())
}

/// Versions of documents, scoped per account
#[async_trait]
pub trait DocumentRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Store a new version
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the version is already
    /// stored for this account.
    async fn create(&self, account: &Did, document: &Document) -> Result<(), StoreError>;

    /// Overwrite a stored version
    ///
    /// Fails with [`StoreError::NotFound`] if nothing is stored yet and with
    /// [`StoreError::Immutable`] if the stored version is already committed.
    async fn update(&self, account: &Did, document: &Document) -> Result<(), StoreError>;

    async fn get(
        &self,
        account: &Did,
        schema: &str,
        version: &VersionId,
    ) -> Result<Document, StoreError>;

    async fn exists(
        &self,
        account: &Did,
        schema: &str,
        version: &VersionId,
    ) -> Result<bool, StoreError>;

    /// Create or update depending on whether the version is stored
    async fn upsert(&self, account: &Did, document: &Document) -> Result<(), StoreError> {
        if self
            .exists(account, document.schema(), &document.current_version())
            .await?
        {
            self.update(account, document).await
        } else {
            self.create(account, document).await
        }
    }

    /// Follow the version chain from `identifier` to the newest stored version
    async fn get_latest(
        &self,
        account: &Did,
        schema: &str,
        identifier: &VersionId,
    ) -> Result<Document, StoreError> {
        let mut current = self.get(account, schema, identifier).await?;
        while let Some(next) = current.next_version() {
            if !self.exists(account, schema, &next).await? {
                break;
            }
            current = self.get(account, schema, &next).await?;
        }
        Ok(current)
    }
}

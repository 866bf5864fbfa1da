use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::anchor::{
    AnchorConfig, AnchorProcessor, AnchorService, SignatureRequestHandler,
};
use crate::crypto::SecretKey;
use crate::document::{Did, Document, VersionId};
use crate::jobs::{JobHandle, JobOrchestrator, OrchestratorConfig};
use crate::store::{DocumentRepository, MemoryDocumentRepository, MemoryJobRepository};

use super::{MemoryIdentityService, MemoryLedger, MemoryTransport};

/// A collaborator node with its own store, job workers and handler
pub struct TestPeer {
    /// The name of this peer (for debugging)
    pub name: String,
    secret: SecretKey,
    did: Did,
    documents: MemoryDocumentRepository,
    handler: SignatureRequestHandler,
    service: AnchorService,
}

impl TestPeer {
    /// Create a peer, register its signing key and route its handler.
    /// Must be called from within a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        secret: Option<SecretKey>,
        anchor: AnchorConfig,
        jobs: OrchestratorConfig,
        ledger: &MemoryLedger,
        identities: &MemoryIdentityService,
        transport: &MemoryTransport,
    ) -> Self {
        let name = name.into();
        let secret = secret.unwrap_or_else(SecretKey::generate);
        let did = Did::from(secret.public());
        identities.register_signing_key(did, secret.public());

        let documents = MemoryDocumentRepository::new();
        let handler = SignatureRequestHandler::new(
            did,
            secret.clone(),
            Arc::new(identities.clone()),
            Arc::new(ledger.clone()),
            Arc::new(documents.clone()),
        );
        transport.register(handler.clone());

        let processor = AnchorProcessor::new(
            did,
            secret.clone(),
            anchor,
            Arc::new(ledger.clone()),
            Arc::new(identities.clone()),
            Arc::new(transport.clone()),
        );
        let orchestrator = JobOrchestrator::start(jobs, Arc::new(MemoryJobRepository::new()));
        let service = AnchorService::new(processor, orchestrator, Arc::new(documents.clone()));

        tracing::info!("[{}] test peer {}", name, did);
        Self {
            name,
            secret,
            did,
            documents,
            handler,
            service,
        }
    }

    pub fn did(&self) -> Did {
        self.did
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn documents(&self) -> &MemoryDocumentRepository {
        &self.documents
    }

    pub fn handler(&self) -> &SignatureRequestHandler {
        &self.handler
    }

    pub fn service(&self) -> &AnchorService {
        &self.service
    }

    pub fn processor(&self) -> &AnchorProcessor {
        self.service.processor()
    }

    /// Queue a version for anchoring
    pub async fn commit(&self, document: Document) -> Result<JobHandle> {
        Ok(self
            .service
            .commit(document, CancellationToken::new())
            .await?)
    }

    /// Load a stored version
    pub async fn stored(&self, schema: &str, version: &VersionId) -> Result<Document> {
        Ok(self.documents.get(&self.did, schema, version).await?)
    }

    pub async fn stop(&self) {
        self.service.jobs().shutdown().await;
    }
}

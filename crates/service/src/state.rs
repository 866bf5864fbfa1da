use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::anchor::{
    AnchorError, AnchorLedger, AnchorProcessor, AnchorService, IdentityService, P2pTransport,
    SignatureRequestHandler,
};
use common::crypto::SecretKey;
use common::document::{Did, Document};
use common::jobs::{JobHandle, JobOrchestrator};
use common::store::{DocumentRepository, MemoryDocumentRepository, MemoryJobRepository};

use super::config::Config;

/// Collaborator-facing systems the node talks to
#[derive(Clone, Debug)]
pub struct Externals {
    pub ledger: Arc<dyn AnchorLedger>,
    pub identities: Arc<dyn IdentityService>,
    pub transport: Arc<dyn P2pTransport>,
}

/// Main service state - owns the store, the job workers and the handlers
#[derive(Clone, Debug)]
pub struct State {
    account: Did,
    documents: Arc<dyn DocumentRepository>,
    handler: SignatureRequestHandler,
    anchor: AnchorService,
}

impl State {
    /// Build the node. Job workers are spawned on the current tokio runtime.
    pub async fn from_config(config: &Config, externals: Externals) -> Result<Self, StateSetupError> {
        // 1. Setup account key
        let key = match config.key_path {
            Some(ref path) => load_key(path)?,
            None => {
                tracing::warn!("no key path configured, generating an ephemeral account key");
                SecretKey::generate()
            }
        };
        let account = Did::from(key.public());

        // 2. Setup stores
        let documents: Arc<dyn DocumentRepository> = Arc::new(MemoryDocumentRepository::new());
        let jobs = JobOrchestrator::start(config.jobs.clone(), Arc::new(MemoryJobRepository::new()));

        // 3. Handler for incoming signature requests and anchored versions
        let handler = SignatureRequestHandler::new(
            account,
            key.clone(),
            externals.identities.clone(),
            externals.ledger.clone(),
            documents.clone(),
        );

        // 4. Anchoring of our own versions
        let processor = AnchorProcessor::new(
            account,
            key,
            config.anchor.clone(),
            externals.ledger,
            externals.identities,
            externals.transport,
        );
        let anchor = AnchorService::new(processor, jobs, documents.clone());

        tracing::info!("Account: {}", account);
        tracing::debug!(
            "ServiceState::from_config - {} workers, queue of {}",
            config.jobs.worker_count,
            config.jobs.max_queue_size
        );

        Ok(Self {
            account,
            documents,
            handler,
            anchor,
        })
    }

    pub fn account(&self) -> Did {
        self.account
    }

    pub fn documents(&self) -> &Arc<dyn DocumentRepository> {
        &self.documents
    }

    /// Handler to route incoming transport messages to
    pub fn handler(&self) -> &SignatureRequestHandler {
        &self.handler
    }

    pub fn anchor(&self) -> &AnchorService {
        &self.anchor
    }

    /// Queue a version for anchoring
    pub async fn commit(
        &self,
        document: Document,
        cancel: CancellationToken,
    ) -> Result<JobHandle, AnchorError> {
        self.anchor.commit(document, cancel).await
    }

    /// Stop the job workers, waiting for running jobs to settle
    pub async fn shutdown(&self) {
        self.anchor.jobs().shutdown().await;
    }
}

fn load_key(path: &Path) -> Result<SecretKey, StateSetupError> {
    if !path.exists() {
        return Err(StateSetupError::KeyPathDoesNotExist);
    }
    let pem = std::fs::read_to_string(path)?;
    SecretKey::from_pem(&pem).map_err(|e| StateSetupError::InvalidKey(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Key path does not exist")]
    KeyPathDoesNotExist,
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

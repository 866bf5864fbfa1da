use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::validators::{create_version_validator, update_version_validator};
use super::{AnchorError, AnchorProcessor, AnchorSession, Validator};
use crate::document::{Document, DocumentError, DocumentStatus};
use crate::jobs::{JobContext, JobHandle, JobOrchestrator, TaskError, Work};
use crate::store::{DocumentRepository, StoreError};

type SharedSession = Arc<Mutex<AnchorSession>>;

/// Commits document versions by running the anchoring steps as a job
///
/// Committing the same version twice while the first job is still running
/// returns the running job, so the ledger sees a single submission.
#[derive(Clone, Debug)]
pub struct AnchorService {
    processor: AnchorProcessor,
    jobs: JobOrchestrator,
    documents: Arc<dyn DocumentRepository>,
}

impl AnchorService {
    pub fn new(
        processor: AnchorProcessor,
        jobs: JobOrchestrator,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            processor,
            jobs,
            documents,
        }
    }

    pub fn processor(&self) -> &AnchorProcessor {
        &self.processor
    }

    pub fn jobs(&self) -> &JobOrchestrator {
        &self.jobs
    }

    pub fn documents(&self) -> &Arc<dyn DocumentRepository> {
        &self.documents
    }

    /// Dedupe key of the anchoring job for a version
    pub fn dedupe_key(document: &Document) -> String {
        format!("anchor:{}", document.current_version().to_hex())
    }

    /// Validate a version and queue it for anchoring.
    ///
    /// A version succeeding a stored one must pass the version chain checks
    /// and the old version's transition rules for the local account.
    /// Cancelling `cancel` aborts a signature round in progress.
    pub async fn commit(
        &self,
        document: Document,
        cancel: CancellationToken,
    ) -> Result<JobHandle, AnchorError> {
        let account = self.processor.account();
        if document.status() == DocumentStatus::Committed {
            return Err(DocumentError::Committed.into());
        }
        if !document.collaborators().can_write(&account) {
            return Err(AnchorError::NotCollaborator(account));
        }

        match document.previous_version() {
            None => create_version_validator().validate(None, &document)?,
            Some(previous) => {
                let old = match self
                    .documents
                    .get(&account, document.schema(), &previous)
                    .await
                {
                    Ok(old) => old,
                    Err(StoreError::NotFound(_)) => {
                        return Err(AnchorError::InvalidDocument(format!(
                            "previous version {} is not stored",
                            previous
                        )))
                    }
                    Err(e) => return Err(e.into()),
                };
                update_version_validator().validate(Some(&old), &document)?;
                old.collaborator_can_update(&document, &account)?;
            }
        }

        let version = document.current_version();
        let dedupe_key = Self::dedupe_key(&document);
        let mut document = document;
        document.set_status(DocumentStatus::Committing)?;

        let work = self.anchor_work(document, cancel);
        let handle = self
            .jobs
            .submit(
                account,
                dedupe_key,
                format!("anchor document version {}", version),
                work,
            )
            .await?;
        Ok(handle)
    }

    fn anchor_work(&self, document: Document, cancel: CancellationToken) -> Work {
        let session: SharedSession = Arc::new(Mutex::new(AnchorSession::new(document)));

        Work::new()
            .then(
                "store pending version",
                self.step(&session, |service, session, _| async move {
                    let session = session.lock().await;
                    let account = service.processor.account();
                    service.documents.upsert(&account, session.document()).await?;
                    Ok(())
                }),
            )
            .then(
                "prepare signature requests",
                self.step(&session, |service, session, _| async move {
                    let mut session = session.lock().await;
                    service.processor.prepare_for_signature_requests(&mut session)?;
                    Ok(())
                }),
            )
            .then(
                "collect signatures",
                self.step(&session, move |service, session, _| {
                    let cancel = cancel.clone();
                    async move {
                        let mut session = session.lock().await;
                        service.processor.request_signatures(&mut session, &cancel).await?;
                        Ok(())
                    }
                }),
            )
            .then(
                "compute document root",
                self.step(&session, |service, session, ctx| async move {
                    let mut session = session.lock().await;
                    let root = service.processor.compute_document_root(&mut session)?;
                    ctx.set_value("document_root", root.to_vec());
                    Ok(())
                }),
            )
            .then(
                "submit transaction",
                self.step(&session, |service, session, ctx| async move {
                    let mut session = session.lock().await;
                    let tx = service.processor.submit(&mut session).await?;
                    ctx.set_value("tx_ref", tx.0.into_bytes());
                    Ok(())
                }),
            )
            .then(
                "await confirmation",
                self.step(&session, |service, session, _| async move {
                    let mut session = session.lock().await;
                    service.processor.await_confirmation(&mut session).await?;
                    Ok(())
                }),
            )
            .then(
                "broadcast",
                self.step(&session, |service, session, _| async move {
                    let session = session.lock().await;
                    service.processor.broadcast(&session).await?;
                    Ok(())
                }),
            )
            .then(
                "persist anchored version",
                self.step(&session, |service, session, _| async move {
                    let session = session.lock().await;
                    let account = service.processor.account();
                    service.documents.upsert(&account, session.document()).await?;
                    Ok(())
                }),
            )
    }

    fn step<F, Fut>(
        &self,
        session: &SharedSession,
        run: F,
    ) -> impl Fn(JobContext) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync + 'static
    where
        F: Fn(AnchorService, SharedSession, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AnchorError>> + Send + 'static,
    {
        let service = self.clone();
        let session = session.clone();
        move |ctx| {
            run(service.clone(), session.clone(), ctx)
                .map(|result| result.map_err(TaskError::from))
                .boxed()
        }
    }
}

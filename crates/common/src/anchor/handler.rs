use std::sync::Arc;

use time::OffsetDateTime;

use super::validators::{
    post_anchor_validator, signature_request_validator, update_version_validator, validate_anchored,
};
use super::{
    verify_document_signature, AnchorError, AnchorLedger, IdentityService, SignatureResponse,
    Validator,
};
use crate::crypto::SecretKey;
use crate::document::{Did, Document, DocumentSignature, DocumentStatus};
use crate::proofs::Hash;
use crate::store::{DocumentRepository, StoreError};

/// Answers signature requests and accepts anchored versions from peers
#[derive(Clone)]
pub struct SignatureRequestHandler {
    account: Did,
    key: SecretKey,
    identities: Arc<dyn IdentityService>,
    ledger: Arc<dyn AnchorLedger>,
    documents: Arc<dyn DocumentRepository>,
}

impl std::fmt::Debug for SignatureRequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureRequestHandler")
            .field("account", &self.account)
            .field("documents", &self.documents)
            .finish()
    }
}

impl SignatureRequestHandler {
    pub fn new(
        account: Did,
        key: SecretKey,
        identities: Arc<dyn IdentityService>,
        ledger: Arc<dyn AnchorLedger>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            account,
            key,
            identities,
            ledger,
            documents,
        }
    }

    pub fn account(&self) -> Did {
        self.account
    }

    /// Validate a requested version and sign its signing root.
    ///
    /// The author must be a writer and must have signed already. When the
    /// previous version is stored locally the change is checked against its
    /// transition rules and the signature says so; a version we cannot
    /// compare against is signed without that claim.
    pub async fn request_document_signature(
        &self,
        document: Document,
        signing_root: Hash,
    ) -> Result<SignatureResponse, AnchorError> {
        if !document.collaborators().can_write(&self.account) {
            return Err(AnchorError::NotCollaborator(self.account));
        }
        signature_request_validator().validate(None, &document)?;
        if document.signing_root() != Some(signing_root) {
            return Err(AnchorError::InvalidDocument(
                "requested signing root does not match the document".to_string(),
            ));
        }

        let author = document
            .author()
            .ok_or_else(|| AnchorError::InvalidDocument("author not set".to_string()))?;
        if !document.collaborators().can_write(&author) {
            return Err(AnchorError::NotCollaborator(author));
        }
        let author_signature = document
            .signatures()
            .iter()
            .find(|s| s.signer == author)
            .ok_or_else(|| AnchorError::SignatureInvalid {
                peer: author,
                reason: "author signature missing".to_string(),
            })?;
        let at = document.timestamp().unwrap_or_else(OffsetDateTime::now_utc);
        verify_document_signature(self.identities.as_ref(), author_signature, &signing_root, at)
            .await
            .map_err(|e| AnchorError::SignatureInvalid {
                peer: author,
                reason: e.to_string(),
            })?;

        let transition_validated = match document.previous_version() {
            None => false,
            Some(previous) => {
                match self
                    .documents
                    .get(&self.account, document.schema(), &previous)
                    .await
                {
                    Ok(old) => {
                        update_version_validator().validate(Some(&old), &document)?;
                        old.collaborator_can_update(&document, &author)?;
                        true
                    }
                    Err(StoreError::NotFound(_)) => {
                        tracing::debug!(
                            "previous version {} not stored, signing {} without transition check",
                            previous,
                            document.current_version()
                        );
                        false
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        match self.documents.upsert(&self.account, &document).await {
            Ok(()) => {}
            Err(StoreError::Immutable(_)) => {
                return Err(AnchorError::InvalidDocument(format!(
                    "version {} is already committed",
                    document.current_version()
                )))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            "signing version {} for {} (transition validated: {})",
            document.current_version(),
            author,
            transition_validated
        );
        let signature =
            DocumentSignature::sign(self.account, &self.key, &signing_root, transition_validated);
        Ok(SignatureResponse {
            signatures: vec![signature],
        })
    }

    /// Accept a version anchored by another collaborator.
    ///
    /// Checks the roots, every signature and the ledger entry before
    /// storing the version as committed.
    pub async fn receive_anchored_document(&self, document: Document) -> Result<(), AnchorError> {
        if !document.is_collaborator(&self.account) {
            return Err(AnchorError::NotCollaborator(self.account));
        }
        post_anchor_validator().validate(None, &document)?;

        let signing_root = document
            .signing_root()
            .ok_or_else(|| AnchorError::InvalidDocument("signing root not computed".to_string()))?;
        let at = document.timestamp().unwrap_or_else(OffsetDateTime::now_utc);
        for signature in document.signatures() {
            verify_document_signature(self.identities.as_ref(), signature, &signing_root, at)
                .await
                .map_err(|e| AnchorError::SignatureInvalid {
                    peer: signature.signer,
                    reason: e.to_string(),
                })?;
        }
        validate_anchored(self.ledger.as_ref(), &document).await?;

        let mut document = document;
        document.set_status(DocumentStatus::Committed)?;
        match self.documents.upsert(&self.account, &document).await {
            Ok(()) | Err(StoreError::Immutable(_)) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            "stored anchored version {} of {}",
            document.current_version(),
            document.identifier()
        );
        Ok(())
    }
}

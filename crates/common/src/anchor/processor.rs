use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use super::{
    AnchorConfig, AnchorData, AnchorError, AnchorLedger, AnchorSession, AnchorState,
    IdentityError, IdentityService, KeyPurpose, LedgerError, P2pTransport, SignatureResponse, TxRef,
};
use crate::crypto::SecretKey;
use crate::document::{Did, Document, DocumentSignature, DocumentStatus};
use crate::proofs::Hash;

/// Check a collaborator's signature against the identity registry.
///
/// The key must be registered for the signer with the signing purpose and
/// must not have been revoked at `at`, usually the version's timestamp.
pub async fn verify_document_signature(
    identities: &dyn IdentityService,
    signature: &DocumentSignature,
    signing_root: &Hash,
    at: OffsetDateTime,
) -> Result<(), IdentityError> {
    let info = identities
        .lookup_key(&signature.signer, &signature.public_key)
        .await?;
    if !info.has_purpose(KeyPurpose::Signing) {
        return Err(IdentityError::KeyNotUsable {
            key: signature.public_key,
            reason: "missing signing purpose".to_string(),
        });
    }
    if !info.valid_at(at) {
        return Err(IdentityError::KeyNotUsable {
            key: signature.public_key,
            reason: "revoked".to_string(),
        });
    }
    identities
        .validate_signature(
            &signature.signer,
            &signature.public_key,
            &signature.signature,
            &signature.payload(signing_root),
        )
        .await
}

#[derive(Debug, Default)]
struct SignatureRound {
    signatures: Vec<DocumentSignature>,
    responded: usize,
    failed: Vec<Did>,
    cancelled: bool,
}

/// Drives an [`AnchorSession`] through the anchoring steps on behalf of the
/// local account
#[derive(Clone)]
pub struct AnchorProcessor {
    account: Did,
    key: SecretKey,
    config: AnchorConfig,
    ledger: Arc<dyn AnchorLedger>,
    identities: Arc<dyn IdentityService>,
    transport: Arc<dyn P2pTransport>,
}

impl std::fmt::Debug for AnchorProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorProcessor")
            .field("account", &self.account)
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("identities", &self.identities)
            .field("transport", &self.transport)
            .finish()
    }
}

impl AnchorProcessor {
    pub fn new(
        account: Did,
        key: SecretKey,
        config: AnchorConfig,
        ledger: Arc<dyn AnchorLedger>,
        identities: Arc<dyn IdentityService>,
        transport: Arc<dyn P2pTransport>,
    ) -> Self {
        Self {
            account,
            key,
            config,
            ledger,
            identities,
            transport,
        }
    }

    pub fn account(&self) -> Did {
        self.account
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn AnchorLedger> {
        &self.ledger
    }

    /// Stamp the version with our update log and compute its data root
    pub fn compute_data_root(&self, session: &mut AnchorSession) -> Result<Hash, AnchorError> {
        session.expect(AnchorState::Draft)?;
        if !session.document().collaborators().can_write(&self.account) {
            return Err(AnchorError::NotCollaborator(self.account));
        }

        let mut stamped = session
            .document()
            .add_update_log(self.account, OffsetDateTime::now_utc())?;
        let root = stamped.compute_data_root()?;
        session.replace_document(stamped);
        session.advance(AnchorState::DataRootComputed);
        Ok(root)
    }

    /// Compute the signing root and add our own signature over it
    pub fn compute_signing_root(&self, session: &mut AnchorSession) -> Result<Hash, AnchorError> {
        session.expect(AnchorState::DataRootComputed)?;
        let document = session.document_mut();
        let root = document.compute_signing_root()?;
        let own = DocumentSignature::sign(self.account, &self.key, &root, false);
        document.append_signatures(vec![own])?;
        session.advance(AnchorState::SigningRootComputed);
        Ok(root)
    }

    /// Both preparation steps in one go
    pub fn prepare_for_signature_requests(&self, session: &mut AnchorSession) -> Result<Hash, AnchorError> {
        self.compute_data_root(session)?;
        self.compute_signing_root(session)
    }

    /// Ask every other read-write collaborator to sign.
    ///
    /// Requests go out concurrently. Each peer gets a bounded number of
    /// attempts, each under its own timeout, and the whole round is bounded
    /// by the round timeout. Collection stops once the quorum is reached;
    /// late answers are ignored. Returns the number of valid signers, our
    /// own signature included.
    pub async fn request_signatures(
        &self,
        session: &mut AnchorSession,
        cancel: &CancellationToken,
    ) -> Result<usize, AnchorError> {
        session.expect(AnchorState::SigningRootComputed)?;
        session.advance(AnchorState::SignaturesRequested);

        let signing_root = session
            .document()
            .signing_root()
            .ok_or_else(|| AnchorError::InvalidDocument("signing root not computed".to_string()))?;
        let writers = session.document().collaborators().read_write().len();
        let required = self.config.required_signatures(writers);
        let have = valid_signers(session.document());
        let peers = session.document().signer_collaborators(&self.account);

        tracing::info!(
            "requesting signatures for {} from {} peers, {} of {} required",
            session.document().current_version(),
            peers.len(),
            required,
            writers
        );

        let round = self
            .collect_signatures(
                session.document(),
                signing_root,
                peers,
                required.saturating_sub(have),
                cancel,
            )
            .await;

        if !round.failed.is_empty() {
            tracing::warn!("{} peers did not provide a valid signature", round.failed.len());
        }
        if !round.signatures.is_empty() {
            session.document_mut().append_signatures(round.signatures)?;
        }

        let collected = valid_signers(session.document());
        if collected >= required {
            session.advance(AnchorState::SignaturesSatisfied);
            return Ok(collected);
        }

        let error = if round.cancelled {
            AnchorError::Cancelled {
                collected,
                required,
            }
        } else {
            AnchorError::InsufficientSignatures {
                collected,
                required,
            }
        };
        session.reject(error.to_string());
        Err(error)
    }

    async fn collect_signatures(
        &self,
        document: &Document,
        signing_root: Hash,
        peers: Vec<Did>,
        needed: usize,
        cancel: &CancellationToken,
    ) -> SignatureRound {
        let mut round = SignatureRound::default();
        if needed == 0 || peers.is_empty() {
            return round;
        }

        let mut pending: FuturesUnordered<_> = peers
            .into_iter()
            .map(|peer| async move {
                let result = self.request_from_peer(peer, document, signing_root).await;
                (peer, result)
            })
            .collect();

        let deadline = tokio::time::sleep(self.config.round_timeout);
        tokio::pin!(deadline);

        while round.responded < needed {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("signature collection cancelled");
                    round.cancelled = true;
                    break;
                }
                _ = &mut deadline => {
                    tracing::warn!(
                        "signature round timed out after {:?}",
                        self.config.round_timeout
                    );
                    break;
                }
                next = pending.next() => match next {
                    None => break,
                    Some((peer, Ok(signatures))) => {
                        tracing::debug!("valid signature from {}", peer);
                        round.responded += 1;
                        round.signatures.extend(signatures);
                    }
                    Some((peer, Err(e))) => {
                        tracing::warn!("no valid signature from {}: {}", peer, e);
                        round.failed.push(peer);
                    }
                },
            }
        }
        round
    }

    async fn request_from_peer(
        &self,
        peer: Did,
        document: &Document,
        signing_root: Hash,
    ) -> Result<Vec<DocumentSignature>, AnchorError> {
        let attempts = self.config.peer_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let request = self
                .transport
                .request_signature(&peer, document, &signing_root);
            let error = match tokio::time::timeout(self.config.peer_timeout, request).await {
                Ok(Ok(response)) => {
                    match self
                        .validate_signature_response(&peer, document, &signing_root, response)
                        .await
                    {
                        Ok(signatures) => return Ok(signatures),
                        Err(e) => e,
                    }
                }
                Ok(Err(e)) => AnchorError::PeerUnavailable {
                    peer,
                    reason: e.to_string(),
                },
                Err(_) => AnchorError::PeerUnavailable {
                    peer,
                    reason: format!("no answer within {:?}", self.config.peer_timeout),
                },
            };

            tracing::debug!("signature request {} to {} failed: {}", attempt, peer, error);
            last_error = Some(error);
            if attempt < attempts {
                tokio::time::sleep(self.config.peer_retry_delay).await;
            }
        }

        Err(last_error.unwrap_or(AnchorError::PeerUnavailable {
            peer,
            reason: "not contacted".to_string(),
        }))
    }

    /// Check every signature of a response came from the requested peer
    /// with a valid signing key
    pub async fn validate_signature_response(
        &self,
        peer: &Did,
        document: &Document,
        signing_root: &Hash,
        response: SignatureResponse,
    ) -> Result<Vec<DocumentSignature>, AnchorError> {
        let invalid = |reason: String| AnchorError::SignatureInvalid {
            peer: *peer,
            reason,
        };
        if response.signatures.is_empty() {
            return Err(invalid("empty response".to_string()));
        }

        let at = document.timestamp().unwrap_or_else(OffsetDateTime::now_utc);
        for signature in &response.signatures {
            if signature.signer != *peer {
                return Err(invalid(format!("signed by {} instead", signature.signer)));
            }
            verify_document_signature(self.identities.as_ref(), signature, signing_root, at)
                .await
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(response.signatures)
    }

    pub fn compute_document_root(&self, session: &mut AnchorSession) -> Result<Hash, AnchorError> {
        session.expect(AnchorState::SignaturesSatisfied)?;
        let root = session.document_mut().compute_document_root()?;
        session.advance(AnchorState::DocumentRootComputed);
        Ok(root)
    }

    /// Submit the document root under the version id.
    ///
    /// Calling this again after a successful submission returns the same
    /// transaction without touching the ledger.
    pub async fn submit(&self, session: &mut AnchorSession) -> Result<TxRef, AnchorError> {
        if session.state().is_past(&AnchorState::DocumentRootComputed) {
            if let Some(tx) = session.tx() {
                return Ok(tx.clone());
            }
        }
        session.expect(AnchorState::DocumentRootComputed)?;

        let document_root = session
            .document()
            .document_root()
            .ok_or_else(|| AnchorError::InvalidDocument("document root not computed".to_string()))?;
        let anchor_id = session.document().current_version();

        match self.ledger.submit(document_root, anchor_id).await {
            Ok(tx) => {
                tracing::info!("submitted anchor {} in {}", anchor_id, tx);
                session.set_tx(tx.clone());
                session.advance(AnchorState::Submitted);
                Ok(tx)
            }
            Err(LedgerError::Rejected(reason)) => {
                session.reject(reason.clone());
                Err(AnchorError::LedgerRejected(reason))
            }
            Err(e) => {
                tracing::warn!("anchor {} submission failed: {}", anchor_id, e);
                Err(AnchorError::AnchorSubmissionFailed(e.to_string()))
            }
        }
    }

    /// Poll the ledger until the submitted root shows up, then commit the
    /// version locally
    pub async fn await_confirmation(&self, session: &mut AnchorSession) -> Result<AnchorData, AnchorError> {
        session.expect(AnchorState::Submitted)?;
        let document_root = session
            .document()
            .document_root()
            .ok_or_else(|| AnchorError::InvalidDocument("document root not computed".to_string()))?;
        let anchor_id = session.document().current_version();
        let polls = self.config.confirmation_polls.max(1);

        for poll in 0..polls {
            if poll > 0 {
                tokio::time::sleep(self.config.confirmation_interval).await;
            }
            match self.ledger.get_anchor_data(&anchor_id).await {
                Ok(data) if data.document_root == document_root => {
                    session.document_mut().set_status(DocumentStatus::Committed)?;
                    session.advance(AnchorState::Anchored);
                    tracing::info!("anchor {} confirmed", anchor_id);
                    return Ok(data);
                }
                Ok(_) => {
                    let reason = format!("anchor {} holds a different document root", anchor_id);
                    session.reject(reason.clone());
                    return Err(AnchorError::LedgerRejected(reason));
                }
                Err(LedgerError::Rejected(reason)) => {
                    session.reject(reason.clone());
                    return Err(AnchorError::LedgerRejected(reason));
                }
                Err(e) => tracing::debug!("anchor {} not visible yet: {}", anchor_id, e),
            }
        }

        Err(AnchorError::AnchorSubmissionFailed(format!(
            "anchor {} not confirmed after {} polls",
            anchor_id, polls
        )))
    }

    /// Send the anchored version to every other collaborator.
    ///
    /// Best effort: failures are logged and counted, never returned.
    pub async fn broadcast(&self, session: &AnchorSession) -> Result<usize, AnchorError> {
        session.expect(AnchorState::Anchored)?;
        let document = session.document();
        let peers: Vec<Did> = document
            .collaborators()
            .all()
            .into_iter()
            .filter(|did| *did != self.account)
            .collect();

        let results = futures::future::join_all(peers.iter().map(|peer| async move {
            let send = self.transport.send_anchored_document(peer, document);
            (peer, tokio::time::timeout(self.config.peer_timeout, send).await)
        }))
        .await;

        let mut delivered = 0;
        for (peer, result) in results {
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => tracing::warn!("failed to send anchored document to {}: {}", peer, e),
                Err(_) => tracing::warn!("timed out sending anchored document to {}", peer),
            }
        }
        tracing::info!(
            "sent anchored version {} to {} of {} collaborators",
            document.current_version(),
            delivered,
            peers.len()
        );
        Ok(delivered)
    }

    /// Run every step in order without the job orchestrator
    pub async fn anchor(
        &self,
        session: &mut AnchorSession,
        cancel: &CancellationToken,
    ) -> Result<AnchorData, AnchorError> {
        self.prepare_for_signature_requests(session)?;
        self.request_signatures(session, cancel).await?;
        self.compute_document_root(session)?;
        self.submit(session).await?;
        let data = self.await_confirmation(session).await?;
        self.broadcast(session).await?;
        Ok(data)
    }
}

/// Distinct read-write collaborators that signed
fn valid_signers(document: &Document) -> usize {
    let mut signers: Vec<Did> = document
        .signatures()
        .iter()
        .map(|s| s.signer)
        .filter(|did| document.collaborators().can_write(did))
        .collect();
    signers.sort();
    signers.dedup();
    signers.len()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::document::{CollaboratorsAccess, EmbeddedData};
    use crate::jobs::OrchestratorConfig;
    use crate::testkit::{PeerBehavior, TestNetwork};

    fn config() -> AnchorConfig {
        AnchorConfig {
            quorum: None,
            peer_timeout: Duration::from_secs(1),
            peer_attempts: 2,
            peer_retry_delay: Duration::from_millis(10),
            round_timeout: Duration::from_secs(5),
            confirmation_polls: 5,
            confirmation_interval: Duration::from_millis(10),
        }
    }

    fn network(names: &[&str], anchor: AnchorConfig) -> (TestNetwork, Vec<Did>) {
        let mut net = TestNetwork::with_config(anchor, OrchestratorConfig::default());
        let dids = names.iter().map(|name| net.add_peer(*name).unwrap()).collect();
        (net, dids)
    }

    fn document(writers: Vec<Did>) -> Document {
        Document::new(
            CollaboratorsAccess::new(Vec::new(), writers),
            Vec::new(),
            EmbeddedData::generic().with_field("amount", b"100".to_vec()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_steps_must_run_in_order() {
        let (net, dids) = network(&["alice"], config());
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids));

        assert!(matches!(
            processor.compute_signing_root(&mut session),
            Err(AnchorError::InvalidState { .. })
        ));
        assert!(matches!(
            processor.submit(&mut session).await,
            Err(AnchorError::InvalidState { .. })
        ));
        processor.compute_data_root(&mut session).unwrap();
        assert_eq!(session.state(), &AnchorState::DataRootComputed);
        assert_eq!(session.document().author(), Some(processor.account()));
    }

    #[tokio::test]
    async fn test_non_writer_cannot_anchor() {
        let (net, dids) = network(&["alice", "bob"], config());
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(vec![dids[1]]));
        assert!(matches!(
            processor.compute_data_root(&mut session),
            Err(AnchorError::NotCollaborator(_))
        ));
    }

    #[tokio::test]
    async fn test_anchor_with_all_peers() {
        let (net, dids) = network(&["alice", "bob", "carol"], config());
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids.clone()));

        let data = processor
            .anchor(&mut session, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(session.state(), &AnchorState::Anchored);
        assert_eq!(session.document().status(), DocumentStatus::Committed);
        assert_eq!(session.document().signatures().len(), 3);
        assert_eq!(Some(data.document_root), session.document().document_root());
        assert_eq!(net.ledger().submissions(), 1);

        // first versions are signed without a transition claim
        assert!(session
            .document()
            .signatures()
            .iter()
            .all(|s| !s.transition_validated));

        let version = session.document().current_version();
        for did in &dids[1..] {
            assert_eq!(net.transport().anchored_received(did), vec![version]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_tolerates_unresponsive_peer() {
        let anchor = AnchorConfig {
            quorum: Some(2),
            ..config()
        };
        let (net, dids) = network(&["alice", "bob", "carol"], anchor);
        net.set_behavior("carol", PeerBehavior::Unresponsive).unwrap();
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        let collected = processor
            .request_signatures(&mut session, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(collected, 2);
        assert_eq!(session.state(), &AnchorState::SignaturesSatisfied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_signatures_rejects() {
        let (net, dids) = network(&["alice", "bob", "carol"], config());
        net.set_behavior("carol", PeerBehavior::Offline).unwrap();
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids.clone()));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        let err = processor
            .request_signatures(&mut session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::InsufficientSignatures {
                collected: 2,
                required: 3
            }
        ));
        assert!(matches!(session.state(), AnchorState::Rejected { .. }));
        // every attempt was spent on the offline peer
        assert_eq!(net.transport().requests(&dids[2]), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_peer_is_retried() {
        let (net, dids) = network(&["alice", "bob"], config());
        net.set_behavior("bob", PeerBehavior::FailFirst(1)).unwrap();
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids.clone()));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        processor
            .request_signatures(&mut session, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(net.transport().requests(&dids[1]), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_is_not_counted() {
        let (net, dids) = network(&["alice", "bob"], config());
        net.set_behavior("bob", PeerBehavior::WrongKey).unwrap();
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        let err = processor
            .request_signatures(&mut session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::InsufficientSignatures {
                collected: 1,
                required: 2
            }
        ));
        assert_eq!(session.document().signatures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_not_met_by_own_signature() {
        let anchor = AnchorConfig {
            quorum: Some(2),
            ..config()
        };
        let (net, dids) = network(&["alice", "bob", "carol"], anchor);
        net.set_behavior("bob", PeerBehavior::Unresponsive).unwrap();
        net.set_behavior("carol", PeerBehavior::WrongKey).unwrap();
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids.clone()));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        let err = processor
            .request_signatures(&mut session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::InsufficientSignatures {
                collected: 1,
                required: 2
            }
        ));
        assert!(matches!(session.state(), AnchorState::Rejected { .. }));
        assert_eq!(session.document().signatures().len(), 1);
        assert_eq!(net.transport().requests(&dids[1]), 2);
        assert_eq!(net.transport().requests(&dids[2]), 2);

        // a rejected round never folds its lone signature into a root
        assert!(matches!(
            processor.compute_document_root(&mut session),
            Err(AnchorError::InvalidState { .. })
        ));
        assert_eq!(session.document().document_root(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reports_partial_count() {
        let (net, dids) = network(&["alice", "bob", "carol"], config());
        net.set_behavior("carol", PeerBehavior::Unresponsive).unwrap();
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = processor
            .request_signatures(&mut session, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::Cancelled {
                collected: 2,
                required: 3
            }
        ));
        match session.state() {
            AnchorState::Rejected { reason } => assert!(reason.contains("2 of 3")),
            other => panic!("unexpected state {}", other),
        }
    }

    #[tokio::test]
    async fn test_submission_retry_is_idempotent() {
        let (net, dids) = network(&["alice"], config());
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        processor
            .request_signatures(&mut session, &CancellationToken::new())
            .await
            .unwrap();
        processor.compute_document_root(&mut session).unwrap();

        net.ledger().fail_next_submissions(1);
        let err = processor.submit(&mut session).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(session.state(), &AnchorState::DocumentRootComputed);

        let tx = processor.submit(&mut session).await.unwrap();
        let again = processor.submit(&mut session).await.unwrap();
        assert_eq!(tx, again);
        assert_eq!(net.ledger().submissions(), 1);

        net.ledger().set_confirmation_delay(0);
        processor.await_confirmation(&mut session).await.unwrap();
        assert_eq!(session.state(), &AnchorState::Anchored);
    }

    #[tokio::test]
    async fn test_conflicting_anchor_is_rejected() {
        let (net, dids) = network(&["alice"], config());
        let processor = net.peer("alice").unwrap().processor();
        let mut session = AnchorSession::new(document(dids));

        processor.prepare_for_signature_requests(&mut session).unwrap();
        processor
            .request_signatures(&mut session, &CancellationToken::new())
            .await
            .unwrap();
        processor.compute_document_root(&mut session).unwrap();

        net.ledger()
            .insert_anchor(session.document().current_version(), [7; 32]);
        let err = processor.submit(&mut session).await.unwrap_err();
        assert!(matches!(err, AnchorError::LedgerRejected(_)));
        assert!(!err.is_transient());
        assert!(matches!(session.state(), AnchorState::Rejected { .. }));
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::anchor::{P2pTransport, SignatureRequestHandler, SignatureResponse, TransportError};
use crate::crypto::SecretKey;
use crate::document::{Did, Document, DocumentSignature, VersionId};
use crate::proofs::Hash;

/// How a registered peer reacts to requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Answers through its handler
    Honest,
    /// Every request fails as unreachable
    Offline,
    /// Requests never complete
    Unresponsive,
    /// The first `n` signature requests fail, later ones are answered
    FailFirst(u32),
    /// Answers with a signature made by a key the registry does not know
    WrongKey,
}

#[derive(Debug)]
struct Route {
    handler: SignatureRequestHandler,
    behavior: PeerBehavior,
    requests: u32,
    failures: u32,
    anchored: Vec<VersionId>,
}

/// In-process transport routing requests to registered handlers
///
/// Documents are passed through their storage encoding on the way, as they
/// would be on the wire.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    routes: Arc<Mutex<HashMap<Did, Route>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: SignatureRequestHandler) {
        self.routes.lock().insert(
            handler.account(),
            Route {
                handler,
                behavior: PeerBehavior::Honest,
                requests: 0,
                failures: 0,
                anchored: Vec::new(),
            },
        );
    }

    pub fn set_behavior(&self, peer: &Did, behavior: PeerBehavior) {
        if let Some(route) = self.routes.lock().get_mut(peer) {
            route.behavior = behavior;
            route.failures = 0;
        }
    }

    /// Signature requests sent to `peer`
    pub fn requests(&self, peer: &Did) -> u32 {
        self.routes.lock().get(peer).map(|r| r.requests).unwrap_or(0)
    }

    /// Versions `peer` accepted as anchored
    pub fn anchored_received(&self, peer: &Did) -> Vec<VersionId> {
        self.routes
            .lock()
            .get(peer)
            .map(|r| r.anchored.clone())
            .unwrap_or_default()
    }

    fn route(&self, peer: &Did, count_request: bool) -> Result<(SignatureRequestHandler, PeerBehavior), TransportError> {
        let mut routes = self.routes.lock();
        let route = routes
            .get_mut(peer)
            .ok_or(TransportError::Unreachable(*peer))?;
        if count_request {
            route.requests += 1;
            if let PeerBehavior::FailFirst(n) = route.behavior {
                if route.failures < n {
                    route.failures += 1;
                    return Err(TransportError::Unreachable(*peer));
                }
            }
        }
        Ok((route.handler.clone(), route.behavior))
    }
}

fn over_the_wire(document: &Document) -> Result<Document, TransportError> {
    let bytes = document
        .to_bytes()
        .map_err(|e| TransportError::Refused(e.to_string()))?;
    Document::from_bytes(&bytes).map_err(|e| TransportError::Refused(e.to_string()))
}

#[async_trait]
impl P2pTransport for MemoryTransport {
    async fn request_signature(
        &self,
        peer: &Did,
        document: &Document,
        signing_root: &Hash,
    ) -> Result<SignatureResponse, TransportError> {
        let (handler, behavior) = self.route(peer, true)?;
        match behavior {
            PeerBehavior::Offline => return Err(TransportError::Unreachable(*peer)),
            PeerBehavior::Unresponsive => {
                return futures::future::pending::<Result<SignatureResponse, TransportError>>().await
            }
            _ => {}
        }

        let mut response = handler
            .request_document_signature(over_the_wire(document)?, *signing_root)
            .await
            .map_err(|e| TransportError::Refused(e.to_string()))?;

        if behavior == PeerBehavior::WrongKey {
            let rogue = SecretKey::generate();
            for signature in response.signatures.iter_mut() {
                *signature = DocumentSignature::sign(
                    signature.signer,
                    &rogue,
                    signing_root,
                    signature.transition_validated,
                );
            }
        }
        Ok(response)
    }

    async fn send_anchored_document(&self, peer: &Did, document: &Document) -> Result<(), TransportError> {
        let (handler, behavior) = self.route(peer, false)?;
        if matches!(behavior, PeerBehavior::Offline | PeerBehavior::Unresponsive) {
            return Err(TransportError::Unreachable(*peer));
        }

        handler
            .receive_anchored_document(over_the_wire(document)?)
            .await
            .map_err(|e| TransportError::Refused(e.to_string()))?;

        if let Some(route) = self.routes.lock().get_mut(peer) {
            route.anchored.push(document.current_version());
        }
        Ok(())
    }
}

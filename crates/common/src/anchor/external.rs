//! Seams to the systems a node talks to but does not own
//!
//! The ledger, the identity registry and the peer transport are injected as
//! trait objects so the protocol can run against real services or against
//! the in-memory doubles in [`crate::testkit`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::crypto::{PublicKey, Signature};
use crate::document::{Did, Document, DocumentSignature, VersionId};
use crate::proofs::Hash;

/// Key an anchor is recorded under on the ledger
pub type AnchorId = VersionId;

/// Reference to a submitted ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(pub String);

impl std::fmt::Display for TxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the ledger holds for an anchor id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorData {
    pub document_root: Hash,
    pub anchored_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger could not be reached, worth retrying
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// The ledger refused the anchor for good
    #[error("ledger rejected anchor: {0}")]
    Rejected(String),
    #[error("anchor {0} not found")]
    NotFound(AnchorId),
}

/// External ledger recording `anchor id -> document root`
#[async_trait]
pub trait AnchorLedger: Send + Sync + std::fmt::Debug {
    /// Submit a root for an anchor id.
    ///
    /// Submitting the same root for an id twice must be harmless.
    async fn submit(&self, document_root: Hash, anchor_id: AnchorId) -> Result<TxRef, LedgerError>;

    /// Fails with [`LedgerError::NotFound`] until the anchor is recorded
    async fn get_anchor_data(&self, anchor_id: &AnchorId) -> Result<AnchorData, LedgerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPurpose {
    /// Signing document versions
    Signing,
    /// Authenticating p2p connections
    P2pDiscovery,
    /// Sending ledger transactions
    Action,
}

/// A key registered for an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key: PublicKey,
    pub purposes: Vec<KeyPurpose>,
    pub revoked_at: Option<OffsetDateTime>,
}

impl KeyInfo {
    pub fn new(key: PublicKey, purposes: Vec<KeyPurpose>) -> Self {
        Self {
            key,
            purposes,
            revoked_at: None,
        }
    }

    pub fn has_purpose(&self, purpose: KeyPurpose) -> bool {
        self.purposes.contains(&purpose)
    }

    /// Whether the key was usable at `at`
    pub fn valid_at(&self, at: OffsetDateTime) -> bool {
        match self.revoked_at {
            Some(revoked_at) => at < revoked_at,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unknown identity {0}")]
    UnknownIdentity(Did),
    #[error("key {key} not registered for {did}")]
    KeyNotFound { did: Did, key: PublicKey },
    #[error("key {key} not usable: {reason}")]
    KeyNotUsable { key: PublicKey, reason: String },
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Registry mapping identities to their keys
#[async_trait]
pub trait IdentityService: Send + Sync + std::fmt::Debug {
    /// Check `signature` over `message` was made by a key registered for `signer`
    async fn validate_signature(
        &self,
        signer: &Did,
        public_key: &PublicKey,
        signature: &Signature,
        message: &[u8],
    ) -> Result<(), IdentityError>;

    async fn lookup_key(&self, signer: &Did, key_id: &PublicKey) -> Result<KeyInfo, IdentityError>;
}

/// A peer's answer to a signature request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub signatures: Vec<DocumentSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} unreachable")]
    Unreachable(Did),
    /// The peer answered with an error
    #[error("peer refused: {0}")]
    Refused(String),
}

/// Point to point messaging between collaborators
#[async_trait]
pub trait P2pTransport: Send + Sync + std::fmt::Debug {
    /// Ask `peer` to sign the document's signing root
    async fn request_signature(
        &self,
        peer: &Did,
        document: &Document,
        signing_root: &Hash,
    ) -> Result<SignatureResponse, TransportError>;

    /// Hand an anchored version to `peer`
    async fn send_anchored_document(&self, peer: &Did, document: &Document) -> Result<(), TransportError>;
}

#[cfg(test)]
mod test {
    use time::Duration;

    use super::*;
    use crate::crypto::SecretKey;

    #[test]
    fn test_key_validity_window() {
        let now = OffsetDateTime::now_utc();
        let mut info = KeyInfo::new(SecretKey::generate().public(), vec![KeyPurpose::Signing]);
        assert!(info.valid_at(now));

        info.revoked_at = Some(now);
        assert!(!info.valid_at(now));
        assert!(info.valid_at(now - Duration::seconds(1)));
        assert!(info.has_purpose(KeyPurpose::Signing));
        assert!(!info.has_purpose(KeyPurpose::Action));
    }
}

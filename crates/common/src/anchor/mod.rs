//! Multi-party anchoring of document versions
//!
//! A version moves through a fixed sequence of states before it is
//! committed:
//!
//! ```text
//! Draft -> DataRootComputed -> SigningRootComputed -> SignaturesRequested
//!       -> SignaturesSatisfied -> DocumentRootComputed -> Submitted -> Anchored
//! ```
//!
//! Any step may end in `Rejected`. The author computes the roots and signs
//! first, then asks every other read-write collaborator to sign the signing
//! root over the [`P2pTransport`]. Once enough valid signatures are in, the
//! document root is submitted to the [`AnchorLedger`] and, when confirmed,
//! the version is committed locally and sent to all collaborators.
//!
//! - [`AnchorProcessor`] drives the steps on an [`AnchorSession`]
//! - [`SignatureRequestHandler`] is the receiving side on every peer
//! - [`AnchorService`] runs the whole flow as a deduplicated background job

mod config;
mod external;
mod handler;
mod processor;
mod service;
mod state;
pub mod validators;

pub use config::AnchorConfig;
pub use external::{
    AnchorData, AnchorId, AnchorLedger, IdentityError, IdentityService, KeyInfo, KeyPurpose,
    LedgerError, P2pTransport, SignatureResponse, TransportError, TxRef,
};
pub use handler::SignatureRequestHandler;
pub use processor::{verify_document_signature, AnchorProcessor};
pub use service::AnchorService;
pub use state::{AnchorSession, AnchorState};
pub use validators::{ValidationError, Validator, ValidatorGroup};

use crate::document::{Did, DocumentError};
use crate::jobs::{JobError, TaskError};
use crate::store::StoreError;
use crate::transition::TransitionError;

#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("anchoring step out of order: expected {expected}, found {found}")]
    InvalidState {
        expected: AnchorState,
        found: AnchorState,
    },
    #[error("{0} is not a collaborator with the required access")]
    NotCollaborator(Did),
    #[error("invalid signature from {peer}: {reason}")]
    SignatureInvalid { peer: Did, reason: String },
    #[error("peer {peer} unavailable: {reason}")]
    PeerUnavailable { peer: Did, reason: String },
    #[error("insufficient signatures: {collected} of {required}")]
    InsufficientSignatures { collected: usize, required: usize },
    #[error("signature collection cancelled with {collected} of {required} signatures")]
    Cancelled { collected: usize, required: usize },
    /// Ledger temporarily unreachable or the anchor not yet visible
    #[error("anchor submission failed: {0}")]
    AnchorSubmissionFailed(String),
    #[error("ledger rejected anchor: {0}")]
    LedgerRejected(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("job error: {0}")]
    Job(#[from] JobError),
}

impl AnchorError {
    /// Whether retrying the same step may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnchorError::AnchorSubmissionFailed(_) | AnchorError::Store(StoreError::Internal(_))
        )
    }
}

impl From<AnchorError> for TaskError {
    fn from(e: AnchorError) -> Self {
        if e.is_transient() {
            TaskError::Transient(e.into())
        } else {
            TaskError::Fatal(e.into())
        }
    }
}

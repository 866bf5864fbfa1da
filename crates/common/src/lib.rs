/**
 * Multi-party anchoring of document versions.
 *  - Signature collection from collaborators
 *  - Ledger submission and confirmation
 *  - Handling of incoming requests and anchored versions
 */
pub mod anchor;
/**
 * Cryptographic types and operations.
 *  - Ed25519 keys and signatures
 *  - Consensus signature payloads
 */
pub mod crypto;
/**
 * Versioned, collaboratively authored documents:
 *  collaborators, roles, transition rules,
 *  typed attributes and record sets.
 */
pub mod document;
/**
 * Background job orchestration with
 *  deduplication and retry.
 */
pub mod jobs;
/**
 * Salted binary hash trees and
 *  field-level inclusion proofs.
 */
pub mod proofs;
/**
 * Repositories for document versions
 *  and job records.
 */
pub mod store;
/**
 * In-memory ledger, identity registry and
 *  transport, plus a multi-peer harness.
 */
pub mod testkit;
/**
 * Rule based validation of changes
 *  between document versions.
 */
pub mod transition;

pub mod prelude {
    pub use crate::anchor::{
        AnchorConfig, AnchorError, AnchorLedger, AnchorProcessor, AnchorService, AnchorSession,
        AnchorState, IdentityService, P2pTransport, SignatureRequestHandler,
    };
    pub use crate::crypto::{PublicKey, SecretKey};
    pub use crate::document::{
        Attribute, AttributeType, AttributeValue, CollaboratorsAccess, Did, Document,
        DocumentError, DocumentStatus, EmbeddedData, FieldMatchType, TransitionAction, VersionId,
    };
    pub use crate::jobs::{JobHandle, JobOrchestrator, JobStatus, OrchestratorConfig};
    pub use crate::proofs::{validate_proof, Hash, Proof};
    pub use crate::store::{DocumentRepository, StoreError};
    pub use crate::transition::TransitionError;
}

//! # Documents
//!
//! A [`Document`] is one version of a collaboratively authored record. All
//! versions of a document share an identifier and are chained through their
//! version ids:
//!
//! ```text
//! v0: identifier = current = A, next = B
//! v1: previous = A, current = B, next = C
//! v2: previous = B, current = C, next = D
//! ```
//!
//! ## Access
//!
//! - [`CollaboratorsAccess`] lists who may read and who may write (and must
//!   sign) a version
//! - [`Role`]s group participants, and [`TransitionRule`]s grant roles edit
//!   or deny permissions over field paths
//!
//! ## Content
//!
//! - typed [`Attribute`]s keyed by `sha256(label)`, including indexed record
//!   sets (see [`record_label`])
//! - the schema specific [`EmbeddedData`] payload
//!
//! ## Commitments
//!
//! Every field becomes a salted leaf of one of three Merkle trees (see
//! [`crate::proofs`]). Their roots compose into the signing root that
//! collaborators sign and the document root that is anchored.

mod attribute;
mod collaborators;
mod commitments;
mod embedded;
mod ids;
mod model;
mod records;
mod roles;
mod rules;
mod signature;

pub use attribute::{Attribute, AttributeType, AttributeValue, Decimal, MAX_DECIMAL_SCALE};
pub use collaborators::CollaboratorsAccess;
pub use embedded::{DocumentSchema, EmbeddedData, Generic, GENERIC_SCHEMA};
pub use ids::{AttrKey, Did, RoleKey, RuleKey, VersionId, ID_SIZE};
pub use model::{attribute_field_prefix, Document, DocumentStatus};
pub use records::record_label;
pub use roles::Role;
pub use rules::{
    rules_fingerprint, FieldMatchType, TransitionAction, TransitionRule, CORE_PREFIX,
    DEFAULT_RULE_FIELDS,
};
pub use signature::{DocumentSignature, Nft};

use crate::proofs::ProofError;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("stale version: document has no next version")]
    StaleVersion,
    #[error("document is committed and can no longer change")]
    Committed,
    #[error("invalid status transition from {from} to {to}")]
    StatusTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },
    #[error("collaborators list is empty")]
    EmptyCollaborators,
    #[error("role key is empty")]
    EmptyRoleKey,
    #[error("role already exists: {0}")]
    RoleExists(RoleKey),
    #[error("role not found: {0}")]
    RoleNotFound(RoleKey),
    #[error("transition rule not found: {0}")]
    RuleNotFound(RuleKey),
    #[error("attribute label is empty")]
    EmptyLabel,
    #[error("attribute not found: {0}")]
    AttributeNotFound(AttrKey),
    #[error("unknown attribute type: {0}")]
    UnknownAttributeType(String),
    #[error("value is not a valid {attr_type}: {reason}")]
    NotValidAttributeType {
        attr_type: AttributeType,
        reason: String,
    },
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("invalid record index sentinel for {0}")]
    InvalidRecordIndex(String),
    #[error("field not found: {0}")]
    FieldNotFound(String),
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },
    #[error("proof error: {0}")]
    Proof(#[from] ProofError),
    #[error("serialization error: {0}")]
    Serialization(String),
}

//! Cryptographic primitives for docanchor
//!
//! This module provides the cryptographic foundation for document signing and
//! commitment:
//!
//! - **Identity & Authentication**: Ed25519 keypairs used by collaborators to
//!   sign the signing root of a document version
//! - **Content Keys**: SHA-256 derived keys for attributes and roles
//!
//! # Security Model
//!
//! ## Signer Identity
//! Each collaborator is addressed by a [`Did`](crate::document::Did) and holds
//! one or more Ed25519 keypairs (`SecretKey`/`PublicKey`). Which keys are valid
//! for signing, and whether they have been revoked, is answered by the external
//! identity service, never by the key itself.
//!
//! ## Consensus Signatures
//! Collaborators sign the consensus payload `signing_root || flag`, where the
//! flag records whether the signer validated the transition from the previous
//! version. See [`consensus_signature_payload`].
//!
//! Merkle hashing lives in [`crate::proofs`], which uses BLAKE3.

mod keys;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

use sha2::{Digest, Sha256};

/// Size of a SHA-256 digest in bytes
pub const SHA256_SIZE: usize = 32;

/// Hash arbitrary bytes with SHA-256
pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Build the payload collaborators sign for a document version.
///
/// The payload is the signing root followed by a single flag byte that is `1`
/// when the signer validated the transition from the previous version and `0`
/// otherwise.
pub fn consensus_signature_payload(signing_root: &[u8; 32], transition_validated: bool) -> Vec<u8> {
    let mut payload = Vec::with_capacity(signing_root.len() + 1);
    payload.extend_from_slice(signing_root);
    payload.push(u8::from(transition_validated));
    payload
}

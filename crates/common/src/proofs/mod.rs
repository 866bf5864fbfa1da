//! # Field-level Merkle commitments
//!
//! Every document version is committed to by a small family of binary hash
//! trees whose leaves are individual fields.
//!
//! ## Leaves
//!
//! A [`Leaf`] is `{path, value, salt}`. The salt is 32 random bytes drawn per
//! leaf per document version, so a leaf hash reveals nothing about the value
//! to a verifier who does not hold the salt. Leaves are sorted by path before
//! hashing, which makes the tree a pure function of its leaf set.
//!
//! ## Hashing
//!
//! All hashing is BLAKE3 with a one-byte domain tag:
//!
//! - leaf: `blake3(0x00 || u64be(len path) || path || u64be(len value) || value || salt)`
//! - node: `blake3(0x01 || left || right)`
//! - empty tree: `blake3(0x02)`
//!
//! Nodes are hashed pairwise level by level; a trailing odd node is promoted to
//! the next level unchanged, so a proof simply has no step for that level.
//!
//! ## Root composition
//!
//! ```text
//! signing_root  = node(data_root, core_root)
//! document_root = node(signing_root, signatures_root)
//! ```

mod proof;
mod tree;

pub use proof::{validate_proof, Proof, ProofStep, Side};
pub use tree::{Leaf, Tree};

use serde::{Deserialize, Serialize};

/// Size of every hash produced by the engine
pub const HASH_SIZE: usize = 32;
/// Size of a per-leaf salt
pub const SALT_SIZE: usize = 32;

/// A BLAKE3 digest
pub type Hash = [u8; HASH_SIZE];
/// A per-leaf privacy salt
pub type Salt = [u8; SALT_SIZE];

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;
const EMPTY_TAG: u8 = 0x02;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofError {
    #[error("field not found: {0}")]
    FieldNotFound(String),
    #[error("duplicate field in tree: {0}")]
    DuplicateField(String),
    #[error("tree has not been generated")]
    NotGenerated,
}

/// Draw a fresh random salt
pub fn new_salt() -> Salt {
    rand::random()
}

/// Hash a single leaf
pub fn hash_leaf(path: &str, value: &[u8], salt: &Salt) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_TAG]);
    hasher.update(&(path.len() as u64).to_be_bytes());
    hasher.update(path.as_bytes());
    hasher.update(&(value.len() as u64).to_be_bytes());
    hasher.update(value);
    hasher.update(salt);
    *hasher.finalize().as_bytes()
}

/// Hash two sibling nodes into their parent.
///
/// Also used to compose the signing and document roots.
pub fn hash_node(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_TAG]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Root of a tree without leaves
pub fn empty_root() -> Hash {
    *blake3::hash(&[EMPTY_TAG]).as_bytes()
}

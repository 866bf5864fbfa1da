use serde::{Deserialize, Serialize};

use super::{hash_leaf, hash_node, Hash, Salt};

/// Which side of the running hash a sibling sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: Hash,
    pub side: Side,
}

/// Inclusion proof for a single field
///
/// Carries the disclosed value and salt together with the sibling hashes from
/// the leaf up to the root the proof was created against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub field: String,
    pub value: Vec<u8>,
    pub salt: Salt,
    pub hashes: Vec<ProofStep>,
}

impl Proof {
    /// Append a sibling step, used when lifting a tree proof to a composed root
    pub fn push_step(&mut self, hash: Hash, side: Side) {
        self.hashes.push(ProofStep { hash, side });
    }

    /// Root this proof commits to
    pub fn computed_root(&self) -> Hash {
        self.hashes.iter().fold(
            hash_leaf(&self.field, &self.value, &self.salt),
            |acc, step| match step.side {
                Side::Left => hash_node(&step.hash, &acc),
                Side::Right => hash_node(&acc, &step.hash),
            },
        )
    }
}

/// Check a proof against a root.
///
/// Any change to the field, value, salt or a sibling hash yields a different
/// computed root and the check fails.
pub fn validate_proof(root: &Hash, proof: &Proof) -> bool {
    &proof.computed_root() == root
}

use serde::{Deserialize, Serialize};

use super::proof::{Proof, ProofStep, Side};
use super::{empty_root, hash_leaf, hash_node, Hash, ProofError, Salt};

/// A single committed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    /// Readable field path, e.g. `cd.collaborators.read_write[0]`
    pub path: String,
    /// Encoded field value
    pub value: Vec<u8>,
    /// Privacy salt for this leaf
    pub salt: Salt,
}

impl Leaf {
    pub fn new(path: impl Into<String>, value: impl Into<Vec<u8>>, salt: Salt) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            salt,
        }
    }

    pub fn hash(&self) -> Hash {
        hash_leaf(&self.path, &self.value, &self.salt)
    }
}

/// Binary hash tree over a set of leaves sorted by path
#[derive(Debug, Clone)]
pub struct Tree {
    leaves: Vec<Leaf>,
    // levels[0] holds the leaf hashes, the last level holds the root
    levels: Option<Vec<Vec<Hash>>>,
}

impl Tree {
    /// Create a tree from an unordered list of leaves.
    ///
    /// Leaves are sorted by path. Two leaves sharing a path are rejected since
    /// a proof could not tell them apart.
    pub fn new(mut leaves: Vec<Leaf>) -> Result<Self, ProofError> {
        leaves.sort_by(|a, b| a.path.cmp(&b.path));
        for pair in leaves.windows(2) {
            if pair[0].path == pair[1].path {
                return Err(ProofError::DuplicateField(pair[0].path.clone()));
            }
        }
        Ok(Self {
            leaves,
            levels: None,
        })
    }

    /// Create and generate a tree in one go
    pub fn build(leaves: Vec<Leaf>) -> Result<Self, ProofError> {
        let mut tree = Self::new(leaves)?;
        tree.generate();
        Ok(tree)
    }

    /// Hash the tree bottom up.
    ///
    /// Calling this again on unchanged leaves rebuilds the same levels.
    pub fn generate(&mut self) {
        let mut levels = Vec::new();
        let mut current: Vec<Hash> = self.leaves.iter().map(Leaf::hash).collect();
        while current.len() > 1 {
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_node(left, right),
                    [odd] => *odd,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels.push(current);
        self.levels = Some(levels);
    }

    pub fn is_generated(&self) -> bool {
        self.levels.is_some()
    }

    /// Root of the generated tree
    pub fn root_hash(&self) -> Result<Hash, ProofError> {
        let levels = self.levels.as_ref().ok_or(ProofError::NotGenerated)?;
        Ok(levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(empty_root))
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn leaf(&self, path: &str) -> Option<&Leaf> {
        self.position(path).map(|i| &self.leaves[i])
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.leaves
            .binary_search_by(|leaf| leaf.path.as_str().cmp(path))
            .ok()
    }

    /// Produce an inclusion proof for each requested path.
    ///
    /// Fails with [`ProofError::FieldNotFound`] on the first path that has no
    /// leaf in the tree.
    pub fn create_proofs<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<Proof>, ProofError> {
        let levels = self.levels.as_ref().ok_or(ProofError::NotGenerated)?;
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let index = self
                    .position(path)
                    .ok_or_else(|| ProofError::FieldNotFound(path.to_string()))?;
                let leaf = &self.leaves[index];
                Ok(Proof {
                    field: leaf.path.clone(),
                    value: leaf.value.clone(),
                    salt: leaf.salt,
                    hashes: sibling_path(levels, index),
                })
            })
            .collect()
    }
}

fn sibling_path(levels: &[Vec<Hash>], mut index: usize) -> Vec<ProofStep> {
    let mut steps = Vec::new();
    // the last level is the root and has no sibling
    for level in &levels[..levels.len().saturating_sub(1)] {
        let sibling = index ^ 1;
        if sibling < level.len() {
            let side = if index % 2 == 0 { Side::Right } else { Side::Left };
            steps.push(ProofStep {
                hash: level[sibling],
                side,
            });
        }
        index /= 2;
    }
    steps
}

use serde::{Deserialize, Serialize};

use super::Did;

/// Read and read-write participants of a document
///
/// Both lists keep insertion order and hold no duplicates. A participant with
/// read-write access is never listed as read-only as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorsAccess {
    read: Vec<Did>,
    read_write: Vec<Did>,
}

impl CollaboratorsAccess {
    pub fn new(read: Vec<Did>, read_write: Vec<Did>) -> Self {
        let read_write = dedupe(read_write);
        let read = dedupe(read)
            .into_iter()
            .filter(|did| !read_write.contains(did))
            .collect();
        Self { read, read_write }
    }

    pub fn read(&self) -> &[Did] {
        &self.read
    }

    pub fn read_write(&self) -> &[Did] {
        &self.read_write
    }

    /// Every participant, read-write first
    pub fn all(&self) -> Vec<Did> {
        self.read_write
            .iter()
            .chain(self.read.iter())
            .copied()
            .collect()
    }

    pub fn contains(&self, did: &Did) -> bool {
        self.read_write.contains(did) || self.read.contains(did)
    }

    pub fn can_write(&self, did: &Did) -> bool {
        self.read_write.contains(did)
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.read_write.is_empty()
    }

    /// Union of two access lists.
    ///
    /// Existing participants keep their position; a read-only participant
    /// granted read-write access by `other` is promoted.
    pub fn merge(&self, other: &CollaboratorsAccess) -> Self {
        let read_write = self
            .read_write
            .iter()
            .chain(other.read_write.iter())
            .copied()
            .collect();
        let read = self.read.iter().chain(other.read.iter()).copied().collect();
        Self::new(read, read_write)
    }
}

fn dedupe(dids: Vec<Did>) -> Vec<Did> {
    let mut seen = Vec::with_capacity(dids.len());
    for did in dids {
        if !seen.contains(&did) {
            seen.push(did);
        }
    }
    seen
}

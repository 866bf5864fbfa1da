use serde::{Deserialize, Serialize};

use super::{Did, DocumentError, RoleKey, ID_SIZE};
use crate::crypto::sha256;

impl RoleKey {
    /// Derive a role key from user input.
    ///
    /// A 32-byte hex string is used as is, anything else is hashed with
    /// SHA-256. Empty keys are rejected.
    pub fn derive(key: &str) -> Result<Self, DocumentError> {
        if key.is_empty() {
            return Err(DocumentError::EmptyRoleKey);
        }

        let stripped = key.strip_prefix("0x").unwrap_or(key);
        if stripped.len() == ID_SIZE * 2 {
            if let Ok(parsed) = RoleKey::from_hex(stripped) {
                return Ok(parsed);
            }
        }

        Ok(RoleKey::from(sha256(key.as_bytes())))
    }
}

/// A named group of participants that transition rules refer to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub key: RoleKey,
    pub collaborators: Vec<Did>,
}

impl Role {
    pub fn new(key: RoleKey, collaborators: Vec<Did>) -> Self {
        Self { key, collaborators }
    }

    /// A role under a random key, as created for default collaborator rules
    pub fn random(collaborators: Vec<Did>) -> Self {
        Self::new(RoleKey::random(), collaborators)
    }

    pub fn contains(&self, did: &Did) -> bool {
        self.collaborators.contains(did)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_derive_hex_key_verbatim() {
        let key = RoleKey::random();
        assert_eq!(RoleKey::derive(&key.to_string()).unwrap(), key);
        assert_eq!(RoleKey::derive(&key.to_hex()).unwrap(), key);
    }

    #[test]
    fn test_derive_hashes_other_keys() {
        let derived = RoleKey::derive("auditors").unwrap();
        assert_eq!(derived, RoleKey::from(sha256(b"auditors")));
        // 64 characters that are not hex fall back to hashing
        let not_hex = "z".repeat(64);
        assert_eq!(
            RoleKey::derive(&not_hex).unwrap(),
            RoleKey::from(sha256(not_hex.as_bytes()))
        );
    }

    #[test]
    fn test_derive_empty_key() {
        assert!(matches!(
            RoleKey::derive(""),
            Err(DocumentError::EmptyRoleKey)
        ));
    }
}

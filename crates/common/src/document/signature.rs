use serde::{Deserialize, Serialize};

use super::Did;
use crate::crypto::{consensus_signature_payload, PublicKey, SecretKey, Signature};
use crate::proofs::Hash;

/// A collaborator's signature over a document's signing root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSignature {
    pub signer: Did,
    pub public_key: PublicKey,
    pub signature: Signature,
    /// Whether the signer validated the transition from the previous version
    pub transition_validated: bool,
}

impl DocumentSignature {
    /// Sign the consensus payload for `signing_root`
    pub fn sign(signer: Did, key: &SecretKey, signing_root: &Hash, transition_validated: bool) -> Self {
        let payload = consensus_signature_payload(signing_root, transition_validated);
        Self {
            signer,
            public_key: key.public(),
            signature: key.sign(&payload),
            transition_validated,
        }
    }

    /// The exact bytes this signature is expected to cover
    pub fn payload(&self, signing_root: &Hash) -> Vec<u8> {
        consensus_signature_payload(signing_root, self.transition_validated)
    }

    /// Check the signature cryptographically, without any identity checks
    pub fn verify(&self, signing_root: &Hash) -> bool {
        self.public_key
            .verify(&self.payload(signing_root), &self.signature)
            .is_ok()
    }
}

/// Back reference to a token minted over a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nft {
    pub registry: [u8; 20],
    pub token_id: [u8; 32],
}

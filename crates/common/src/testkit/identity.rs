use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;

use crate::anchor::{IdentityError, IdentityService, KeyInfo, KeyPurpose};
use crate::crypto::{PublicKey, Signature};
use crate::document::Did;

/// In-memory identity registry
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityService {
    keys: Arc<RwLock<HashMap<Did, Vec<KeyInfo>>>>,
}

impl MemoryIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, did: Did, info: KeyInfo) {
        let mut keys = self.keys.write();
        let entry = keys.entry(did).or_default();
        entry.retain(|existing| existing.key != info.key);
        entry.push(info);
    }

    pub fn register_signing_key(&self, did: Did, key: PublicKey) {
        self.register(did, KeyInfo::new(key, vec![KeyPurpose::Signing]));
    }

    pub fn revoke(&self, did: &Did, key: &PublicKey, at: OffsetDateTime) {
        if let Some(infos) = self.keys.write().get_mut(did) {
            for info in infos.iter_mut().filter(|info| info.key == *key) {
                info.revoked_at = Some(at);
            }
        }
    }
}

#[async_trait]
impl IdentityService for MemoryIdentityService {
    async fn validate_signature(
        &self,
        signer: &Did,
        public_key: &PublicKey,
        signature: &Signature,
        message: &[u8],
    ) -> Result<(), IdentityError> {
        self.lookup_key(signer, public_key).await?;
        public_key
            .verify(message, signature)
            .map_err(|e| IdentityError::InvalidSignature(e.to_string()))
    }

    async fn lookup_key(&self, signer: &Did, key_id: &PublicKey) -> Result<KeyInfo, IdentityError> {
        let keys = self.keys.read();
        let infos = keys
            .get(signer)
            .ok_or(IdentityError::UnknownIdentity(*signer))?;
        infos
            .iter()
            .find(|info| info.key == *key_id)
            .cloned()
            .ok_or(IdentityError::KeyNotFound {
                did: *signer,
                key: *key_id,
            })
    }
}

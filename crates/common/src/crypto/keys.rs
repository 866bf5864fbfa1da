use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

const PEM_TAG: &str = "PRIVATE KEY";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key length: expected {expected} bytes, got {found}")]
    InvalidLength { expected: usize, found: usize },
    #[error("invalid key hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid PEM: {0}")]
    Pem(#[from] pem::PemError),
    #[error("unexpected PEM tag {0}, expected PRIVATE KEY")]
    PemTag(String),
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], KeyError> {
    bytes.try_into().map_err(|_| KeyError::InvalidLength {
        expected: N,
        found: bytes.len(),
    })
}

fn decode_hex<const N: usize>(hex: &str) -> Result<[u8; N], KeyError> {
    let mut buff = [0; N];
    hex::decode_to_slice(hex.strip_prefix("0x").unwrap_or(hex), &mut buff)?;
    Ok(buff)
}

/// Public half of a collaborator signing key.
///
/// Kept as raw bytes: signatures embedded in a document carry the key they
/// claim, and a malformed point only fails once it is used to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl From<[u8; PUBLIC_KEY_SIZE]> for PublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        fixed(bytes).map(Self)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl PublicKey {
    /// Parse plain or `0x` prefixed hex
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        decode_hex(hex).map(Self)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Strict Ed25519 verification of `signature` over `msg`
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        VerifyingKey::from_bytes(&self.0)?.verify_strict(msg, signature)
    }
}

/// Account signing key.
///
/// Nodes load it from a PEM file (tag `PRIVATE KEY`, 32 raw bytes) at
/// startup. `Debug` only shows the public half.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey(SigningKey);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&self.public()).finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&secret))
    }
}

impl SecretKey {
    pub fn generate() -> Self {
        Self::from(rand::random::<[u8; PRIVATE_KEY_SIZE]>())
    }

    /// Parse plain or `0x` prefixed hex
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        decode_hex(hex).map(Self::from)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PEM_TAG, self.to_bytes()))
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str)?;
        if pem.tag() != PEM_TAG {
            return Err(KeyError::PemTag(pem.tag().to_string()));
        }
        fixed(pem.contents()).map(Self::from)
    }

    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

/// Size of every fixed-length identifier in a document
pub const ID_SIZE: usize = 32;

/// Declares a 32-byte identifier newtype with hex formatting and parsing
macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; ID_SIZE]);

        impl $name {
            /// Draw a fresh random identifier
            pub fn random() -> Self {
                Self(rand::random())
            }

            pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex, with or without a `0x` prefix
            pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
                let hex = hex.strip_prefix("0x").unwrap_or(hex);
                let mut buff = [0u8; ID_SIZE];
                hex::decode_to_slice(hex, &mut buff)?;
                Ok(Self(buff))
            }
        }

        impl From<[u8; ID_SIZE]> for $name {
            fn from(bytes: [u8; ID_SIZE]) -> Self {
                Self(bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..8])
            }
        }
    };
}

bytes32_id!(
    /// Decentralized identifier of a participant (account id)
    Did
);

bytes32_id!(
    /// Identifier of a document or of one of its versions
    ///
    /// The first version of a document uses its identifier as its version.
    VersionId
);

bytes32_id!(
    /// Key of a [`Role`](super::Role)
    RoleKey
);

bytes32_id!(
    /// Key of a [`TransitionRule`](super::TransitionRule)
    RuleKey
);

bytes32_id!(
    /// Content derived key of an [`Attribute`](super::Attribute), `sha256(label)`
    AttrKey
);

impl From<PublicKey> for Did {
    fn from(key: PublicKey) -> Self {
        Did(key.to_bytes())
    }
}

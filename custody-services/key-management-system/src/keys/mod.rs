// std
use std::fmt::{Display, Formatter};
// crates
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
// internal

pub mod ed25519;
pub mod pkcs1;

/// Content-addressed key identifier: hex encoded SHA-256 of the encoded
/// public key. Same shape for every backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn from_public_key(encoded: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(encoded)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for KeyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for KeyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque algorithm tag. Selects a backend at creation time and is echoed
/// back in every public key and signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Algorithm(String);

impl Algorithm {
    pub const ED25519: &'static str = "ed25519";
    pub const RSA: &'static str = "rsa";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn ed25519() -> Self {
        Self::new(Self::ED25519)
    }

    pub fn rsa() -> Self {
        Self::new(Self::RSA)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public projection of a key. The only form of key material that crosses a
/// transport boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub key_id: KeyId,
    pub algorithm: Algorithm,
    pub public_key: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureRequest {
    pub key_id: KeyId,
    pub content: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub key_id: KeyId,
    pub algorithm: Algorithm,
    pub signature: Bytes,
}

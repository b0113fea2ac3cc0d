//! Request and reply bodies shared by the HTTP and RPC transports.
//!
//! Nested messages are optional, so a body can omit them entirely; the
//! conversions into domain types reject what is required but missing. Byte
//! fields travel as lowercase hex strings in JSON and as raw bytes on the
//! binary RPC wire.

// crates
use key_management_system as kms;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
// internal

/// Largest content a signature request may carry, on every transport.
pub const MAX_CONTENT_LEN: usize = 1 << 20;
/// Room left around the content for identifiers and framing.
pub const ENVELOPE_LEN: usize = 4 << 10;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyId {
    #[serde(default)]
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Algorithm {
    #[serde(default)]
    pub algorithm: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyInfo {
    #[serde(rename = "keyID", default)]
    pub key_id: Option<KeyId>,
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublicKey {
    #[serde(rename = "keyInfo", default)]
    pub key_info: Option<KeyInfo>,
    #[serde(rename = "publicKey", with = "bytes_field", default)]
    #[schema(value_type = String)]
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SignatureRequest {
    #[serde(rename = "keyID", default)]
    pub key_id: Option<KeyId>,
    #[serde(with = "bytes_field", default)]
    #[schema(value_type = String)]
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Signature {
    #[serde(rename = "keyInfo", default)]
    pub key_info: Option<KeyInfo>,
    #[serde(with = "bytes_field", default)]
    #[schema(value_type = String)]
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Void {}

mod bytes_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            hex::serde::serialize(bytes, serializer)
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            hex::serde::deserialize(deserializer)
        } else {
            Vec::deserialize(deserializer)
        }
    }
}

impl KeyInfo {
    fn new(key_id: kms::KeyId, algorithm: kms::Algorithm) -> Self {
        Self {
            key_id: Some(key_id.into()),
            algorithm: Some(algorithm.into()),
        }
    }
}

impl From<kms::KeyId> for KeyId {
    fn from(value: kms::KeyId) -> Self {
        Self {
            id: value.as_str().to_owned(),
        }
    }
}

impl From<kms::Algorithm> for Algorithm {
    fn from(value: kms::Algorithm) -> Self {
        Self {
            algorithm: value.as_str().to_owned(),
        }
    }
}

impl From<Algorithm> for kms::Algorithm {
    fn from(value: Algorithm) -> Self {
        Self::new(value.algorithm)
    }
}

impl TryFrom<KeyId> for kms::KeyId {
    type Error = kms::KmsError;

    fn try_from(value: KeyId) -> Result<Self, Self::Error> {
        if value.id.is_empty() {
            return Err(kms::KmsError::MalformedRequest(
                "key identifier is empty".to_owned(),
            ));
        }
        Ok(Self::from(value.id))
    }
}

impl From<kms::PublicKey> for PublicKey {
    fn from(value: kms::PublicKey) -> Self {
        Self {
            key_info: Some(KeyInfo::new(value.key_id, value.algorithm)),
            public_key: value.public_key.to_vec(),
        }
    }
}

impl From<kms::Signature> for Signature {
    fn from(value: kms::Signature) -> Self {
        Self {
            key_info: Some(KeyInfo::new(value.key_id, value.algorithm)),
            content: value.signature.to_vec(),
        }
    }
}

impl TryFrom<SignatureRequest> for kms::SignatureRequest {
    type Error = kms::KmsError;

    fn try_from(value: SignatureRequest) -> Result<Self, Self::Error> {
        let key_id = value.key_id.ok_or_else(|| {
            kms::KmsError::MalformedRequest("signature request carries no key identifier".to_owned())
        })?;
        if value.content.len() > MAX_CONTENT_LEN {
            return Err(kms::KmsError::MalformedRequest(format!(
                "content of {} bytes exceeds the {MAX_CONTENT_LEN} byte limit",
                value.content.len()
            )));
        }
        Ok(Self {
            key_id: key_id.try_into()?,
            content: value.content.into(),
        })
    }
}

use crate::backends::hsm::module::ModuleError;
use crate::keys::{Algorithm, KeyId};
use crate::registry::RegistryError;

/// Errors surfaced by signing backends and the [`crate::BackendIndex`].
///
/// Transports map these onto their own status codes, so variants describe
/// what the caller did wrong (or didn't) rather than where the fault happened.
#[derive(thiserror::Error, Debug)]
pub enum KmsError {
    #[error("Invalid keyID: key {0} not found")]
    InvalidKeyId(KeyId),
    #[error("Algorithm {0} not supported")]
    UnsupportedAlgorithm(Algorithm),
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Signing failed for keyID {key_id} after {attempts} attempts")]
    SigningFailed { key_id: KeyId, attempts: usize },
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

#[derive(thiserror::Error, Debug)]
pub enum InternalError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Hardware module failure: {0}")]
    Module(#[from] ModuleError),
    #[error("Random number generator failure: {0}")]
    Rng(#[from] rand::Error),
    #[error("Key encoding failed: {0}")]
    Encoding(String),
    #[error("Blocking task failed: {0}")]
    Task(String),
}

impl From<RegistryError> for KmsError {
    fn from(value: RegistryError) -> Self {
        Self::Internal(value.into())
    }
}

impl From<ModuleError> for KmsError {
    fn from(value: ModuleError) -> Self {
        Self::Internal(value.into())
    }
}

impl From<rand::Error> for KmsError {
    fn from(value: rand::Error) -> Self {
        Self::Internal(value.into())
    }
}

impl KmsError {
    pub fn encoding(error: impl std::fmt::Display) -> Self {
        Self::Internal(InternalError::Encoding(error.to_string()))
    }
}

pub mod hsm;
pub mod software;

use crate::{
    keys::{Algorithm, KeyId, PublicKey, Signature},
    KmsError,
};

/// A capability bound to a single key. It can only produce signatures.
pub trait Signer: Send {
    fn sign(&self, content: &[u8]) -> Result<Signature, KmsError>;
}

/// Contract every key custody backend implements. Backends are shared across
/// request handlers, so every method takes `&self` and implementors guard
/// their own state.
pub trait SigningBackend: Send + Sync {
    /// Tag this backend registers under unless told otherwise.
    fn algorithm(&self) -> Algorithm;

    /// Generates and registers a fresh key pair. Private material stays inside
    /// the backend.
    fn create_key(&self) -> Result<PublicKey, KmsError>;

    fn delete_key(&self, key_id: &KeyId) -> Result<(), KmsError>;

    fn key_info(&self, key_id: &KeyId) -> Result<PublicKey, KmsError>;

    /// Fails with [`KmsError::InvalidKeyId`] if the key is unknown. The key is
    /// looked up again for every signature, so a signer outliving a delete
    /// stops working.
    fn signer(&self, key_id: &KeyId) -> Result<Box<dyn Signer + '_>, KmsError>;
}

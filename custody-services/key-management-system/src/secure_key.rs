use bytes::Bytes;

use crate::{keys::Algorithm, KmsError};

/// A private key held in process memory. Implementors must zeroize their
/// secret on drop.
pub trait SecuredKey {
    fn sign(&self, data: &[u8]) -> Result<Bytes, KmsError>;
    fn as_pk(&self) -> Bytes;
}

/// Key families the software backend can mint.
pub trait SoftwareKey: SecuredKey + Send + Sync + 'static {
    fn algorithm() -> Algorithm;
    fn generate() -> Self;
}

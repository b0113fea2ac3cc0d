use bytes::Bytes;
use ed25519_dalek::{Signer as _, Verifier as _};
use rand::rngs::OsRng;

use crate::{
    keys::Algorithm,
    secure_key::{SecuredKey, SoftwareKey},
    KmsError,
};

/// The wrapped [`ed25519_dalek::SigningKey`] zeroizes itself on drop.
pub struct Ed25519Key(ed25519_dalek::SigningKey);

impl SecuredKey for Ed25519Key {
    fn sign(&self, data: &[u8]) -> Result<Bytes, KmsError> {
        Ok(Bytes::copy_from_slice(&self.0.sign(data).to_bytes()))
    }

    fn as_pk(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.verifying_key().as_bytes())
    }
}

impl SoftwareKey for Ed25519Key {
    fn algorithm() -> Algorithm {
        Algorithm::ed25519()
    }

    fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut OsRng))
    }
}

/// Standard ed25519 verification of `signature` over `content`.
pub fn verify(public_key: &[u8], content: &[u8], signature: &[u8]) -> bool {
    let Ok(public_key) = <[u8; ed25519_dalek::PUBLIC_KEY_LENGTH]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(&public_key) else {
        return false;
    };
    ed25519_dalek::Signature::from_slice(signature)
        .is_ok_and(|signature| verifying_key.verify(content, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = Ed25519Key::generate();
        let signature = key.sign(b"hello").unwrap();
        assert!(verify(&key.as_pk(), b"hello", &signature));
        assert!(!verify(&key.as_pk(), b"hellx", &signature));
    }
}

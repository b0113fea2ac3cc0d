use tracing::{debug, info};

use crate::{
    backends::{Signer, SigningBackend},
    keys::{ed25519::Ed25519Key, Algorithm, KeyId, PublicKey, Signature},
    registry::{KeyRecord, KeyRegistry},
    secure_key::SoftwareKey,
    KmsError,
};

/// Keeps private keys in process memory. Generic over the key family so the
/// same registry and signer plumbing serves any [`SoftwareKey`].
pub struct SoftwareBackend<K = Ed25519Key> {
    registry: KeyRegistry<K>,
}

impl<K: SoftwareKey> Default for SoftwareBackend<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: SoftwareKey> SoftwareBackend<K> {
    pub fn new() -> Self {
        Self {
            registry: KeyRegistry::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl<K: SoftwareKey> SigningBackend for SoftwareBackend<K> {
    fn algorithm(&self) -> Algorithm {
        K::algorithm()
    }

    fn create_key(&self) -> Result<PublicKey, KmsError> {
        let key = K::generate();
        let public_key = key.as_pk();
        let record = KeyRecord {
            key_id: KeyId::from_public_key(&public_key),
            algorithm: K::algorithm(),
            public_key,
            private: key,
        };
        let public = self.registry.add(record)?;
        info!(key_id = %public.key_id, algorithm = %public.algorithm, keys = self.len(), "Created software key");
        Ok(public)
    }

    fn delete_key(&self, key_id: &KeyId) -> Result<(), KmsError> {
        // Dropping the record zeroizes the secret.
        self.registry.delete(key_id)?;
        info!(%key_id, keys = self.len(), "Deleted software key");
        Ok(())
    }

    fn key_info(&self, key_id: &KeyId) -> Result<PublicKey, KmsError> {
        debug!(%key_id, "Software key info");
        self.registry.info(key_id)
    }

    fn signer(&self, key_id: &KeyId) -> Result<Box<dyn Signer + '_>, KmsError> {
        if !self.registry.contains(key_id) {
            return Err(KmsError::InvalidKeyId(key_id.clone()));
        }
        Ok(Box::new(SoftwareSigner {
            registry: &self.registry,
            key_id: key_id.clone(),
        }))
    }
}

struct SoftwareSigner<'a, K> {
    registry: &'a KeyRegistry<K>,
    key_id: KeyId,
}

impl<K: SoftwareKey> Signer for SoftwareSigner<'_, K> {
    fn sign(&self, content: &[u8]) -> Result<Signature, KmsError> {
        self.registry.with_key(&self.key_id, |record| {
            debug!(key_id = %record.key_id, "Signing with software key");
            Ok(Signature {
                key_id: record.key_id.clone(),
                algorithm: record.algorithm.clone(),
                signature: record.private.sign(content)?,
            })
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ed25519;

    #[test]
    fn create_then_info() {
        let backend = SoftwareBackend::<Ed25519Key>::new();
        let public = backend.create_key().unwrap();
        assert_eq!(public.algorithm, Algorithm::ed25519());
        assert_eq!(public.key_id, KeyId::from_public_key(&public.public_key));
        assert_eq!(backend.key_info(&public.key_id).unwrap(), public);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn hello_scenario() {
        let backend = SoftwareBackend::<Ed25519Key>::new();
        let public = backend.create_key().unwrap();
        let signature = backend
            .signer(&public.key_id)
            .unwrap()
            .sign(b"hello")
            .unwrap();
        assert_eq!(signature.key_id, public.key_id);
        assert_eq!(signature.algorithm, Algorithm::ed25519());
        assert!(ed25519::verify(&public.public_key, b"hello", &signature.signature));
        assert!(!ed25519::verify(&public.public_key, b"hellx", &signature.signature));
    }

    #[test]
    fn signs_empty_and_large_content() {
        let backend = SoftwareBackend::<Ed25519Key>::new();
        let public = backend.create_key().unwrap();
        let signer = backend.signer(&public.key_id).unwrap();
        let large = vec![0xa5u8; 1 << 20];
        for content in [&[][..], &large[..]] {
            let signature = signer.sign(content).unwrap();
            assert!(ed25519::verify(&public.public_key, content, &signature.signature));
        }
        let mut altered = large.clone();
        altered[4096] ^= 1;
        let signature = signer.sign(&large).unwrap();
        assert!(!ed25519::verify(&public.public_key, &altered, &signature.signature));
    }

    #[test]
    fn deleted_key_is_gone() {
        let backend = SoftwareBackend::<Ed25519Key>::new();
        let public = backend.create_key().unwrap();
        let signer = backend.signer(&public.key_id).unwrap();
        backend.delete_key(&public.key_id).unwrap();

        assert!(matches!(
            backend.key_info(&public.key_id),
            Err(KmsError::InvalidKeyId(_))
        ));
        assert!(matches!(
            backend.signer(&public.key_id),
            Err(KmsError::InvalidKeyId(_))
        ));
        assert!(matches!(signer.sign(b"late"), Err(KmsError::InvalidKeyId(_))));
        assert!(matches!(
            backend.delete_key(&public.key_id),
            Err(KmsError::InvalidKeyId(_))
        ));
        assert!(backend.is_empty());
    }
}

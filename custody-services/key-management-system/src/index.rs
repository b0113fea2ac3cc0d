// std
use std::{collections::BTreeMap, sync::Arc};
// crates
use tracing::{debug, info};
// internal
use crate::{
    backends::SigningBackend,
    keys::{Algorithm, KeyId, PublicKey, Signature, SignatureRequest},
    KmsError,
};

/// Routes requests to the backend that owns a key.
///
/// Creation is routed by algorithm tag. Everything else only carries a key
/// identifier, so the index asks each backend in turn until one knows it.
/// The table is fixed once built.
pub struct BackendIndex {
    backends: BTreeMap<Algorithm, Arc<dyn SigningBackend>>,
}

#[derive(Default)]
pub struct BackendIndexBuilder {
    backends: BTreeMap<Algorithm, Arc<dyn SigningBackend>>,
}

impl BackendIndexBuilder {
    /// Registers `backend` under its own algorithm tag.
    pub fn with_backend(self, backend: Arc<dyn SigningBackend>) -> Self {
        let algorithm = backend.algorithm();
        self.with_backend_for(algorithm, backend)
    }

    /// Registers `backend` under `algorithm`. A later registration under the
    /// same tag replaces the earlier one.
    pub fn with_backend_for(mut self, algorithm: Algorithm, backend: Arc<dyn SigningBackend>) -> Self {
        self.backends.insert(algorithm, backend);
        self
    }

    pub fn build(self) -> BackendIndex {
        BackendIndex {
            backends: self.backends,
        }
    }
}

impl BackendIndex {
    pub fn builder() -> BackendIndexBuilder {
        BackendIndexBuilder::default()
    }

    pub fn algorithms(&self) -> impl Iterator<Item = &Algorithm> {
        self.backends.keys()
    }

    pub fn create_key(&self, algorithm: &Algorithm) -> Result<PublicKey, KmsError> {
        let backend = self
            .backends
            .get(algorithm)
            .ok_or_else(|| KmsError::UnsupportedAlgorithm(algorithm.clone()))?;
        let public = backend.create_key()?;
        info!(key_id = %public.key_id, %algorithm, "Key created");
        Ok(public)
    }

    /// Finds the backend holding `key_id`. Backends that do not know the key
    /// are skipped; any other failure ends the search.
    pub fn find_key_by_id(
        &self,
        key_id: &KeyId,
    ) -> Result<(&dyn SigningBackend, PublicKey), KmsError> {
        for (algorithm, backend) in &self.backends {
            match backend.key_info(key_id) {
                Ok(public) => {
                    debug!(%key_id, %algorithm, "Resolved key owner");
                    return Ok((backend.as_ref(), public));
                }
                Err(KmsError::InvalidKeyId(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(KmsError::InvalidKeyId(key_id.clone()))
    }

    pub fn delete_key(&self, key_id: &KeyId) -> Result<(), KmsError> {
        let (backend, _) = self.find_key_by_id(key_id)?;
        backend.delete_key(key_id)
    }

    pub fn key_info(&self, key_id: &KeyId) -> Result<PublicKey, KmsError> {
        self.find_key_by_id(key_id).map(|(_, public)| public)
    }

    pub fn sign(&self, request: &SignatureRequest) -> Result<Signature, KmsError> {
        let (backend, _) = self.find_key_by_id(&request.key_id)?;
        backend.signer(&request.key_id)?.sign(&request.content)
    }
}

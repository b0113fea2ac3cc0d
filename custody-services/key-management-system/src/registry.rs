// std
use std::collections::{HashMap, HashSet};
// crates
use bytes::Bytes;
use parking_lot::RwLock;
// internal
use crate::{
    keys::{Algorithm, KeyId, PublicKey},
    KmsError,
};

/// One key as held by a backend. `private` is whatever the backend needs to
/// sign: raw key material for software keys, object handles for hardware
/// ones.
pub struct KeyRecord<K> {
    pub key_id: KeyId,
    pub algorithm: Algorithm,
    pub public_key: Bytes,
    pub private: K,
}

impl<K> KeyRecord<K> {
    pub fn public(&self) -> PublicKey {
        PublicKey {
            key_id: self.key_id.clone(),
            algorithm: self.algorithm.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Key {0} is already registered")]
    DuplicateKeyId(KeyId),
    #[error("Key {0} was deleted and cannot be registered again")]
    RetiredKeyId(KeyId),
}

struct RegistryState<K> {
    keys: HashMap<KeyId, KeyRecord<K>>,
    // Deleted identifiers stay reserved so they never resolve to another key.
    // The set only grows: one identifier per delete for the life of the
    // process, traded for never handing a retired identifier out again.
    retired: HashSet<KeyId>,
}

/// In-memory key store scoped to a single backend instance.
///
/// Readers ([`Self::info`], [`Self::with_key`]) run concurrently, mutations
/// take the lock exclusively. [`Self::with_key`] keeps the read lock for the
/// duration of the closure, so a delete waits for in-flight signatures.
pub struct KeyRegistry<K> {
    state: RwLock<RegistryState<K>>,
}

impl<K> Default for KeyRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyRegistry<K> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                keys: HashMap::new(),
                retired: HashSet::new(),
            }),
        }
    }

    pub fn add(&self, record: KeyRecord<K>) -> Result<PublicKey, RegistryError> {
        let mut state = self.state.write();
        if state.retired.contains(&record.key_id) {
            return Err(RegistryError::RetiredKeyId(record.key_id));
        }
        if state.keys.contains_key(&record.key_id) {
            return Err(RegistryError::DuplicateKeyId(record.key_id));
        }
        let public = record.public();
        state.keys.insert(record.key_id.clone(), record);
        Ok(public)
    }

    pub fn with_key<R>(
        &self,
        key_id: &KeyId,
        f: impl FnOnce(&KeyRecord<K>) -> R,
    ) -> Result<R, KmsError> {
        let state = self.state.read();
        let record = state
            .keys
            .get(key_id)
            .ok_or_else(|| KmsError::InvalidKeyId(key_id.clone()))?;
        Ok(f(record))
    }

    pub fn info(&self, key_id: &KeyId) -> Result<PublicKey, KmsError> {
        self.with_key(key_id, KeyRecord::public)
    }

    pub fn contains(&self, key_id: &KeyId) -> bool {
        self.state.read().keys.contains_key(key_id)
    }

    /// Removes the key and retires its identifier. The removed record is
    /// handed back so the caller can release whatever it points at.
    pub fn delete(&self, key_id: &KeyId) -> Result<KeyRecord<K>, KmsError> {
        let mut state = self.state.write();
        let record = state
            .keys
            .remove(key_id)
            .ok_or_else(|| KmsError::InvalidKeyId(key_id.clone()))?;
        state.retired.insert(key_id.clone());
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.state.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().keys.is_empty()
    }
}

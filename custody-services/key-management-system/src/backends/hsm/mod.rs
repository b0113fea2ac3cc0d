//! RSA keys held by a hardware security module.
//!
//! The module generates each key pair and keeps the private half; this
//! backend remembers object handles and the DER encoded public key. Every
//! signature coming back from the module is verified locally before it is
//! handed out, and the whole sign and verify cycle is retried a bounded
//! number of times.

pub mod module;
#[cfg(feature = "pkcs11")]
pub mod pkcs11;
pub mod soft;

use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use self::module::{Attribute, AttributeType, HardwareModule, Mechanism, ObjectHandle};
use crate::{
    backends::{Signer, SigningBackend},
    keys::{pkcs1, Algorithm, KeyId, PublicKey, Signature},
    registry::{KeyRecord, KeyRegistry},
    KmsError,
};

pub const MAX_SIGNING_ATTEMPTS: usize = 3;
const LABEL_LENGTH: usize = 32;
const RSA_PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HsmBackendSettings {
    pub modulus_bits: u64,
    /// Destroy both module objects when a key is deleted. Otherwise only the
    /// local mapping goes away and the objects stay on the token.
    pub destroy_on_delete: bool,
}

impl Default for HsmBackendSettings {
    fn default() -> Self {
        Self {
            modulus_bits: 2048,
            destroy_on_delete: false,
        }
    }
}

#[derive(Debug)]
pub struct HsmKey {
    pub private: ObjectHandle,
    pub public: ObjectHandle,
    pub label: String,
}

pub struct HsmBackend<M> {
    registry: KeyRegistry<HsmKey>,
    session: Mutex<M>,
    settings: HsmBackendSettings,
}

impl<M: HardwareModule> HsmBackend<M> {
    pub fn new(module: M, settings: HsmBackendSettings) -> Self {
        Self {
            registry: KeyRegistry::new(),
            session: Mutex::new(module),
            settings,
        }
    }

    /// Runs `f` with exclusive access to the module session.
    pub fn with_module<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.session.lock())
    }

    fn random_label() -> Result<String, KmsError> {
        let mut label = [0u8; LABEL_LENGTH];
        OsRng.try_fill_bytes(&mut label)?;
        Ok(hex::encode(label))
    }

    /// Generates a pair inside the module and reads back its public half.
    fn generate(&self, label: &str) -> Result<(HsmKey, bytes::Bytes), KmsError> {
        let public_template = [
            Attribute::Token(true),
            Attribute::Verify(true),
            Attribute::ModulusBits(self.settings.modulus_bits),
            Attribute::PublicExponent(RSA_PUBLIC_EXPONENT.to_vec()),
            Attribute::Label(label.as_bytes().to_vec()),
        ];
        let private_template = [
            Attribute::Token(true),
            Attribute::Private(true),
            Attribute::Sensitive(true),
            Attribute::Sign(true),
            Attribute::Label(label.as_bytes().to_vec()),
        ];

        let mut session = self.session.lock();
        let (public, private) = session.generate_key_pair(
            Mechanism::RsaPkcsKeyPairGen,
            &public_template,
            &private_template,
        )?;
        let key = HsmKey {
            private,
            public,
            label: label.to_owned(),
        };
        match extract_public_key(&mut *session, public) {
            Ok(encoded) => Ok((key, encoded)),
            Err(e) => {
                destroy_pair(&mut *session, &key);
                Err(e)
            }
        }
    }

    fn sign_with(&self, record: &KeyRecord<HsmKey>, content: &[u8]) -> Result<Signature, KmsError> {
        let public_key = pkcs1::decode_public_key(&record.public_key)?;
        for attempt in 1..=MAX_SIGNING_ATTEMPTS {
            let outcome = self.session.lock().sign(
                Mechanism::Sha256RsaPkcs,
                record.private.private,
                content,
            );
            match outcome {
                Ok(signature) => match pkcs1::verify_sha256(&public_key, content, &signature) {
                    Ok(()) => {
                        debug!(key_id = %record.key_id, attempt, "Signed with hardware key");
                        return Ok(Signature {
                            key_id: record.key_id.clone(),
                            algorithm: record.algorithm.clone(),
                            signature,
                        });
                    }
                    Err(e) => {
                        warn!(key_id = %record.key_id, attempt, "Module signature failed verification: {e}")
                    }
                },
                Err(e) => warn!(key_id = %record.key_id, attempt, "Module signing failed: {e}"),
            }
        }
        Err(KmsError::SigningFailed {
            key_id: record.key_id.clone(),
            attempts: MAX_SIGNING_ATTEMPTS,
        })
    }
}

fn extract_public_key<M: HardwareModule>(
    session: &mut M,
    public: ObjectHandle,
) -> Result<bytes::Bytes, KmsError> {
    let attributes = session.get_attributes(
        public,
        &[AttributeType::PublicExponent, AttributeType::Modulus],
    )?;
    let mut modulus = None;
    let mut exponent = None;
    for attribute in attributes {
        match attribute {
            Attribute::Modulus(value) => modulus = Some(value),
            Attribute::PublicExponent(value) => exponent = Some(value),
            _ => {}
        }
    }
    let (Some(modulus), Some(exponent)) = (modulus, exponent) else {
        return Err(KmsError::encoding(
            "module did not return both modulus and public exponent",
        ));
    };
    pkcs1::encode_public_key(&modulus, &exponent)
}

/// Attempts both objects even when the first one fails. Returns whether both
/// are gone.
fn destroy_pair<M: HardwareModule>(session: &mut M, key: &HsmKey) -> bool {
    let mut destroyed = true;
    for handle in [key.public, key.private] {
        if let Err(e) = session.destroy_object(handle) {
            error!(label = %key.label, "Failed to destroy module object {handle}: {e}");
            destroyed = false;
        }
    }
    destroyed
}

impl<M: HardwareModule> SigningBackend for HsmBackend<M> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::rsa()
    }

    fn create_key(&self) -> Result<PublicKey, KmsError> {
        let label = Self::random_label()?;
        let (key, public_key) = self.generate(&label)?;
        let record = KeyRecord {
            key_id: KeyId::from_public_key(&public_key),
            algorithm: Algorithm::rsa(),
            public_key,
            private: key,
        };
        let handles = (record.private.public, record.private.private);
        match self.registry.add(record) {
            Ok(public) => {
                info!(key_id = %public.key_id, %label, keys = self.registry.len(), "Created hardware key");
                Ok(public)
            }
            Err(e) => {
                let key = HsmKey {
                    public: handles.0,
                    private: handles.1,
                    label,
                };
                destroy_pair(&mut *self.session.lock(), &key);
                Err(e.into())
            }
        }
    }

    /// The mapping is removed first and the delete succeeds from then on.
    /// Objects the module refuses to destroy stay on the token and are logged
    /// with their label.
    fn delete_key(&self, key_id: &KeyId) -> Result<(), KmsError> {
        let record = self.registry.delete(key_id)?;
        let key = &record.private;
        if !self.settings.destroy_on_delete {
            info!(%key_id, label = %key.label, keys = self.registry.len(), "Deleted hardware key mapping");
        } else if destroy_pair(&mut *self.session.lock(), key) {
            info!(%key_id, label = %key.label, keys = self.registry.len(), "Deleted hardware key and destroyed its objects");
        } else {
            warn!(%key_id, label = %key.label, "Deleted hardware key mapping, module objects left on the token");
        }
        Ok(())
    }

    fn key_info(&self, key_id: &KeyId) -> Result<PublicKey, KmsError> {
        debug!(%key_id, "Hardware key info");
        self.registry.info(key_id)
    }

    fn signer(&self, key_id: &KeyId) -> Result<Box<dyn Signer + '_>, KmsError> {
        if !self.registry.contains(key_id) {
            return Err(KmsError::InvalidKeyId(key_id.clone()));
        }
        Ok(Box::new(HsmSigner {
            backend: self,
            key_id: key_id.clone(),
        }))
    }
}

struct HsmSigner<'a, M> {
    backend: &'a HsmBackend<M>,
    key_id: KeyId,
}

impl<M: HardwareModule> Signer for HsmSigner<'_, M> {
    fn sign(&self, content: &[u8]) -> Result<Signature, KmsError> {
        // The registry read lock is held across the module call, so a
        // concurrent delete waits for this signature.
        self.backend
            .registry
            .with_key(&self.key_id, |record| self.backend.sign_with(record, content))?
    }
}

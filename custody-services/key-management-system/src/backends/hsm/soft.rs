use std::collections::HashMap;

use bytes::Bytes;
use rand::rngs::OsRng;
use rsa::{traits::PublicKeyParts, BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::module::{
    find_attribute, Attribute, AttributeType, HardwareModule, Mechanism, ModuleError, ObjectHandle,
};

enum Object {
    Public {
        key: RsaPublicKey,
        label: Vec<u8>,
    },
    Private {
        key: RsaPrivateKey,
        label: Vec<u8>,
    },
}

/// In-process stand-in for a token. Keys are real RSA keys; they just live in
/// this process instead of behind a device boundary.
#[derive(Default)]
pub struct SoftModule {
    objects: HashMap<ObjectHandle, Object>,
    next_handle: u64,
}

impl SoftModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn allocate(&mut self, object: Object) -> ObjectHandle {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        self.objects.insert(handle, object);
        handle
    }
}

fn label_of(template: &[Attribute]) -> Vec<u8> {
    match find_attribute(template, AttributeType::Label) {
        Some(Attribute::Label(label)) => label.clone(),
        _ => Vec::new(),
    }
}

impl HardwareModule for SoftModule {
    fn generate_key_pair(
        &mut self,
        mechanism: Mechanism,
        public_template: &[Attribute],
        private_template: &[Attribute],
    ) -> Result<(ObjectHandle, ObjectHandle), ModuleError> {
        if mechanism != Mechanism::RsaPkcsKeyPairGen {
            return Err(ModuleError::UnsupportedMechanism(mechanism));
        }
        let Some(Attribute::ModulusBits(bits)) =
            find_attribute(public_template, AttributeType::ModulusBits)
        else {
            return Err(ModuleError::TemplateIncomplete(AttributeType::ModulusBits));
        };
        let exponent = match find_attribute(public_template, AttributeType::PublicExponent) {
            Some(Attribute::PublicExponent(exponent)) => BigUint::from_bytes_be(exponent),
            _ => BigUint::from(65537u32),
        };
        let bits = usize::try_from(*bits).map_err(|e| ModuleError::Device(e.to_string()))?;
        let private_key = RsaPrivateKey::new_with_exp(&mut OsRng, bits, &exponent)
            .map_err(|e| ModuleError::Device(e.to_string()))?;

        let public = self.allocate(Object::Public {
            key: private_key.to_public_key(),
            label: label_of(public_template),
        });
        let private = self.allocate(Object::Private {
            key: private_key,
            label: label_of(private_template),
        });
        debug!(%public, %private, bits, "Soft module generated key pair");
        Ok((public, private))
    }

    fn get_attributes(
        &mut self,
        handle: ObjectHandle,
        types: &[AttributeType],
    ) -> Result<Vec<Attribute>, ModuleError> {
        let object = self
            .objects
            .get(&handle)
            .ok_or(ModuleError::InvalidHandle(handle))?;
        // Reverse order so callers cannot rely on positional answers.
        types
            .iter()
            .rev()
            .map(|attribute_type| match (object, attribute_type) {
                (Object::Public { key, .. }, AttributeType::Modulus) => {
                    Ok(Attribute::Modulus(key.n().to_bytes_be()))
                }
                (Object::Public { key, .. }, AttributeType::PublicExponent) => {
                    Ok(Attribute::PublicExponent(key.e().to_bytes_be()))
                }
                (Object::Public { label, .. } | Object::Private { label, .. }, AttributeType::Label) => {
                    Ok(Attribute::Label(label.clone()))
                }
                _ => Err(ModuleError::AttributeUnavailable(*attribute_type)),
            })
            .collect()
    }

    fn sign(
        &mut self,
        mechanism: Mechanism,
        handle: ObjectHandle,
        data: &[u8],
    ) -> Result<Bytes, ModuleError> {
        if mechanism != Mechanism::Sha256RsaPkcs {
            return Err(ModuleError::UnsupportedMechanism(mechanism));
        }
        let Some(Object::Private { key, .. }) = self.objects.get(&handle) else {
            return Err(ModuleError::InvalidHandle(handle));
        };
        let digest = Sha256::digest(data);
        key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map(Bytes::from)
            .map_err(|e| ModuleError::Device(e.to_string()))
    }

    fn destroy_object(&mut self, handle: ObjectHandle) -> Result<(), ModuleError> {
        self.objects
            .remove(&handle)
            .map(|_| ())
            .ok_or(ModuleError::InvalidHandle(handle))
    }
}

use std::{collections::HashMap, path::Path};

use bytes::Bytes;
use cryptoki::{
    context::{CInitializeArgs, Pkcs11},
    mechanism::Mechanism as CkMechanism,
    object::{Attribute as CkAttribute, AttributeType as CkAttributeType, ObjectHandle as CkHandle},
    session::{Session, UserType},
    types::{AuthPin, Ulong},
};
use tracing::{info, warn};

use super::module::{
    Attribute, AttributeType, HardwareModule, Mechanism, ModuleError, ObjectHandle,
};

impl From<cryptoki::error::Error> for ModuleError {
    fn from(value: cryptoki::error::Error) -> Self {
        Self::Device(value.to_string())
    }
}

/// Logged-in read-write session on a PKCS#11 token. Opening acquires the
/// session, dropping it logs out; the session itself closes on drop.
pub struct Pkcs11Module {
    session: Session,
    handles: HashMap<ObjectHandle, CkHandle>,
    next_handle: u64,
    // Keeps the library loaded for as long as the session lives.
    _context: Pkcs11,
}

impl Pkcs11Module {
    /// Loads `library`, picks `slot` (or the first slot holding a token) and
    /// logs in as the normal user.
    pub fn open(library: &Path, slot: Option<u64>, pin: &str) -> Result<Self, ModuleError> {
        let context = Pkcs11::new(library)?;
        context.initialize(CInitializeArgs::OsThreads)?;
        let slot = context
            .get_slots_with_token()?
            .into_iter()
            .find(|candidate| slot.map_or(true, |id| candidate.id() == id))
            .ok_or_else(|| ModuleError::Device("no slot with a token available".to_owned()))?;
        let session = context.open_rw_session(slot)?;
        session.login(UserType::User, Some(&AuthPin::new(pin.to_owned())))?;
        info!(library = %library.display(), slot = slot.id(), "Opened PKCS#11 session");
        Ok(Self {
            session,
            handles: HashMap::new(),
            next_handle: 0,
            _context: context,
        })
    }

    fn track(&mut self, handle: CkHandle) -> ObjectHandle {
        self.next_handle += 1;
        let ours = ObjectHandle(self.next_handle);
        self.handles.insert(ours, handle);
        ours
    }

    fn resolve(&self, handle: ObjectHandle) -> Result<CkHandle, ModuleError> {
        self.handles
            .get(&handle)
            .copied()
            .ok_or(ModuleError::InvalidHandle(handle))
    }
}

impl Drop for Pkcs11Module {
    fn drop(&mut self) {
        if let Err(e) = self.session.logout() {
            warn!("PKCS#11 logout failed: {e}");
        }
    }
}

fn mechanism(mechanism: Mechanism) -> CkMechanism<'static> {
    match mechanism {
        Mechanism::RsaPkcsKeyPairGen => CkMechanism::RsaPkcsKeyPairGen,
        Mechanism::Sha256RsaPkcs => CkMechanism::Sha256RsaPkcs,
    }
}

fn to_ck_attribute(attribute: &Attribute) -> CkAttribute {
    match attribute {
        Attribute::Token(value) => CkAttribute::Token(*value),
        Attribute::Private(value) => CkAttribute::Private(*value),
        Attribute::Sensitive(value) => CkAttribute::Sensitive(*value),
        Attribute::Sign(value) => CkAttribute::Sign(*value),
        Attribute::Verify(value) => CkAttribute::Verify(*value),
        Attribute::Label(label) => CkAttribute::Label(label.clone()),
        Attribute::ModulusBits(bits) => CkAttribute::ModulusBits(Ulong::from(*bits)),
        Attribute::Modulus(modulus) => CkAttribute::Modulus(modulus.clone()),
        Attribute::PublicExponent(exponent) => CkAttribute::PublicExponent(exponent.clone()),
    }
}

fn to_ck_attribute_type(attribute_type: AttributeType) -> CkAttributeType {
    match attribute_type {
        AttributeType::Token => CkAttributeType::Token,
        AttributeType::Private => CkAttributeType::Private,
        AttributeType::Sensitive => CkAttributeType::Sensitive,
        AttributeType::Sign => CkAttributeType::Sign,
        AttributeType::Verify => CkAttributeType::Verify,
        AttributeType::Label => CkAttributeType::Label,
        AttributeType::ModulusBits => CkAttributeType::ModulusBits,
        AttributeType::Modulus => CkAttributeType::Modulus,
        AttributeType::PublicExponent => CkAttributeType::PublicExponent,
    }
}

fn from_ck_attribute(attribute: CkAttribute) -> Option<Attribute> {
    Some(match attribute {
        CkAttribute::Token(value) => Attribute::Token(value),
        CkAttribute::Private(value) => Attribute::Private(value),
        CkAttribute::Sensitive(value) => Attribute::Sensitive(value),
        CkAttribute::Sign(value) => Attribute::Sign(value),
        CkAttribute::Verify(value) => Attribute::Verify(value),
        CkAttribute::Label(label) => Attribute::Label(label),
        CkAttribute::Modulus(modulus) => Attribute::Modulus(modulus),
        CkAttribute::PublicExponent(exponent) => Attribute::PublicExponent(exponent),
        _ => return None,
    })
}

impl HardwareModule for Pkcs11Module {
    fn generate_key_pair(
        &mut self,
        mechanism_type: Mechanism,
        public_template: &[Attribute],
        private_template: &[Attribute],
    ) -> Result<(ObjectHandle, ObjectHandle), ModuleError> {
        let public_template: Vec<_> = public_template.iter().map(to_ck_attribute).collect();
        let private_template: Vec<_> = private_template.iter().map(to_ck_attribute).collect();
        let (public, private) = self.session.generate_key_pair(
            &mechanism(mechanism_type),
            &public_template,
            &private_template,
        )?;
        Ok((self.track(public), self.track(private)))
    }

    fn get_attributes(
        &mut self,
        handle: ObjectHandle,
        types: &[AttributeType],
    ) -> Result<Vec<Attribute>, ModuleError> {
        let ck_types: Vec<_> = types.iter().copied().map(to_ck_attribute_type).collect();
        let attributes = self.session.get_attributes(self.resolve(handle)?, &ck_types)?;
        Ok(attributes.into_iter().filter_map(from_ck_attribute).collect())
    }

    fn sign(
        &mut self,
        mechanism_type: Mechanism,
        handle: ObjectHandle,
        data: &[u8],
    ) -> Result<Bytes, ModuleError> {
        let signature = self
            .session
            .sign(&mechanism(mechanism_type), self.resolve(handle)?, data)?;
        Ok(Bytes::from(signature))
    }

    fn destroy_object(&mut self, handle: ObjectHandle) -> Result<(), ModuleError> {
        self.session.destroy_object(self.resolve(handle)?)?;
        self.handles.remove(&handle);
        Ok(())
    }
}

//! Session-level view of a hardware security module, shaped after PKCS#11:
//! objects are addressed by opaque handles and keys are described by
//! attribute templates.

use std::fmt::{Display, Formatter};

use bytes::Bytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

impl Display for ObjectHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mechanism {
    RsaPkcsKeyPairGen,
    Sha256RsaPkcs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Token,
    Private,
    Sensitive,
    Sign,
    Verify,
    Label,
    ModulusBits,
    Modulus,
    PublicExponent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attribute {
    Token(bool),
    Private(bool),
    Sensitive(bool),
    Sign(bool),
    Verify(bool),
    Label(Vec<u8>),
    ModulusBits(u64),
    /// Big-endian.
    Modulus(Vec<u8>),
    /// Big-endian.
    PublicExponent(Vec<u8>),
}

impl Attribute {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Token(_) => AttributeType::Token,
            Self::Private(_) => AttributeType::Private,
            Self::Sensitive(_) => AttributeType::Sensitive,
            Self::Sign(_) => AttributeType::Sign,
            Self::Verify(_) => AttributeType::Verify,
            Self::Label(_) => AttributeType::Label,
            Self::ModulusBits(_) => AttributeType::ModulusBits,
            Self::Modulus(_) => AttributeType::Modulus,
            Self::PublicExponent(_) => AttributeType::PublicExponent,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ModuleError {
    #[error("Mechanism {0:?} is not supported by the module")]
    UnsupportedMechanism(Mechanism),
    #[error("Object handle {0} does not exist")]
    InvalidHandle(ObjectHandle),
    #[error("Template is missing {0:?}")]
    TemplateIncomplete(AttributeType),
    #[error("Attribute {0:?} is not available on the object")]
    AttributeUnavailable(AttributeType),
    #[error("Device error: {0}")]
    Device(String),
}

/// One open, logged-in session on a hardware module. Implementors are driven
/// from a single thread at a time; the backend serializes access.
pub trait HardwareModule: Send {
    /// Returns `(public, private)` handles.
    fn generate_key_pair(
        &mut self,
        mechanism: Mechanism,
        public_template: &[Attribute],
        private_template: &[Attribute],
    ) -> Result<(ObjectHandle, ObjectHandle), ModuleError>;

    /// Attributes come back in whatever order the module chooses.
    fn get_attributes(
        &mut self,
        handle: ObjectHandle,
        types: &[AttributeType],
    ) -> Result<Vec<Attribute>, ModuleError>;

    fn sign(
        &mut self,
        mechanism: Mechanism,
        handle: ObjectHandle,
        data: &[u8],
    ) -> Result<Bytes, ModuleError>;

    fn destroy_object(&mut self, handle: ObjectHandle) -> Result<(), ModuleError>;
}

pub(crate) fn find_attribute<'a>(
    template: &'a [Attribute],
    attribute_type: AttributeType,
) -> Option<&'a Attribute> {
    template
        .iter()
        .find(|attribute| attribute.attribute_type() == attribute_type)
}

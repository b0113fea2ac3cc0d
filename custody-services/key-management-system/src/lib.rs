//! Key custody and signing backends.
//!
//! Private key material never leaves the backend that minted it. Callers get
//! [`PublicKey`] projections and short-lived [`Signer`] capabilities, and
//! route requests through a [`BackendIndex`] without knowing which backend
//! owns a key.

pub mod backends;
pub mod error;
pub mod index;
pub mod keys;
pub mod registry;
mod secure_key;

pub use backends::{
    hsm::{HsmBackend, HsmBackendSettings},
    software::SoftwareBackend,
    Signer, SigningBackend,
};
pub use error::{InternalError, KmsError};
pub use index::{BackendIndex, BackendIndexBuilder};
pub use keys::{Algorithm, KeyId, PublicKey, Signature, SignatureRequest};
pub use secure_key::{SecuredKey, SoftwareKey};

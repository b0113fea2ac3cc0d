//! RSA public key helpers for keys whose private half lives in a hardware
//! module: rebuild a key from its raw components, encode it, and verify
//! `SHA256-RSA-PKCS` signatures locally.

use bytes::Bytes;
use rsa::{
    pkcs8::{DecodePublicKey, EncodePublicKey},
    BigUint, Pkcs1v15Sign, RsaPublicKey,
};
use sha2::{Digest, Sha256};

use crate::KmsError;

/// Builds a DER encoded SubjectPublicKeyInfo from big-endian modulus and
/// public exponent bytes.
pub fn encode_public_key(modulus: &[u8], exponent: &[u8]) -> Result<Bytes, KmsError> {
    let key = RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from_bytes_be(exponent),
    )
    .map_err(KmsError::encoding)?;
    let document = key.to_public_key_der().map_err(KmsError::encoding)?;
    Ok(Bytes::copy_from_slice(document.as_bytes()))
}

pub fn decode_public_key(der: &[u8]) -> Result<RsaPublicKey, KmsError> {
    RsaPublicKey::from_public_key_der(der).map_err(KmsError::encoding)
}

/// PKCS#1 v1.5 verification over the SHA-256 digest of `content`.
pub fn verify_sha256(
    public_key: &RsaPublicKey,
    content: &[u8],
    signature: &[u8],
) -> Result<(), rsa::Error> {
    let digest = Sha256::digest(content);
    public_key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use rsa::{traits::PublicKeyParts, RsaPrivateKey};

    use super::*;

    #[test]
    fn rebuild_from_components_and_verify() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = private_key.to_public_key();
        let der = encode_public_key(&public.n().to_bytes_be(), &public.e().to_bytes_be()).unwrap();
        let decoded = decode_public_key(&der).unwrap();
        assert_eq!(decoded, public);

        let digest = Sha256::digest(b"content");
        let signature = private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .unwrap();
        assert!(verify_sha256(&decoded, b"content", &signature).is_ok());
        assert!(verify_sha256(&decoded, b"c0ntent", &signature).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_public_key(b"not a key").is_err());
        assert!(encode_public_key(&[0xff; 128], &[1]).is_err());
    }
}

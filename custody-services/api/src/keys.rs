//! Operations behind every transport. Payloads arrive as wire messages and
//! leave as wire messages; the signing work itself runs on the blocking pool.

// std
use std::sync::Arc;
// crates
use key_management_system::{BackendIndex, InternalError, KmsError};
use tracing::{debug, error, info};
// internal
use crate::messages::{Algorithm, KeyId, PublicKey, Signature, SignatureRequest, Void};

async fn blocking<T, F>(index: &Arc<BackendIndex>, f: F) -> Result<T, KmsError>
where
    T: Send + 'static,
    F: FnOnce(&BackendIndex) -> Result<T, KmsError> + Send + 'static,
{
    let index = Arc::clone(index);
    tokio::task::spawn_blocking(move || f(index.as_ref()))
        .await
        .map_err(|e| KmsError::Internal(InternalError::Task(e.to_string())))?
}

fn log_failure(operation: &str, error: &KmsError) {
    match error {
        KmsError::SigningFailed { .. } | KmsError::Internal(_) => {
            error!(operation, "Request failed: {error}")
        }
        _ => debug!(operation, "Request rejected: {error}"),
    }
}

pub async fn create_key(
    index: &Arc<BackendIndex>,
    algorithm: Algorithm,
) -> Result<PublicKey, KmsError> {
    let algorithm = key_management_system::Algorithm::from(algorithm);
    blocking(index, move |index| index.create_key(&algorithm))
        .await
        .map(|public| {
            info!(key_id = %public.key_id, algorithm = %public.algorithm, "CreateKey");
            PublicKey::from(public)
        })
        .inspect_err(|e| log_failure("CreateKey", e))
}

pub async fn delete_key(index: &Arc<BackendIndex>, key_id: KeyId) -> Result<Void, KmsError> {
    let key_id = key_management_system::KeyId::try_from(key_id)?;
    blocking(index, move |index| {
        index.delete_key(&key_id)?;
        info!(%key_id, "DeleteKey");
        Ok(Void {})
    })
    .await
    .inspect_err(|e| log_failure("DeleteKey", e))
}

pub async fn key_info(index: &Arc<BackendIndex>, key_id: KeyId) -> Result<PublicKey, KmsError> {
    let key_id = key_management_system::KeyId::try_from(key_id)?;
    blocking(index, move |index| index.key_info(&key_id))
        .await
        .map(PublicKey::from)
        .inspect_err(|e| log_failure("GetKeyInfo", e))
}

pub async fn sign(
    index: &Arc<BackendIndex>,
    request: SignatureRequest,
) -> Result<Signature, KmsError> {
    let request = key_management_system::SignatureRequest::try_from(request)?;
    blocking(index, move |index| index.sign(&request))
        .await
        .map(|signature| {
            debug!(key_id = %signature.key_id, "Sign");
            Signature::from(signature)
        })
        .inspect_err(|e| log_failure("Sign", e))
}

#[cfg(test)]
mod tests {
    use key_management_system::{keys::ed25519, SoftwareBackend};

    use super::*;

    fn index() -> Arc<BackendIndex> {
        Arc::new(
            BackendIndex::builder()
                .with_backend(Arc::new(<SoftwareBackend>::new()))
                .build(),
        )
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let index = index();
        let public = create_key(
            &index,
            Algorithm {
                algorithm: "ed25519".to_owned(),
            },
        )
        .await
        .unwrap();
        let key_id = public.key_info.clone().unwrap().key_id.unwrap();
        assert_eq!(key_info(&index, key_id.clone()).await.unwrap(), public);

        let signature = sign(
            &index,
            SignatureRequest {
                key_id: Some(key_id.clone()),
                content: b"hello".to_vec(),
            },
        )
        .await
        .unwrap();
        assert_eq!(signature.key_info, public.key_info);
        assert!(ed25519::verify(&public.public_key, b"hello", &signature.content));

        delete_key(&index, key_id.clone()).await.unwrap();
        assert!(matches!(
            key_info(&index, key_id).await,
            Err(KmsError::InvalidKeyId(_))
        ));
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let index = index();
        assert!(matches!(
            create_key(
                &index,
                Algorithm {
                    algorithm: "rsa".to_owned()
                }
            )
            .await,
            Err(KmsError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            sign(&index, SignatureRequest::default()).await,
            Err(KmsError::MalformedRequest(_))
        ));
        assert!(matches!(
            delete_key(&index, KeyId::default()).await,
            Err(KmsError::MalformedRequest(_))
        ));
    }
}

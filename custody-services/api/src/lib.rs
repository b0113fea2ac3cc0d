// std
use std::{future::Future, sync::Arc};
// crates
use key_management_system::{BackendIndex, KmsError};
use serde::{Deserialize, Serialize};
// internal

pub mod keys;
pub mod messages;
pub mod rpc;

/// A simple abstraction so that we can easily
/// swap or add the transports fronting the signer
pub trait Backend {
    type Error: std::error::Error + Send + Sync + 'static;
    type Settings: Clone + Send + Sync + 'static;

    fn new(settings: Self::Settings) -> impl Future<Output = Result<Self, Self::Error>> + Send
    where
        Self: Sized;

    fn serve(self, index: Arc<BackendIndex>)
        -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Transport independent classification of a failed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    Internal,
}

impl From<&KmsError> for ErrorCode {
    fn from(error: &KmsError) -> Self {
        match error {
            KmsError::InvalidKeyId(_) => Self::NotFound,
            KmsError::MalformedRequest(_) | KmsError::UnsupportedAlgorithm(_) => {
                Self::InvalidArgument
            }
            KmsError::SigningFailed { .. } | KmsError::Internal(_) => Self::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use key_management_system::{Algorithm, KeyId};

    use super::*;

    #[test]
    fn error_classification() {
        let key_id = KeyId::from("abc");
        assert_eq!(
            ErrorCode::from(&KmsError::InvalidKeyId(key_id.clone())),
            ErrorCode::NotFound
        );
        assert_eq!(
            ErrorCode::from(&KmsError::MalformedRequest("no key".into())),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            ErrorCode::from(&KmsError::UnsupportedAlgorithm(Algorithm::new("dsa"))),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            ErrorCode::from(&KmsError::SigningFailed {
                key_id,
                attempts: 3
            }),
            ErrorCode::Internal
        );
        assert_eq!(
            ErrorCode::from(&KmsError::encoding("bad der")),
            ErrorCode::Internal
        );
    }
}

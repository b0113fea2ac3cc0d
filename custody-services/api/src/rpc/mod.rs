//! Binary RPC transport: bincode messages in length-prefixed frames over a
//! byte stream, one reply per request, in order.

// std
use std::sync::Arc;
// crates
use key_management_system::{BackendIndex, KmsError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};
// internal
use crate::{
    keys,
    messages::{Algorithm, KeyId, PublicKey, Signature, SignatureRequest, Void},
    ErrorCode,
};

pub mod client;
pub mod wire;

pub use client::{RpcClient, RpcClientError};
pub use wire::WireError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    CreateKey(Algorithm),
    DeleteKey(KeyId),
    GetKeyInfo(KeyId),
    Sign(SignatureRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcReply {
    PublicKey(PublicKey),
    Void(Void),
    Signature(Signature),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct RpcStatus {
    pub code: ErrorCode,
    pub message: String,
}

impl From<KmsError> for RpcStatus {
    fn from(error: KmsError) -> Self {
        Self {
            code: ErrorCode::from(&error),
            message: error.to_string(),
        }
    }
}

pub type RpcResponse = Result<RpcReply, RpcStatus>;

pub async fn handle_request(index: &Arc<BackendIndex>, request: RpcRequest) -> RpcResponse {
    let reply = match request {
        RpcRequest::CreateKey(algorithm) => keys::create_key(index, algorithm)
            .await
            .map(RpcReply::PublicKey),
        RpcRequest::DeleteKey(key_id) => keys::delete_key(index, key_id).await.map(RpcReply::Void),
        RpcRequest::GetKeyInfo(key_id) => {
            keys::key_info(index, key_id).await.map(RpcReply::PublicKey)
        }
        RpcRequest::Sign(request) => keys::sign(index, request).await.map(RpcReply::Signature),
    };
    reply.map_err(RpcStatus::from)
}

/// Serves requests from one peer until it hangs up. A frame that does not
/// decode gets an `InvalidArgument` reply and the connection stays usable;
/// transport failures end it.
pub async fn handle_connection<S>(index: Arc<BackendIndex>, stream: S) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    while let Some(payload) = wire::read_frame(&mut reader).await? {
        let response = match wire::unpack::<RpcRequest>(&payload) {
            Ok(request) => {
                trace!(?request, "RPC request");
                handle_request(&index, request).await
            }
            Err(e) => {
                debug!("Undecodable RPC frame: {e}");
                Err(RpcStatus {
                    code: ErrorCode::InvalidArgument,
                    message: e.to_string(),
                })
            }
        };
        wire::write_message(&mut writer, &response).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use key_management_system::{keys::ed25519, SoftwareBackend};
    use tokio::{
        io::{AsyncReadExt as _, AsyncWriteExt as _},
        net::{TcpListener, TcpStream},
    };

    use super::*;

    async fn spawn_server() -> std::net::SocketAddr {
        let index = Arc::new(
            BackendIndex::builder()
                .with_backend(Arc::new(<SoftwareBackend>::new()))
                .build(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(handle_connection(Arc::clone(&index), stream));
            }
        });
        address
    }

    #[tokio::test]
    async fn client_lifecycle() {
        let address = spawn_server().await;
        let mut client = RpcClient::connect(address).await.unwrap();

        let public = client.create_key("ed25519").await.unwrap();
        let key_id = public.key_info.clone().unwrap().key_id.unwrap().id;
        assert_eq!(client.key_info(&key_id).await.unwrap(), public);

        let signature = client.sign(&key_id, b"hello").await.unwrap();
        assert!(ed25519::verify(&public.public_key, b"hello", &signature.content));
        assert!(!ed25519::verify(&public.public_key, b"hellx", &signature.content));

        client.delete_key(&key_id).await.unwrap();
        let status = client.key_info(&key_id).await.unwrap_err();
        assert!(matches!(
            status,
            RpcClientError::Status(RpcStatus { code: ErrorCode::NotFound, .. })
        ));
    }

    #[tokio::test]
    async fn error_codes() {
        let address = spawn_server().await;
        let mut client = RpcClient::connect(address).await.unwrap();

        let unknown = "c62e6d68851cef1f7e55a9d56e3b0c05f3359f16838cad43600f0554e7d3b54d";
        for result in [
            client.delete_key(unknown).await.map(|_| ()),
            client.key_info(unknown).await.map(|_| ()),
            client.sign(unknown, b"x").await.map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(RpcClientError::Status(RpcStatus { code: ErrorCode::NotFound, .. }))
            ));
        }

        assert!(matches!(
            client.create_key("dsa").await,
            Err(RpcClientError::Status(RpcStatus { code: ErrorCode::InvalidArgument, .. }))
        ));
        assert!(matches!(
            client.call(RpcRequest::Sign(SignatureRequest::default())).await,
            Err(RpcClientError::Status(RpcStatus { code: ErrorCode::InvalidArgument, .. }))
        ));
    }

    #[tokio::test]
    async fn garbage_frame_keeps_connection() {
        let address = spawn_server().await;
        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(&3u32.to_be_bytes()).await.unwrap();
        stream.write_all(&[0xff, 0xff, 0xff]).await.unwrap();

        let payload = wire::read_frame(&mut stream).await.unwrap().unwrap();
        let response: RpcResponse = wire::unpack(&payload).unwrap();
        assert!(matches!(
            response,
            Err(RpcStatus { code: ErrorCode::InvalidArgument, .. })
        ));

        wire::write_message(
            &mut stream,
            &RpcRequest::CreateKey(Algorithm {
                algorithm: "ed25519".to_owned(),
            }),
        )
        .await
        .unwrap();
        let payload = wire::read_frame(&mut stream).await.unwrap().unwrap();
        let response: RpcResponse = wire::unpack(&payload).unwrap();
        assert!(matches!(response, Ok(RpcReply::PublicKey(_))));
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let address = spawn_server().await;
        let mut stream = TcpStream::connect(address).await.unwrap();
        stream
            .write_all(&u32::MAX.to_be_bytes())
            .await
            .unwrap();
        let mut buffer = Vec::new();
        assert_eq!(stream.read_to_end(&mut buffer).await.unwrap_or(0), 0);
    }
}

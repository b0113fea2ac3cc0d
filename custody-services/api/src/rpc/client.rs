// crates
use tokio::net::{TcpStream, ToSocketAddrs};
// internal
use super::{wire, RpcReply, RpcRequest, RpcResponse, RpcStatus, WireError};
use crate::messages::{Algorithm, KeyId, PublicKey, Signature, SignatureRequest};

#[derive(thiserror::Error, Debug)]
pub enum RpcClientError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("Server returned an error: {0}")]
    Status(#[from] RpcStatus),
    #[error("Server closed the connection")]
    ConnectionClosed,
    #[error("Unexpected reply: {0:?}")]
    UnexpectedReply(Box<RpcReply>),
}

/// Keeps one connection open and issues requests over it one at a time.
pub struct RpcClient {
    stream: TcpStream,
}

impl RpcClient {
    pub async fn connect(address: impl ToSocketAddrs) -> Result<Self, RpcClientError> {
        let stream = TcpStream::connect(address).await.map_err(WireError::from)?;
        Ok(Self { stream })
    }

    pub async fn call(&mut self, request: RpcRequest) -> Result<RpcReply, RpcClientError> {
        wire::write_message(&mut self.stream, &request).await?;
        let payload = wire::read_frame(&mut self.stream)
            .await?
            .ok_or(RpcClientError::ConnectionClosed)?;
        let response: RpcResponse = wire::unpack(&payload)?;
        Ok(response?)
    }

    pub async fn create_key(&mut self, algorithm: &str) -> Result<PublicKey, RpcClientError> {
        let request = RpcRequest::CreateKey(Algorithm {
            algorithm: algorithm.to_owned(),
        });
        match self.call(request).await? {
            RpcReply::PublicKey(public) => Ok(public),
            other => Err(RpcClientError::UnexpectedReply(Box::new(other))),
        }
    }

    pub async fn delete_key(&mut self, key_id: &str) -> Result<(), RpcClientError> {
        match self.call(RpcRequest::DeleteKey(key_id_message(key_id))).await? {
            RpcReply::Void(_) => Ok(()),
            other => Err(RpcClientError::UnexpectedReply(Box::new(other))),
        }
    }

    pub async fn key_info(&mut self, key_id: &str) -> Result<PublicKey, RpcClientError> {
        match self.call(RpcRequest::GetKeyInfo(key_id_message(key_id))).await? {
            RpcReply::PublicKey(public) => Ok(public),
            other => Err(RpcClientError::UnexpectedReply(Box::new(other))),
        }
    }

    pub async fn sign(&mut self, key_id: &str, content: &[u8]) -> Result<Signature, RpcClientError> {
        let request = RpcRequest::Sign(SignatureRequest {
            key_id: Some(key_id_message(key_id)),
            content: content.to_vec(),
        });
        match self.call(request).await? {
            RpcReply::Signature(signature) => Ok(signature),
            other => Err(RpcClientError::UnexpectedReply(Box::new(other))),
        }
    }
}

fn key_id_message(key_id: &str) -> KeyId {
    KeyId {
        id: key_id.to_owned(),
    }
}

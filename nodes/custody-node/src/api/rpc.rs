// std
use std::{io, net::SocketAddr, sync::Arc};
// crates
use custody_api::{rpc::handle_connection, Backend};
use key_management_system::BackendIndex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
// internal

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcBackendSettings {
    /// Socket where the framed RPC listener accepts connections.
    pub address: SocketAddr,
}

/// Framed request/response front. The listener is bound in [`Backend::new`]
/// so that the bound address is known before serving starts.
pub struct RpcBackend {
    listener: TcpListener,
}

impl RpcBackend {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Backend for RpcBackend {
    type Error = io::Error;
    type Settings = RpcBackendSettings;

    async fn new(settings: Self::Settings) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        let listener = TcpListener::bind(settings.address).await?;
        Ok(Self { listener })
    }

    async fn serve(self, index: Arc<BackendIndex>) -> Result<(), Self::Error> {
        info!(address = %self.listener.local_addr()?, "Serving RPC");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "RPC connection opened");
            let index = Arc::clone(&index);
            tokio::spawn(async move {
                match handle_connection(index, stream).await {
                    Ok(()) => debug!(%peer, "RPC connection closed"),
                    Err(e) => warn!(%peer, "RPC connection dropped: {e}"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use custody_api::{
        rpc::{RpcClient, RpcClientError},
        ErrorCode,
    };
    use key_management_system::{keys::ed25519, SoftwareBackend};

    use super::*;

    async fn spawn_backend() -> SocketAddr {
        let backend = RpcBackend::new(RpcBackendSettings {
            address: "127.0.0.1:0".parse().unwrap(),
        })
        .await
        .unwrap();
        let address = backend.local_addr().unwrap();
        let index = Arc::new(
            BackendIndex::builder()
                .with_backend(Arc::new(<SoftwareBackend>::new()))
                .build(),
        );
        tokio::spawn(backend.serve(index));
        address
    }

    #[tokio::test]
    async fn serves_many_clients() {
        let address = spawn_backend().await;
        let mut alice = RpcClient::connect(address).await.unwrap();
        let mut bob = RpcClient::connect(address).await.unwrap();

        let public = alice.create_key("ed25519").await.unwrap();
        let key_id = public.key_info.clone().unwrap().key_id.unwrap().id;

        // Keys are shared between connections.
        assert_eq!(bob.key_info(&key_id).await.unwrap(), public);
        let signature = bob.sign(&key_id, b"hello").await.unwrap();
        assert!(ed25519::verify(&public.public_key, b"hello", &signature.content));

        alice.delete_key(&key_id).await.unwrap();
        let Err(RpcClientError::Status(status)) = bob.key_info(&key_id).await else {
            panic!("expected a status error");
        };
        assert_eq!(status.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn address_in_use_is_reported() {
        let address = spawn_backend().await;
        assert!(RpcBackend::new(RpcBackendSettings { address })
            .await
            .is_err());
    }
}
